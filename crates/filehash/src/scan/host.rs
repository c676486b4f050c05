//! Local machine name used to label records

use super::types::MAX_HOST_LEN;

/// Best-effort hostname, truncated to [`MAX_HOST_LEN`] characters.
pub fn local_hostname() -> String {
    let name = platform_hostname()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    name.chars().take(MAX_HOST_LEN).collect()
}

#[cfg(unix)]
fn platform_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes; gethostname NUL-terminates on success
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return std::env::var("HOSTNAME").ok();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Some(String::from_utf8_lossy(&buf[..end]).into_owned())
}

#[cfg(windows)]
fn platform_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}

#[cfg(not(any(unix, windows)))]
fn platform_hostname() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_is_bounded_and_nonempty() {
        let name = local_hostname();
        assert!(!name.is_empty());
        assert!(name.chars().count() <= MAX_HOST_LEN);
    }
}
