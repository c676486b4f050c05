//! SIGINT/SIGTERM → cancel token

use anyhow::Result;
use filehash::ScanCancelToken;
use tracing::info;

/// Cancel `token` on the first interrupt instead of killing the process,
/// so the scan can stop between files and report what was committed.
pub fn install_interrupt_handler(token: &ScanCancelToken) -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let token = token.clone();
        std::thread::Builder::new()
            .name("filehash-signals".to_string())
            .spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!(signal = sig, "Received signal, cancelling scan");
                    token.cancel();
                }
            })?;
    }

    #[cfg(windows)]
    {
        let token = token.clone();
        ctrlc::set_handler(move || {
            info!("Received Ctrl+C, cancelling scan");
            token.cancel();
        })?;
    }

    Ok(())
}
