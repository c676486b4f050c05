//! Streaming MD5 content digests

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Smallest read block the hasher will use.
pub const MIN_BLOCK_SIZE: usize = 64 * 1024;

/// Computes lowercase hex MD5 digests by streaming file contents in blocks.
///
/// Memory use is one block per call regardless of file size.
#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    block_size: usize,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self {
            block_size: MIN_BLOCK_SIZE,
        }
    }
}

impl ContentHasher {
    /// Block sizes below [`MIN_BLOCK_SIZE`] are raised to it.
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(MIN_BLOCK_SIZE),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn hash_file(&self, path: &Path) -> io::Result<String> {
        let file = File::open(path)?;
        hash_reader(file, self.block_size)
    }
}

/// Digest everything `reader` yields, reading `block_size` bytes at a time.
pub fn hash_reader<R: Read>(mut reader: R, block_size: usize) -> io::Result<String> {
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; block_size.max(1)];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => context.consume(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(format!("{:x}", context.compute()))
}
