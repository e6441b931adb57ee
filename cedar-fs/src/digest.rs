//! Streaming SHA-1 content digests.
//!
//! The digest algorithm is part of the on-disk incremental-backup contract
//! (spec §4.1): it only changes on a major-version bump, so this module
//! hardcodes SHA-1 rather than taking an algorithm parameter.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha1::{Digest as _, Sha1};

use crate::error::{FsError, Result};

/// Number of bytes read per chunk while streaming a file into the hasher.
///
/// Matches `original_source/filesystem.py::_generateDigest`'s measured
/// sweet spot; smaller reads are slower and larger ones don't help.
const CHUNK_SIZE: usize = 4096;

/// Computes the hex-encoded SHA-1 digest of a regular file's contents.
pub fn digest_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| FsError::io(path, e))?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf).map_err(|e| FsError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    let hex_digest = hex::encode(digest);
    log::debug!("Generated digest [{hex_digest}] for file [{}].", path.display());
    Ok(hex_digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn digests_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"aaa").unwrap();
        drop(f);

        let digest = digest_file(&path).unwrap();
        // sha1("aaa")
        assert_eq!(digest, "7e240de74fb1ed08fa08d38063f6a6a91462a815");
    }

    #[test]
    fn different_content_gives_different_digest() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"aaa").unwrap();
        std::fs::write(&b, b"bbb").unwrap();

        assert_ne!(digest_file(&a).unwrap(), digest_file(&b).unwrap());
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = digest_file(Path::new("/nonexistent/path/to/file"));
        assert!(result.is_err());
    }

    #[test]
    fn large_file_spans_multiple_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data = vec![0x42u8; CHUNK_SIZE * 3 + 17];
        std::fs::write(&path, &data).unwrap();

        let digest = digest_file(&path).unwrap();
        assert_eq!(digest.len(), 40);
    }
}
