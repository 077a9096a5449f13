use std::path::Path;

use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;

use crate::core::error::{LauncherError, LauncherResult};

const READ_BUFFER: usize = 64 * 1024;

pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-1 of a file on disk, read in chunks.
pub async fn file_sha1(path: &Path) -> LauncherResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compare hex digests without caring about case.
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            sha1_hex(b"hello"),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
        assert!(digests_match(
            "AAF4C61DDCC5E8A2DABEDE0F3B482CD9AEA9434D",
            &sha1_hex(b"hello")
        ));
    }

    #[tokio::test]
    async fn file_digest_matches_buffer_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let content = vec![7u8; READ_BUFFER * 2 + 13];
        tokio::fs::write(&path, &content).await.unwrap();

        assert_eq!(file_sha1(&path).await.unwrap(), sha1_hex(&content));
    }
}
