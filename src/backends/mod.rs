//! Backend implementations for the learned segmenter
//!
//! - Native backend (built-in U²-Net-lite on ndarray, always available)
//! - Tract backend (ONNX export of the network, pure Rust)

pub mod layers;
pub mod native;

#[cfg(feature = "tract")]
pub mod tract;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

pub use self::native::{NativeBackend, U2NetLite};

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

use crate::error::{GarmentError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

/// Read a weight file, checking its SHA-256 digest when one is expected
///
/// # Errors
/// Returns `ModelUnavailable` when the file cannot be read or the digest
/// does not match.
pub(crate) fn read_weights(path: &Path, expected_sha256: Option<&str>) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|e| {
        GarmentError::model_unavailable(format!("Cannot read weights '{}': {e}", path.display()))
    })?;

    if let Some(expected) = expected_sha256 {
        let actual = format!("{:x}", Sha256::digest(&bytes));
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(GarmentError::model_unavailable(format!(
                "Weights '{}' have SHA-256 {actual}, expected {expected}",
                path.display()
            )));
        }
        debug!(path = %path.display(), "Weights digest verified");
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_weights_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("w.bin");
        std::fs::write(&path, b"abc").unwrap();

        let sha_abc = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(read_weights(&path, Some(sha_abc)).unwrap(), b"abc");
        assert_eq!(read_weights(&path, None).unwrap(), b"abc");

        let wrong = "0".repeat(64);
        let err = read_weights(&path, Some(&wrong)).unwrap_err();
        assert!(matches!(err, GarmentError::ModelUnavailable(_)));
        assert!(err.to_string().contains(sha_abc));
    }

    #[test]
    fn test_read_weights_missing_file() {
        let result = read_weights(Path::new("/no/such/weights.bin"), None);
        assert!(matches!(result, Err(GarmentError::ModelUnavailable(_))));
    }
}
