//! Device key file.
//!
//! The secp256k1 secret is stored hex-encoded in `<data_dir>/device.key`.
//! A missing file is generated on first start unless the identity config
//! demands an existing key.

use shared_crypto::{CryptoError, Secp256k1KeyPair};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Key file errors.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("Key file {0} does not exist and generation is disabled")]
    Missing(PathBuf),

    #[error("Cannot access key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Key file {path} is invalid: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: CryptoError,
    },
}

/// Load the key at `path`, or generate and persist one.
pub fn load_or_create(
    path: &Path,
    require_existing: bool,
) -> Result<Secp256k1KeyPair, KeystoreError> {
    let io = |source| KeystoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if path.exists() {
        let raw = std::fs::read_to_string(path).map_err(io)?;
        let keypair =
            Secp256k1KeyPair::from_hex(raw.trim()).map_err(|source| KeystoreError::Invalid {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            "[node] Loaded device key {} from {}",
            keypair.public_key().fingerprint(),
            path.display()
        );
        return Ok(keypair);
    }

    if require_existing {
        return Err(KeystoreError::Missing(path.to_path_buf()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    let keypair = Secp256k1KeyPair::generate();
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(io)?;
    file.write_all(keypair.to_hex().as_bytes()).map_err(io)?;
    file.sync_all().map_err(io)?;
    restrict_permissions(path);

    warn!(
        "[node] Generated new device key {} at {}",
        keypair.public_key().fingerprint(),
        path.display()
    );
    Ok(keypair)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!("[node] Could not restrict {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("device.key");

        let first = load_or_create(&path, false).unwrap();
        let second = load_or_create(&path, true).unwrap();
        assert_eq!(first.public_key(), second.public_key());
    }

    #[test]
    fn test_missing_key_when_required() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_or_create(&dir.path().join("device.key"), true);
        assert!(matches!(result, Err(KeystoreError::Missing(_))));
    }

    #[test]
    fn test_garbage_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.key");
        std::fs::write(&path, "not hex").unwrap();
        assert!(matches!(
            load_or_create(&path, false),
            Err(KeystoreError::Invalid { .. })
        ));
    }
}
