//! Error types for the bridge
//!
//! Every failure is surfaced to the immediate caller; nothing in this crate
//! retries on its own.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::matrix::MatrixId;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors raised by the bridge between the host and the embedded module.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The host environment adapter could not be installed.
    #[error("environment setup failed: {0}")]
    EnvironmentSetup(#[source] anyhow::Error),

    /// The virtual root, the host root, or the bind between them failed.
    #[error("mount of {host_root:?} at {virtual_root} failed: {reason}")]
    Mount {
        virtual_root: String,
        host_root: PathBuf,
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The module did not report readiness within the configured timeout.
    #[error("engine did not become ready within {0:?}")]
    StartupStall(Duration),

    /// The module factory or the module's own initializers failed.
    #[error("engine startup failed: {0}")]
    Startup(#[source] anyhow::Error),

    /// A source image could not be read or decoded.
    #[error("failed to decode {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// A raster could not be encoded in the requested format.
    #[error("cannot encode as {format:?}: {reason}")]
    Encode { format: String, reason: String },

    /// Host I/O failure while writing an image.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The matrix was already released; the id is stale.
    #[error("matrix {0} used after release")]
    UseAfterRelease(MatrixId),

    /// The matrix was released more than once.
    #[error("matrix {0} released twice")]
    DoubleRelease(MatrixId),

    /// Any other failure reported by the embedded module.
    #[error(transparent)]
    Module(#[from] ModuleError),
}

/// Failures reported at the embedded module boundary.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Path does not exist in the module filesystem.
    #[error("no such path in module filesystem: {0}")]
    NotFound(String),

    /// Path already exists in the module filesystem.
    #[error("path already exists in module filesystem: {0}")]
    AlreadyExists(String),

    /// Path is not a directory in the module filesystem.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Path lives in module memory, not under a host mount.
    #[error("path is not under a host mount: {0}")]
    NotMounted(String),

    /// Pixel buffer does not match the declared shape.
    #[error("pixel buffer of {actual} bytes does not match expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Host I/O failed underneath a mounted path.
    #[error("host I/O failed under mount: {0}")]
    HostIo(#[from] std::io::Error),
}

impl BridgeError {
    /// Build a [`BridgeError::Mount`] without an underlying I/O cause.
    pub(crate) fn mount(
        virtual_root: impl Into<String>,
        host_root: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Mount {
            virtual_root: virtual_root.into(),
            host_root: host_root.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Returns `true` for the two matrix-discipline errors.
    pub fn is_handle_misuse(&self) -> bool {
        matches!(self, Self::UseAfterRelease(_) | Self::DoubleRelease(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_error_display() {
        let err = BridgeError::mount("/work", "/tmp/host", "permission denied");
        let msg = err.to_string();
        assert!(msg.contains("/work"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn test_module_error_converts() {
        let err: BridgeError = ModuleError::NotFound("/missing".into()).into();
        assert!(matches!(err, BridgeError::Module(ModuleError::NotFound(_))));
        assert!(!err.is_handle_misuse());
    }

    #[test]
    fn test_handle_misuse_classification() {
        let id = MatrixId::new(3, 1);
        assert!(BridgeError::UseAfterRelease(id).is_handle_misuse());
        assert!(BridgeError::DoubleRelease(id).is_handle_misuse());
    }
}
