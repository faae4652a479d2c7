//! Filesystem Mount Bridge
//!
//! Makes a host directory visible inside the module's sandboxed filesystem
//! and points the module's working directory at it, so module-relative paths
//! land in the host directory.
//!
//! # Two-Step Protocol:
//! ```text
//! prepare_mount()  ──▶  PreparedMount  ──▶  finalize()
//!   (before module code runs)              (after the module is ready)
//! ```
//! `finalize` only exists on the token `prepare_mount` returns, so the two
//! steps cannot run out of order.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::module::ModuleFs;
use crate::error::{BridgeError, Result};

/// Default mount point inside the module filesystem.
pub const DEFAULT_VIRTUAL_ROOT: &str = "/work";

/// Where a host directory is bound inside the module filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Absolute path inside the module filesystem.
    pub virtual_root: String,
    /// Directory on the host; created if missing.
    pub host_root: PathBuf,
}

impl MountSpec {
    pub fn new(virtual_root: impl Into<String>, host_root: impl Into<PathBuf>) -> Self {
        Self {
            virtual_root: virtual_root.into(),
            host_root: host_root.into(),
        }
    }
}

impl Default for MountSpec {
    /// `/work` bound to the process working directory.
    fn default() -> Self {
        let host_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(DEFAULT_VIRTUAL_ROOT, host_root)
    }
}

/// Mount performed during pre-initialization, waiting for the ready hook.
#[must_use = "a prepared mount must be finalized once the module is ready"]
#[derive(Debug)]
pub struct PreparedMount {
    virtual_root: String,
    host_root: PathBuf,
}

/// Prepare the mount described by `spec`.
///
/// Creates the virtual root (and its parents) in the module filesystem,
/// creates the host root (and its parents) on disk, then binds them.
pub(crate) async fn prepare_mount(fs: &dyn ModuleFs, spec: &MountSpec) -> Result<PreparedMount> {
    let virtual_root = spec.virtual_root.trim_end_matches('/');
    if !virtual_root.starts_with('/') || virtual_root.is_empty() {
        return Err(BridgeError::mount(
            &spec.virtual_root,
            &spec.host_root,
            "virtual root must be an absolute path below /",
        ));
    }
    if virtual_root.split('/').any(|c| c == "." || c == "..") {
        return Err(BridgeError::mount(
            &spec.virtual_root,
            &spec.host_root,
            "virtual root must not contain . or .. components",
        ));
    }
    info!(virtual_root, host_root = ?spec.host_root, "Preparing mount");

    ensure_virtual_dir(fs, virtual_root, &spec.host_root)?;
    let host_root = ensure_host_dir(virtual_root, &spec.host_root).await?;

    fs.mount_host(&host_root, virtual_root)
        .map_err(|e| BridgeError::mount(virtual_root, &host_root, e.to_string()))?;
    debug!(virtual_root, host_root = ?host_root, "Host directory bound");

    Ok(PreparedMount {
        virtual_root: virtual_root.to_string(),
        host_root,
    })
}

/// `mkdir -p` inside the module filesystem.
fn ensure_virtual_dir(fs: &dyn ModuleFs, virtual_root: &str, host_root: &Path) -> Result<()> {
    if fs.exists(virtual_root) {
        return Ok(());
    }
    let mut current = String::new();
    for component in virtual_root.split('/').filter(|c| !c.is_empty()) {
        current.push('/');
        current.push_str(component);
        if !fs.exists(&current) {
            debug!(path = %current, "Creating virtual directory");
            fs.mkdir(&current)
                .map_err(|e| BridgeError::mount(virtual_root, host_root, e.to_string()))?;
        }
    }
    Ok(())
}

/// Create the host directory if needed and return its canonical path.
async fn ensure_host_dir(virtual_root: &str, host_root: &Path) -> Result<PathBuf> {
    let io_err = |reason: &str, source: std::io::Error| BridgeError::Mount {
        virtual_root: virtual_root.to_string(),
        host_root: host_root.to_path_buf(),
        reason: reason.to_string(),
        source: Some(source),
    };

    match tokio::fs::metadata(host_root).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(BridgeError::mount(
                virtual_root,
                host_root,
                "host root exists but is not a directory",
            ))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(host_root = ?host_root, "Creating host directory");
            tokio::fs::create_dir_all(host_root)
                .await
                .map_err(|e| io_err("cannot create host directory", e))?;
        }
        Err(e) => return Err(io_err("cannot inspect host directory", e)),
    }

    tokio::fs::canonicalize(host_root)
        .await
        .map_err(|e| io_err("cannot resolve host directory", e))
}

impl PreparedMount {
    pub fn virtual_root(&self) -> &str {
        &self.virtual_root
    }

    /// Canonical host directory behind the mount.
    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    /// Make the mount point the module's working directory.
    pub(crate) fn finalize(self, fs: &dyn ModuleFs) -> Result<()> {
        fs.chdir(&self.virtual_root)
            .map_err(|e| BridgeError::mount(&self.virtual_root, &self.host_root, e.to_string()))?;
        info!(cwd = %self.virtual_root, "Module working directory set to mount");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::VirtualFs;

    #[tokio::test]
    async fn test_prepare_creates_both_sides() {
        let tmp = tempfile::tempdir().unwrap();
        let host = tmp.path().join("a/b/c");
        let fs = VirtualFs::new();

        let prepared = prepare_mount(&fs, &MountSpec::new("/data/work", &host))
            .await
            .unwrap();
        assert!(host.is_dir());
        assert!(fs.exists("/data"));
        assert!(fs.exists("/data/work"));
        assert_eq!(prepared.virtual_root(), "/data/work");

        // Not finalized yet: cwd is still the module default.
        assert_eq!(fs.cwd(), "/");
        prepared.finalize(&fs).unwrap();
        assert_eq!(fs.cwd(), "/data/work");
    }

    #[tokio::test]
    async fn test_mounted_files_visible() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("hello.txt"), b"hi").unwrap();
        let fs = VirtualFs::new();

        prepare_mount(&fs, &MountSpec::new("/work", tmp.path()))
            .await
            .unwrap()
            .finalize(&fs)
            .unwrap();
        assert_eq!(fs.read_file("hello.txt").unwrap(), b"hi");
        assert_eq!(fs.read_file("/work/hello.txt").unwrap(), b"hi");
    }

    #[tokio::test]
    async fn test_host_root_is_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        let fs = VirtualFs::new();

        let err = prepare_mount(&fs, &MountSpec::new("/work", &file))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Mount { .. }));
    }

    #[tokio::test]
    async fn test_relative_virtual_root_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let fs = VirtualFs::new();
        for bad in ["work", "/", ""] {
            let err = prepare_mount(&fs, &MountSpec::new(bad, tmp.path()))
                .await
                .unwrap_err();
            assert!(matches!(err, BridgeError::Mount { .. }), "accepted {bad:?}");
        }
    }

    #[tokio::test]
    async fn test_dot_components_rejected_without_side_effects() {
        let tmp = tempfile::tempdir().unwrap();
        let fs = VirtualFs::new();
        for bad in ["/a/../b", "/a/./b", "/.."] {
            let err = prepare_mount(&fs, &MountSpec::new(bad, tmp.path()))
                .await
                .unwrap_err();
            assert!(matches!(err, BridgeError::Mount { .. }), "accepted {bad:?}");
        }
        assert!(!fs.exists("/a"));
        assert!(!fs.exists("/b"));
        assert_eq!(fs.mount_count(), 0);
    }

    #[tokio::test]
    async fn test_double_mount_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let fs = VirtualFs::new();
        let spec = MountSpec::new("/work", tmp.path());
        let _first = prepare_mount(&fs, &spec).await.unwrap();
        assert!(prepare_mount(&fs, &spec).await.is_err());
    }

    #[test]
    fn test_default_spec() {
        let spec = MountSpec::default();
        assert_eq!(spec.virtual_root, DEFAULT_VIRTUAL_ROOT);
        assert_eq!(spec.host_root, std::env::current_dir().unwrap());
    }
}
