//! Loader configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::mount::MountSpec;

/// Configuration of an [`EngineLoader`](crate::EngineLoader).
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    /// Mount used by [`ensure_ready`](crate::EngineLoader::ensure_ready).
    pub mount: MountSpec,
    /// Upper bound on the startup handshake.
    ///
    /// `None` waits forever: a module that never reports ready leaves
    /// callers suspended.
    pub startup_timeout: Option<Duration>,
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mount(mut self, virtual_root: impl Into<String>, host_root: impl Into<PathBuf>) -> Self {
        self.mount = MountSpec::new(virtual_root, host_root);
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = Some(timeout);
        self
    }
}
