//! Handle to a loaded embedded module

use std::fmt;
use std::sync::Arc;

use super::module::{EmbeddedModule, MatrixAllocator, ModuleFs};
use super::state::{EngineState, ReadySignal};
use crate::mount::MountSpec;

/// A started embedded module together with the mount it was started with.
///
/// Owned by the [`EngineLoader`](crate::EngineLoader); everyone else borrows
/// it. After `Ready` the module filesystem and allocator are only read.
pub struct EngineHandle {
    module: Arc<dyn EmbeddedModule>,
    mount: MountSpec,
    signal: Arc<ReadySignal>,
}

impl EngineHandle {
    pub(crate) fn new(
        module: Arc<dyn EmbeddedModule>,
        mount: MountSpec,
        signal: Arc<ReadySignal>,
    ) -> Self {
        Self {
            module,
            mount,
            signal,
        }
    }

    pub fn state(&self) -> EngineState {
        self.signal.state()
    }

    /// `Ready` and the module still reports its image capabilities.
    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready && self.module.has_capabilities()
    }

    pub fn fs(&self) -> Arc<dyn ModuleFs> {
        self.module.fs()
    }

    pub fn matrices(&self) -> Arc<dyn MatrixAllocator> {
        self.module.matrices()
    }

    /// The mount the engine was started with (host root canonicalized).
    pub fn mount(&self) -> &MountSpec {
        &self.mount
    }

    pub fn module_name(&self) -> &str {
        self.module.name()
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("module", &self.module.name())
            .field("mount", &self.mount)
            .field("state", &self.state())
            .finish()
    }
}
