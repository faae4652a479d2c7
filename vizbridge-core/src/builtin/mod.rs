//! Built-in Module - In-Process Implementation of the Module Contract
//!
//! A pure-Rust stand-in for the precompiled vision engine. It provides the
//! parts the bridge drives (sandboxed filesystem, matrix allocator, two-phase
//! startup) and no vision algorithms. Hosts and tests use it wherever the real
//! engine is not available.

mod fs;
mod store;

pub use fs::VirtualFs;
pub use store::MatrixStore;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::ensure;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::engine::module::{EmbeddedModule, MatrixAllocator, ModuleFactory, ModuleFs};
use crate::environment::HostEnvironment;

/// Module name reported in logs.
pub const BUILTIN_MODULE_NAME: &str = "builtin";

/// Creates [`BuiltinModule`] instances.
#[derive(Debug, Default)]
pub struct BuiltinFactory;

impl BuiltinFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModuleFactory for BuiltinFactory {
    async fn instantiate(
        &self,
        environment: Arc<dyn HostEnvironment>,
    ) -> anyhow::Result<Arc<dyn EmbeddedModule>> {
        ensure!(
            environment.is_installed(),
            "host environment must be installed before the module is instantiated"
        );
        debug!("Instantiating built-in module");
        Ok(Arc::new(BuiltinModule::new()))
    }
}

/// The built-in embedded module.
pub struct BuiltinModule {
    fs: Arc<VirtualFs>,
    matrices: Arc<MatrixStore>,
    initialized: AtomicBool,
}

impl BuiltinModule {
    pub fn new() -> Self {
        Self {
            fs: Arc::new(VirtualFs::new()),
            matrices: Arc::new(MatrixStore::new()),
            initialized: AtomicBool::new(false),
        }
    }
}

impl Default for BuiltinModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddedModule for BuiltinModule {
    fn name(&self) -> &str {
        BUILTIN_MODULE_NAME
    }

    fn fs(&self) -> Arc<dyn ModuleFs> {
        self.fs.clone()
    }

    fn matrices(&self) -> Arc<dyn MatrixAllocator> {
        self.matrices.clone()
    }

    async fn run_initializers(&self) -> anyhow::Result<()> {
        // Runtime setup is a suspension point, like the real engine's.
        tokio::task::yield_now().await;
        self.initialized.store(true, Ordering::Release);
        info!(cwd = %self.fs.cwd(), "Built-in module runtime initialized");
        Ok(())
    }

    fn has_capabilities(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}
