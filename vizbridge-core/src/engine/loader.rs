//! Engine Loader - Single Authority Over the Embedded Module
//!
//! The loader creates the embedded module at most once and hands out the
//! resulting [`EngineHandle`]. It is an ordinary value: compose one per host
//! (or per test) and share it behind an `Arc`.
//!
//! # Startup Sequence:
//! ```text
//! Unloaded ─▶ Instantiating ─▶ MountPending ─────────────────────▶ Ready
//!             install env      prepare_mount ─▶ run_initializers
//!             instantiate                       ─▶ finalize mount
//! ```
//! Every arrow is an `.await` in a single async function, so the mount is
//! always prepared before the module initializes and finalized after it.
//!
//! # Concurrency:
//! Concurrent callers share one in-flight startup through a
//! [`tokio::sync::OnceCell`]. A failed startup leaves the cell empty and the
//! state back at `Unloaded`; the next call starts over.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::handle::EngineHandle;
use super::module::ModuleFactory;
use super::state::{EngineState, ReadySignal};
use crate::config::BridgeConfig;
use crate::environment::HostEnvironment;
use crate::error::{BridgeError, Result};
use crate::mount::{self, MountSpec};

/// Loads the embedded module once and memoizes the ready engine.
pub struct EngineLoader {
    environment: Arc<dyn HostEnvironment>,
    factory: Arc<dyn ModuleFactory>,
    config: BridgeConfig,
    engine: OnceCell<EngineHandle>,
    signal: Arc<ReadySignal>,
    instantiations: AtomicU64,
}

/// Puts the state back to `Unloaded` unless the attempt completed.
///
/// Also fires when the startup future is dropped, e.g. by a timeout.
struct AttemptGuard<'a> {
    signal: &'a ReadySignal,
    armed: bool,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Startup attempt abandoned, engine unloaded");
            self.signal.transition(EngineState::Unloaded);
        }
    }
}

impl EngineLoader {
    /// Create a loader with the default configuration.
    pub fn new(environment: Arc<dyn HostEnvironment>, factory: Arc<dyn ModuleFactory>) -> Self {
        Self::with_config(environment, factory, BridgeConfig::default())
    }

    pub fn with_config(
        environment: Arc<dyn HostEnvironment>,
        factory: Arc<dyn ModuleFactory>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            environment,
            factory,
            config,
            engine: OnceCell::new(),
            signal: Arc::new(ReadySignal::new()),
            instantiations: AtomicU64::new(0),
        }
    }

    /// Ensure the engine is ready using the configured mount.
    pub async fn ensure_ready(&self) -> Result<&EngineHandle> {
        if let Some(engine) = self.ready_engine() {
            return Ok(engine);
        }
        let spec = self.config.mount.clone();
        self.load(spec).await
    }

    /// Ensure the engine is ready, mounting `spec` if it has to be started.
    ///
    /// Once ready, the engine keeps its original mount; a differing `spec`
    /// is logged and ignored.
    pub async fn ensure_ready_with(&self, spec: MountSpec) -> Result<&EngineHandle> {
        if let Some(engine) = self.ready_engine() {
            if !same_mount(engine.mount(), &spec).await {
                warn!(
                    requested = ?spec,
                    active = ?engine.mount(),
                    "Engine already mounted elsewhere, keeping existing mount"
                );
            }
            return Ok(engine);
        }
        self.load(spec).await
    }

    /// Wait until some caller has brought the engine to `Ready`.
    ///
    /// Does not start the engine itself.
    pub async fn ready(&self) -> &EngineHandle {
        loop {
            self.signal.wait_ready().await;
            if let Some(engine) = self.engine.get() {
                return engine;
            }
            // Ready is published after the cell is filled; yield and recheck.
            tokio::task::yield_now().await;
        }
    }

    pub fn state(&self) -> EngineState {
        self.signal.state()
    }

    /// The engine, if it has been started.
    pub fn handle(&self) -> Option<&EngineHandle> {
        self.engine.get()
    }

    pub fn environment(&self) -> &Arc<dyn HostEnvironment> {
        &self.environment
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// How many times the module factory has been invoked.
    pub fn instantiations(&self) -> u64 {
        self.instantiations.load(Ordering::Relaxed)
    }

    fn ready_engine(&self) -> Option<&EngineHandle> {
        self.engine.get().filter(|engine| engine.is_ready())
    }

    async fn load(&self, spec: MountSpec) -> Result<&EngineHandle> {
        let startup = self.engine.get_or_try_init(|| self.start(spec));
        let engine = match self.config.startup_timeout {
            Some(limit) => tokio::time::timeout(limit, startup).await.map_err(|_| {
                warn!(timeout = ?limit, "Engine did not become ready in time");
                BridgeError::StartupStall(limit)
            })??,
            None => startup.await?,
        };
        self.signal.transition(EngineState::Ready);
        Ok(engine)
    }

    async fn start(&self, spec: MountSpec) -> Result<EngineHandle> {
        let mut guard = AttemptGuard {
            signal: &self.signal,
            armed: true,
        };
        self.signal.transition(EngineState::Instantiating);
        info!(virtual_root = %spec.virtual_root, host_root = ?spec.host_root, "Loading embedded module");

        self.environment
            .install()
            .map_err(BridgeError::EnvironmentSetup)?;

        self.instantiations.fetch_add(1, Ordering::Relaxed);
        let module = self
            .factory
            .instantiate(self.environment.clone())
            .await
            .map_err(BridgeError::Startup)?;
        self.signal.transition(EngineState::MountPending);

        // Pre-initialization: the mount must exist before module code runs.
        let fs = module.fs();
        let prepared = mount::prepare_mount(fs.as_ref(), &spec).await?;
        let mounted = MountSpec::new(prepared.virtual_root(), prepared.host_root());

        module.run_initializers().await.map_err(BridgeError::Startup)?;
        if !module.has_capabilities() {
            return Err(BridgeError::Startup(anyhow::anyhow!(
                "module {} finished initializing without its capabilities",
                module.name()
            )));
        }

        // Ready hook.
        prepared.finalize(fs.as_ref())?;

        guard.armed = false;
        info!(module = module.name(), "Embedded module ready");
        Ok(EngineHandle::new(module, mounted, self.signal.clone()))
    }
}

async fn same_mount(active: &MountSpec, requested: &MountSpec) -> bool {
    if active.virtual_root != requested.virtual_root.trim_end_matches('/') {
        return false;
    }
    same_dir(&active.host_root, &requested.host_root).await
}

async fn same_dir(canonical: &Path, other: &Path) -> bool {
    if canonical == other {
        return true;
    }
    tokio::fs::canonicalize(other)
        .await
        .is_ok_and(|p| p == canonical)
}

impl fmt::Debug for EngineLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLoader")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("instantiations", &self.instantiations())
            .finish_non_exhaustive()
    }
}
