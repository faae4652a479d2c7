//! Shared fixtures and test doubles for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use vizbridge_core::engine::{EmbeddedModule, MatrixAllocator, ModuleFactory, ModuleFs};
use vizbridge_core::{
    BridgeConfig, BuiltinFactory, BuiltinModule, EngineLoader, HostEnvironment, ImageEnvironment,
    RasterBuffer,
};

/// Deterministic, non-repeating test pattern. Blue is fixed at 128.
pub fn pattern(x: u32, y: u32) -> [u8; 4] {
    let h = (x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503)).wrapping_mul(2_246_822_519);
    [(h >> 24) as u8, (h >> 16) as u8, 128, 255]
}

/// Write a PNG of `width` x `height` filled with [`pattern`], offset by `(ox, oy)`.
pub fn write_pattern_png(path: &Path, width: u32, height: u32, ox: u32, oy: u32) {
    image::RgbaImage::from_fn(width, height, |x, y| image::Rgba(pattern(x + ox, y + oy)))
        .save(path)
        .expect("failed to write fixture");
}

/// RGBA bytes of a file decoded with the `image` crate.
pub fn decode_rgba(path: &Path) -> image::RgbaImage {
    image::open(path).expect("failed to decode output").to_rgba8()
}

pub fn loader_at(host: &Path) -> Arc<EngineLoader> {
    loader_with(
        Arc::new(ImageEnvironment::new()),
        Arc::new(BuiltinFactory::new()),
        BridgeConfig::new().with_mount("/work", host),
    )
}

pub fn loader_with(
    environment: Arc<dyn HostEnvironment>,
    factory: Arc<dyn ModuleFactory>,
    config: BridgeConfig,
) -> Arc<EngineLoader> {
    Arc::new(EngineLoader::with_config(environment, factory, config))
}

/// Built-in factory that counts instantiations.
#[derive(Default)]
pub struct CountingFactory {
    pub calls: AtomicUsize,
}

impl CountingFactory {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleFactory for CountingFactory {
    async fn instantiate(
        &self,
        environment: Arc<dyn HostEnvironment>,
    ) -> anyhow::Result<Arc<dyn EmbeddedModule>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to race.
        tokio::task::yield_now().await;
        BuiltinFactory::new().instantiate(environment).await
    }
}

/// Environment whose installation always fails.
pub struct BrokenEnvironment;

impl HostEnvironment for BrokenEnvironment {
    fn install(&self) -> anyhow::Result<()> {
        bail!("canvas emulation unavailable")
    }

    fn is_installed(&self) -> bool {
        false
    }

    fn decode(&self, _bytes: &[u8]) -> anyhow::Result<RasterBuffer> {
        bail!("not installed")
    }

    fn encode(&self, _canvas: &RasterBuffer, format: &str) -> vizbridge_core::Result<Vec<u8>> {
        Err(vizbridge_core::BridgeError::Encode {
            format: format.to_string(),
            reason: "not installed".to_string(),
        })
    }
}

/// Module whose runtime never reports ready.
pub struct StallingModule {
    inner: BuiltinModule,
}

#[async_trait]
impl EmbeddedModule for StallingModule {
    fn name(&self) -> &str {
        "stalling"
    }

    fn fs(&self) -> Arc<dyn ModuleFs> {
        self.inner.fs()
    }

    fn matrices(&self) -> Arc<dyn MatrixAllocator> {
        self.inner.matrices()
    }

    async fn run_initializers(&self) -> anyhow::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }

    fn has_capabilities(&self) -> bool {
        false
    }
}

pub struct StallingFactory;

#[async_trait]
impl ModuleFactory for StallingFactory {
    async fn instantiate(
        &self,
        _environment: Arc<dyn HostEnvironment>,
    ) -> anyhow::Result<Arc<dyn EmbeddedModule>> {
        Ok(Arc::new(StallingModule {
            inner: BuiltinModule::new(),
        }))
    }
}

/// What the module filesystem looked like while the module initialized.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InitSnapshot {
    pub root_exists: bool,
    pub root_mounted: bool,
    pub cwd: String,
}

/// Built-in module that records the mount state seen by its initializers.
pub struct ObservingModule {
    inner: BuiltinModule,
    root: String,
    seen: Arc<std::sync::Mutex<Option<InitSnapshot>>>,
}

#[async_trait]
impl EmbeddedModule for ObservingModule {
    fn name(&self) -> &str {
        "observing"
    }

    fn fs(&self) -> Arc<dyn ModuleFs> {
        self.inner.fs()
    }

    fn matrices(&self) -> Arc<dyn MatrixAllocator> {
        self.inner.matrices()
    }

    async fn run_initializers(&self) -> anyhow::Result<()> {
        let fs = self.inner.fs();
        let snapshot = InitSnapshot {
            root_exists: fs.exists(&self.root),
            root_mounted: fs.resolve_host(&self.root).is_ok(),
            cwd: fs.cwd(),
        };
        *self.seen.lock().unwrap() = Some(snapshot);
        self.inner.run_initializers().await
    }

    fn has_capabilities(&self) -> bool {
        self.inner.has_capabilities()
    }
}

pub struct ObservingFactory {
    pub root: String,
    pub seen: Arc<std::sync::Mutex<Option<InitSnapshot>>>,
}

impl ObservingFactory {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            seen: Arc::default(),
        }
    }

    pub fn snapshot(&self) -> Option<InitSnapshot> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModuleFactory for ObservingFactory {
    async fn instantiate(
        &self,
        _environment: Arc<dyn HostEnvironment>,
    ) -> anyhow::Result<Arc<dyn EmbeddedModule>> {
        Ok(Arc::new(ObservingModule {
            inner: BuiltinModule::new(),
            root: self.root.clone(),
            seen: self.seen.clone(),
        }))
    }
}

/// Module whose initializers succeed without providing any capabilities.
pub struct IncapableModule {
    inner: BuiltinModule,
}

#[async_trait]
impl EmbeddedModule for IncapableModule {
    fn name(&self) -> &str {
        "incapable"
    }

    fn fs(&self) -> Arc<dyn ModuleFs> {
        self.inner.fs()
    }

    fn matrices(&self) -> Arc<dyn MatrixAllocator> {
        self.inner.matrices()
    }

    async fn run_initializers(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn has_capabilities(&self) -> bool {
        false
    }
}

pub struct IncapableFactory;

#[async_trait]
impl ModuleFactory for IncapableFactory {
    async fn instantiate(
        &self,
        _environment: Arc<dyn HostEnvironment>,
    ) -> anyhow::Result<Arc<dyn EmbeddedModule>> {
        Ok(Arc::new(IncapableModule {
            inner: BuiltinModule::new(),
        }))
    }
}
