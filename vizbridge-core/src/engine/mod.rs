//! Engine module - Lifecycle of the embedded vision module
//!
//! This module contains the capability contract of the embedded module, its
//! lifecycle state machine, and the loader that drives the startup handshake.

pub mod handle;
pub mod loader;
pub mod module;
pub mod state;

pub use handle::EngineHandle;
pub use loader::EngineLoader;
pub use module::{EmbeddedModule, MatrixAllocator, ModuleFactory, ModuleFs};
pub use state::{EngineState, ReadySignal};
