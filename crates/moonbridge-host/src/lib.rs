//! Host bridge for embedding Lua scripts in a game host
//!
//! This crate owns the Lua state and exposes a curated set of host functions
//! to scripts: logging, `require` over mods and script directories, deferred
//! callbacks driven by the host tick, and proxies for host values and objects.

pub mod api;
pub mod config;
pub mod environment;
pub mod error;
pub mod modules;
pub mod proxy;
pub mod registrar;
pub mod reload;
pub mod scheduler;
pub mod script_files;
pub mod script_runner;

// Re-export commonly used types for hosts
pub use config::{BridgeConfig, ConfigLoadError};
pub use environment::{EnvironmentOptions, ScriptEnvironment};
pub use error::BridgeError;
pub use modules::{export_symbol, PackageContext, RegisteredScript};
pub use proxy::{ObjectHandle, ObjectId, SceneEvent, SceneGraph, SceneObject, TransformHandle, Vector3};
pub use registrar::ApiModule;
pub use reload::{setup_reload_signal, take_reload, ReloadSignal};
pub use scheduler::{CallbackId, CallbackScheduler};
pub use script_runner::ScriptRunner;
