//! Hot reloading of definition scripts with identity-preserving swaps.
//!
//! ```text
//! filesystem --> watcher (debounced sessions) --> reload::Orchestrator
//!                                                   |  UnitLoader (script)
//!                                                   v
//!                                                registry (swap in place)
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod logging;
pub mod registry;
pub mod reload;
pub mod script;
pub mod watcher;

pub use config::Settings;
pub use context::ReloadContext;
pub use registry::{ClassIdentity, FunctionIdentity, Instance, Registry, Value};
pub use reload::{CodeUnit, Orchestrator, ReloadError, ReloadEvent};
pub use script::DefinitionLoader;
pub use watcher::{SessionManager, WatchSession};
