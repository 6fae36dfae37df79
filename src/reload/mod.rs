//! Unit loading and reload orchestration.
//!
//! A unit is a source file executed by a [`UnitLoader`]. Every execution
//! binds its definitions through the [`Registry`](crate::registry::Registry),
//! so a reload swaps the contents of existing identities instead of creating
//! new ones.

mod diagnostic;
mod error;
mod loader;
mod notify;
mod orchestrator;
mod unit;

pub use diagnostic::{Diagnostic, DiagnosticSink, Frame, MemorySink, TracingSink};
pub use error::{LoadError, ReloadError, ReloadResult};
pub use loader::{LoadScope, UnitLoader, UnitSource};
pub use notify::{ReloadEvent, ReloadNotifier};
pub use orchestrator::Orchestrator;
pub use unit::{Binding, CodeUnit, Namespace, UnitPhase, UnitTable};
