//! Error types for loading and reloading units.

use std::path::PathBuf;
use thiserror::Error;

use super::diagnostic::Frame;
use crate::registry::{CallError, RegistryError};

/// Failure raised by a [`UnitLoader`](super::UnitLoader) while executing a unit.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("syntax error: {message}")]
    Syntax { message: String, frame: Frame },

    #[error("{message}")]
    Execution { message: String, frames: Vec<Frame> },

    #[error("{source}")]
    Registry {
        #[source]
        source: RegistryError,
        frames: Vec<Frame>,
    },
}

impl LoadError {
    pub fn syntax(message: impl Into<String>, frame: Frame) -> Self {
        Self::Syntax {
            message: message.into(),
            frame,
        }
    }

    /// An error raised by unit code, located by `frames` (outermost first).
    pub fn execution(error: &CallError, frames: Vec<Frame>) -> Self {
        Self::Execution {
            message: format!("error: {error}"),
            frames,
        }
    }

    /// Frames leading to the failure, outermost first.
    pub fn frames(&self) -> Vec<Frame> {
        match self {
            Self::Syntax { frame, .. } => vec![frame.clone()],
            Self::Execution { frames, .. } | Self::Registry { frames, .. } => frames.clone(),
        }
    }
}

impl From<RegistryError> for LoadError {
    fn from(source: RegistryError) -> Self {
        Self::Registry {
            source,
            frames: Vec::new(),
        }
    }
}

/// Errors surfaced by the reload orchestrator.
#[derive(Error, Debug)]
pub enum ReloadError {
    #[error("cannot read unit '{unit}' from {}: {source}", path.display())]
    Read {
        unit: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load unit '{unit}': {source}")]
    Load {
        unit: String,
        #[source]
        source: LoadError,
    },

    #[error("unit name '{unit}' is already bound to {}", existing.display())]
    NameConflict { unit: String, existing: PathBuf },
}

impl ReloadError {
    pub fn frames(&self) -> Vec<Frame> {
        match self {
            Self::Load { source, .. } => source.frames(),
            Self::Read { .. } | Self::NameConflict { .. } => Vec::new(),
        }
    }

    /// Message shown under the frames of a diagnostic.
    pub fn summary(&self) -> String {
        match self {
            Self::Load { source, .. } => source.to_string(),
            other => other.to_string(),
        }
    }
}

pub type ReloadResult<T> = Result<T, ReloadError>;
