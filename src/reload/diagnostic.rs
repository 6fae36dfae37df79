//! Failure reports for reloads.
//!
//! A diagnostic carries the stack of frames that led to a failure. Frames
//! belonging to the reload machinery itself are noise for someone editing a
//! unit, so by default only frames located in the unit's own source survive.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// One location in a failure trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub origin: PathBuf,
    pub line: Option<usize>,
    pub context: String,
}

impl Frame {
    pub fn new(origin: impl Into<PathBuf>, line: Option<usize>, context: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            line,
            context: context.into(),
        }
    }

    /// A frame inside this crate, built from `file!()` and `line!()`.
    pub(crate) fn internal(file: &'static str, line: u32, context: &str) -> Self {
        Self::new(file, Some(line as usize), context)
    }
}

/// Formatted report of a failed load or reload.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub unit: String,
    pub origin: PathBuf,
    pub frames: Vec<Frame>,
    pub message: String,
    source: Option<String>,
}

impl Diagnostic {
    pub fn new(
        unit: impl Into<String>,
        origin: impl Into<PathBuf>,
        frames: Vec<Frame>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            unit: unit.into(),
            origin: origin.into(),
            frames,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the unit's source text so frames can quote their line.
    pub fn with_source(mut self, source: Option<&str>) -> Self {
        self.source = source.map(str::to_string);
        self
    }

    /// Keep only frames that originate from the unit's own source.
    pub fn trimmed(mut self, trim: bool) -> Self {
        if trim {
            let origin = self.origin.clone();
            self.frames.retain(|frame| is_same_file(&frame.origin, &origin));
        }
        self
    }

    fn source_line(&self, frame: &Frame) -> Option<&str> {
        let line = frame.line?;
        if !is_same_file(&frame.origin, &self.origin) {
            return None;
        }
        self.source
            .as_deref()?
            .lines()
            .nth(line.checked_sub(1)?)
            .map(str::trim)
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    a == b
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Traceback for unit '{}' (most recent call last):", self.unit)?;
        for frame in &self.frames {
            match frame.line {
                Some(line) => writeln!(f, "  {}:{line}, in {}", frame.origin.display(), frame.context)?,
                None => writeln!(f, "  {}, in {}", frame.origin.display(), frame.context)?,
            }
            if let Some(text) = self.source_line(frame) {
                writeln!(f, "    {text}")?;
            }
        }
        write!(f, "{}", self.message)
    }
}

/// Presentation collaborator for failure reports.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Sink that logs diagnostics at error level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        tracing::error!(
            "[reload] an error occurred while reloading '{}'\n\n{diagnostic}",
            diagnostic.unit
        );
    }
}

/// Sink that keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Diagnostic> {
        self.reports.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, diagnostic: &Diagnostic) {
        self.reports.lock().push(diagnostic.clone());
    }
}
