//! Raw and settled change events.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use notify::event::{ModifyKind, RemoveKind, RenameMode};

/// Kind of a filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Created => write!(f, "created"),
            EventKind::Modified => write!(f, "modified"),
            EventKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// A change as reported by an event source, before debouncing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub path: PathBuf,
    pub kind: EventKind,
    pub is_directory: bool,
    pub timestamp: Instant,
}

impl RawEvent {
    pub fn new(path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self::at(path, kind, Instant::now())
    }

    pub fn at(path: impl Into<PathBuf>, kind: EventKind, timestamp: Instant) -> Self {
        Self {
            path: path.into(),
            kind,
            is_directory: false,
            timestamp,
        }
    }

    pub fn directory(mut self) -> Self {
        self.is_directory = true;
        self
    }

    /// Translate a `notify` event into zero or more raw events.
    ///
    /// Renames become a deletion of the old path and a creation of the new
    /// one; access and metadata-free events are dropped.
    pub fn from_notify(event: &notify::Event) -> Vec<RawEvent> {
        use notify::EventKind as N;

        let now = Instant::now();
        let make = |path: &PathBuf, kind: EventKind, is_directory: bool| RawEvent {
            path: path.clone(),
            kind,
            is_directory,
            timestamp: now,
        };

        match &event.kind {
            N::Create(kind) => {
                let is_dir = matches!(kind, notify::event::CreateKind::Folder);
                event
                    .paths
                    .iter()
                    .map(|p| make(p, EventKind::Created, is_dir || p.is_dir()))
                    .collect()
            }
            N::Remove(kind) => {
                let is_dir = matches!(kind, RemoveKind::Folder);
                event
                    .paths
                    .iter()
                    .map(|p| make(p, EventKind::Deleted, is_dir))
                    .collect()
            }
            N::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => event
                    .paths
                    .iter()
                    .map(|p| make(p, EventKind::Deleted, false))
                    .collect(),
                RenameMode::To => event
                    .paths
                    .iter()
                    .map(|p| make(p, EventKind::Created, p.is_dir()))
                    .collect(),
                RenameMode::Both if event.paths.len() == 2 => vec![
                    make(&event.paths[0], EventKind::Deleted, false),
                    make(&event.paths[1], EventKind::Created, event.paths[1].is_dir()),
                ],
                // Unpaired renames: whatever is at the path now decides.
                _ => event
                    .paths
                    .iter()
                    .map(|p| {
                        if p.exists() {
                            make(p, EventKind::Created, p.is_dir())
                        } else {
                            make(p, EventKind::Deleted, false)
                        }
                    })
                    .collect(),
            },
            N::Modify(_) => event
                .paths
                .iter()
                .map(|p| make(p, EventKind::Modified, p.is_dir()))
                .collect(),
            N::Access(_) | N::Any | N::Other => Vec::new(),
        }
    }
}

/// The single notification emitted for a path once a burst has settled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SettledEvent {
    pub path: PathBuf,
    pub kind: EventKind,
}

impl From<&RawEvent> for SettledEvent {
    fn from(event: &RawEvent) -> Self {
        Self {
            path: event.path.clone(),
            kind: event.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange};

    #[test]
    fn test_from_notify_modify() {
        let event = notify::Event::new(notify::EventKind::Modify(ModifyKind::Data(
            DataChange::Content,
        )))
        .add_path(PathBuf::from("/nonexistent/a.hr"));

        let raw = RawEvent::from_notify(&event);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].kind, EventKind::Modified);
        assert!(!raw[0].is_directory);
    }

    #[test]
    fn test_from_notify_rename_both() {
        let event = notify::Event::new(notify::EventKind::Modify(ModifyKind::Name(
            RenameMode::Both,
        )))
        .add_path(PathBuf::from("/nonexistent/a.tmp"))
        .add_path(PathBuf::from("/nonexistent/a.hr"));

        let raw = RawEvent::from_notify(&event);
        let kinds: Vec<_> = raw.iter().map(|e| (e.path.clone(), e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (PathBuf::from("/nonexistent/a.tmp"), EventKind::Deleted),
                (PathBuf::from("/nonexistent/a.hr"), EventKind::Created),
            ]
        );
    }

    #[test]
    fn test_from_notify_folder_and_access() {
        let folder = notify::Event::new(notify::EventKind::Create(CreateKind::Folder))
            .add_path(PathBuf::from("/nonexistent/pkg"));
        assert!(RawEvent::from_notify(&folder)[0].is_directory);

        let access = notify::Event::new(notify::EventKind::Access(
            notify::event::AccessKind::Read,
        ))
        .add_path(PathBuf::from("/nonexistent/a.hr"));
        assert!(RawEvent::from_notify(&access).is_empty());
    }
}
