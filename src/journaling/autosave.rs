use std::time::{Duration, Instant};

use thiserror::Error;
use time::OffsetDateTime;

use crate::config::AutoSaveConfig;
use crate::editor;
use crate::model::{NoteId, UNTITLED};

/// Where a debounced edit lands once the quiet period is over.
pub trait CommitSink {
    fn commit_edit(&mut self, id: NoteId, title: &str, content: &str) -> Result<(), CommitError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("note {0} no longer exists")]
    MissingNote(NoteId),
    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveStatus {
    Disabled,
    Inactive,
    Idle {
        note_id: NoteId,
        last_saved_at: Option<OffsetDateTime>,
    },
    Pending {
        note_id: NoteId,
        since: OffsetDateTime,
    },
    Error {
        note_id: NoteId,
        message: String,
        occurred_at: OffsetDateTime,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveEvent {
    Saved {
        note_id: NoteId,
        timestamp: OffsetDateTime,
    },
    Error {
        note_id: NoteId,
        message: String,
    },
}

/// A commit handed out by [`AutoSaveRuntime::take_due`]. While one is
/// outstanding the runtime hands out no other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommit {
    pub note_id: NoteId,
    pub title: String,
    pub content: String,
}

/// Debounced write-back of the editor buffer for one open note at a time.
#[derive(Debug)]
pub struct AutoSaveRuntime {
    enabled: bool,
    derive_title: bool,
    debounce: Duration,
    session: Option<Session>,
}

#[derive(Debug)]
struct Session {
    note_id: NoteId,
    title: String,
    content: String,
    committed_title: String,
    committed_content: String,
    dirty_since: Option<Instant>,
    dirty_since_wall: Option<OffsetDateTime>,
    in_flight: bool,
    last_saved_at: Option<OffsetDateTime>,
    last_error: Option<AutoSaveFailure>,
}

#[derive(Debug, Clone)]
struct AutoSaveFailure {
    message: String,
    occurred_at: OffsetDateTime,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum FlushKind {
    Debounced,
    Immediate,
}

impl AutoSaveRuntime {
    pub fn new(config: &AutoSaveConfig) -> Self {
        Self {
            enabled: config.enabled,
            derive_title: config.derive_title,
            debounce: config.debounce_duration(),
            session: None,
        }
    }

    pub fn status(&self) -> AutoSaveStatus {
        if !self.enabled {
            return AutoSaveStatus::Disabled;
        }
        let Some(session) = &self.session else {
            return AutoSaveStatus::Inactive;
        };
        if let Some(failure) = &session.last_error {
            return AutoSaveStatus::Error {
                note_id: session.note_id,
                message: failure.message.clone(),
                occurred_at: failure.occurred_at,
            };
        }
        if session.is_dirty() || session.in_flight {
            let since = session
                .dirty_since_wall
                .unwrap_or_else(OffsetDateTime::now_utc);
            return AutoSaveStatus::Pending {
                note_id: session.note_id,
                since,
            };
        }
        AutoSaveStatus::Idle {
            note_id: session.note_id,
            last_saved_at: session.last_saved_at,
        }
    }

    pub fn active_note(&self) -> Option<NoteId> {
        self.session.as_ref().map(|s| s.note_id)
    }

    pub fn has_dirty_changes(&self) -> bool {
        self.session.as_ref().map(|s| s.is_dirty()).unwrap_or(false)
    }

    /// Opens the buffer for `note_id`. The given text is taken as already
    /// committed. Starting over an unsaved session discards its buffer.
    pub fn start_session(&mut self, note_id: NoteId, title: &str, content: &str) {
        if let Some(previous) = &self.session {
            if previous.is_dirty() {
                tracing::warn!(
                    note = %previous.note_id,
                    "discarding unsaved edits; end_session was not called"
                );
            }
        }
        tracing::debug!(note = %note_id, "autosave session started");
        self.session = Some(Session::new(note_id, title, content));
    }

    /// Replaces the buffer and re-arms the debounce deadline. Edits for a
    /// note other than the open one are ignored.
    pub fn update_buffer(&mut self, note_id: NoteId, title: &str, content: &str) {
        self.update_buffer_at(note_id, title, content, Instant::now());
    }

    pub fn update_buffer_at(&mut self, note_id: NoteId, title: &str, content: &str, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.note_id != note_id {
            tracing::debug!(note = %note_id, "edit for inactive note ignored");
            return;
        }
        if session.title == title && session.content == content {
            return;
        }
        session.title.clear();
        session.title.push_str(title);
        session.content.clear();
        session.content.push_str(content);
        session.dirty_since = Some(now);
        session.dirty_since_wall = Some(OffsetDateTime::now_utc());
    }

    pub fn poll(&mut self, sink: &mut impl CommitSink) -> Option<AutoSaveEvent> {
        self.poll_at(sink, Instant::now())
    }

    /// Commits when the buffer has been quiet for the debounce period as of
    /// `now`.
    pub fn poll_at(&mut self, sink: &mut impl CommitSink, now: Instant) -> Option<AutoSaveEvent> {
        if !self.enabled {
            return None;
        }
        let commit = self.take(FlushKind::Debounced, now)?;
        Some(self.run(sink, commit))
    }

    /// Commits right away, skipping the debounce. Works with auto-save
    /// disabled, as an explicit save does.
    pub fn flush_now(&mut self, sink: &mut impl CommitSink) -> Option<AutoSaveEvent> {
        let commit = self.take(FlushKind::Immediate, Instant::now())?;
        Some(self.run(sink, commit))
    }

    /// Flushes outstanding edits and closes the session.
    pub fn end_session(&mut self, sink: &mut impl CommitSink) -> Option<AutoSaveEvent> {
        let event = self.flush_now(sink);
        if let Some(session) = self.session.take() {
            if session.is_dirty() {
                tracing::warn!(note = %session.note_id, "closing session with unsaved edits");
            }
        }
        event
    }

    /// Hands out the due commit, if any, and marks it in flight. Callers that
    /// save asynchronously report back through [`AutoSaveRuntime::complete`].
    pub fn take_due(&mut self, now: Instant) -> Option<PendingCommit> {
        if !self.enabled {
            return None;
        }
        self.take(FlushKind::Debounced, now)
    }

    pub fn complete(
        &mut self,
        commit: PendingCommit,
        result: Result<(), CommitError>,
    ) -> AutoSaveEvent {
        let timestamp = OffsetDateTime::now_utc();
        let Some(session) = self
            .session
            .as_mut()
            .filter(|session| session.note_id == commit.note_id)
        else {
            return match result {
                Ok(()) => AutoSaveEvent::Saved {
                    note_id: commit.note_id,
                    timestamp,
                },
                Err(err) => AutoSaveEvent::Error {
                    note_id: commit.note_id,
                    message: err.to_string(),
                },
            };
        };
        session.in_flight = false;
        match result {
            Ok(()) => {
                session.committed_title = commit.title;
                session.committed_content = commit.content;
                if !session.is_dirty() {
                    session.dirty_since = None;
                    session.dirty_since_wall = None;
                }
                session.last_saved_at = Some(timestamp);
                session.last_error = None;
                tracing::debug!(note = %commit.note_id, "autosave committed");
                AutoSaveEvent::Saved {
                    note_id: commit.note_id,
                    timestamp,
                }
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(note = %commit.note_id, error = %message, "autosave failed");
                session.last_error = Some(AutoSaveFailure {
                    message: message.clone(),
                    occurred_at: timestamp,
                });
                AutoSaveEvent::Error {
                    note_id: commit.note_id,
                    message,
                }
            }
        }
    }

    fn run(&mut self, sink: &mut impl CommitSink, commit: PendingCommit) -> AutoSaveEvent {
        let result = sink.commit_edit(commit.note_id, &commit.title, &commit.content);
        self.complete(commit, result)
    }

    fn take(&mut self, mode: FlushKind, now: Instant) -> Option<PendingCommit> {
        let derive_title = self.derive_title;
        let debounce = self.debounce;
        let session = self.session.as_mut()?;
        if session.in_flight || session.dirty_since.is_none() {
            return None;
        }
        if mode == FlushKind::Debounced {
            let ready = session
                .dirty_since
                .map(|since| now.saturating_duration_since(since) >= debounce)
                .unwrap_or(false);
            if !ready {
                return None;
            }
        }
        if derive_title && session.title.trim().is_empty() {
            session.title = editor::detect_title(&session.content)
                .unwrap_or_else(|| UNTITLED.to_string());
        }
        if !session.is_dirty() {
            session.dirty_since = None;
            session.dirty_since_wall = None;
            return None;
        }
        session.in_flight = true;
        Some(PendingCommit {
            note_id: session.note_id,
            title: session.title.clone(),
            content: session.content.clone(),
        })
    }
}

impl Session {
    fn new(note_id: NoteId, title: &str, content: &str) -> Self {
        Self {
            note_id,
            title: title.to_string(),
            content: content.to_string(),
            committed_title: title.to_string(),
            committed_content: content.to_string(),
            dirty_since: None,
            dirty_since_wall: None,
            in_flight: false,
            last_saved_at: None,
            last_error: None,
        }
    }

    fn is_dirty(&self) -> bool {
        self.title != self.committed_title || self.content != self.committed_content
    }
}
