pub mod cli;
pub mod config;
pub mod editor;
pub mod highlight;
pub mod journaling;
pub mod model;
pub mod search;
pub mod storage;
pub mod store;
pub mod views;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use journaling::{AutoSaveEvent, AutoSaveRuntime, CommitSink};
pub use model::{Folder, FolderId, FolderSelector, Note, NoteId};
pub use store::Workspace;
