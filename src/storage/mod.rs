//! Local key-value persistence, the desktop stand-in for browser storage.
//! Values are plain strings; structured state goes in as JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::config::themes::ThemeMode;
use crate::config::{ConfigPaths, StorageOptions};
use crate::store::Workspace;

mod schema;

pub const WORKSPACE_KEY: &str = "workspace";
pub const THEME_KEY: &str = "theme";
/// Prefix for copies of snapshots that failed to parse.
pub const CORRUPT_WORKSPACE_PREFIX: &str = "workspace.corrupt-";

/// A resizable panel whose width survives restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelSpec {
    pub key: &'static str,
    pub default: u32,
    pub min: u32,
    pub max: u32,
}

impl PanelSpec {
    pub fn clamp(&self, width: i64) -> u32 {
        width.clamp(i64::from(self.min), i64::from(self.max)) as u32
    }

    /// Accepts only a plain decimal integer inside the bounds.
    pub fn parse_stored(&self, raw: Option<&str>) -> u32 {
        let Some(raw) = raw.map(str::trim) else {
            return self.default;
        };
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return self.default;
        }
        match raw.parse::<u32>() {
            Ok(width) if (self.min..=self.max).contains(&width) => width,
            _ => self.default,
        }
    }
}

pub const SIDEBAR_PANEL: PanelSpec = PanelSpec {
    key: "sidebar-width",
    default: 280,
    min: 200,
    max: 400,
};

pub const NOTES_LIST_PANEL: PanelSpec = PanelSpec {
    key: "notes-list-width",
    default: 350,
    min: 280,
    max: 500,
};

pub const PANELS: [PanelSpec; 2] = [SIDEBAR_PANEL, NOTES_LIST_PANEL];

#[derive(Clone)]
pub struct LocalStore {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl LocalStore {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
                .optional()
                .with_context(|| format!("reading key {key}"))
        })
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("writing key {key}"))?;
            Ok(())
        })
    }

    /// Returns whether the key existed.
    pub fn remove_item(&self, key: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let removed = conn
                .execute("DELETE FROM kv WHERE key = ?1", [key])
                .with_context(|| format!("removing key {key}"))?;
            Ok(removed > 0)
        })
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
            let keys = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(keys)
        })
    }

    /// The saved workspace, or `None` when nothing usable is stored. A
    /// snapshot that fails to parse is copied to a
    /// `workspace.corrupt-<unix ts>` key before `None` is returned, so a
    /// later save cannot destroy it.
    pub fn load_workspace(&self) -> Result<Option<Workspace>> {
        let Some(raw) = self.get_item(WORKSPACE_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Workspace>(&raw) {
            Ok(workspace) => Ok(Some(workspace)),
            Err(err) => {
                let backup = self.preserve_corrupt_workspace(&raw)?;
                tracing::error!(
                    %err,
                    backup = %backup,
                    "stored workspace is unreadable; original kept under backup key"
                );
                Ok(None)
            }
        }
    }

    /// Keys holding preserved unreadable snapshots, oldest first.
    pub fn corrupt_workspace_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|key| key.starts_with(CORRUPT_WORKSPACE_PREFIX))
            .collect())
    }

    fn preserve_corrupt_workspace(&self, raw: &str) -> Result<String> {
        let stamp = OffsetDateTime::now_utc().unix_timestamp();
        let mut key = format!("{CORRUPT_WORKSPACE_PREFIX}{stamp}");
        let mut attempt = 1;
        while let Some(existing) = self.get_item(&key)? {
            if existing == raw {
                return Ok(key);
            }
            key = format!("{CORRUPT_WORKSPACE_PREFIX}{stamp}-{attempt}");
            attempt += 1;
        }
        self.set_item(&key, raw)
            .context("preserving unreadable workspace")?;
        Ok(key)
    }

    pub fn save_workspace(&self, workspace: &Workspace) -> Result<()> {
        let json = serde_json::to_string(workspace).context("serialising workspace")?;
        self.set_item(WORKSPACE_KEY, &json)?;
        tracing::debug!(
            notes = workspace.notes.len(),
            folders = workspace.folders.folders().len(),
            "workspace saved"
        );
        Ok(())
    }

    pub fn load_panel_width(&self, panel: &PanelSpec) -> Result<u32> {
        let raw = self.get_item(panel.key)?;
        Ok(panel.parse_stored(raw.as_deref()))
    }

    /// Clamps into the panel's bounds before storing; returns the stored width.
    pub fn save_panel_width(&self, panel: &PanelSpec, width: i64) -> Result<u32> {
        let width = panel.clamp(width);
        self.set_item(panel.key, &width.to_string())?;
        Ok(width)
    }

    pub fn load_theme(&self) -> Result<Option<ThemeMode>> {
        let raw = self.get_item(THEME_KEY)?;
        Ok(ThemeMode::from_stored(raw.as_deref()))
    }

    pub fn save_theme(&self, theme: ThemeMode) -> Result<()> {
        self.set_item(THEME_KEY, theme.as_ref())
    }
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<LocalStore> {
    let db_path = if storage.database_path.as_os_str().is_empty() {
        &paths.database_path
    } else {
        &storage.database_path
    };
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    Ok(LocalStore {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}
