//! Session settings: repeat mode, default source, stay-connected.
//!
//! Defines the read interface the session consumes plus a TOML-file backed
//! store whose updates rewrite only the keys they touch.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::Deserialize;
use toml_edit::{DocumentMut, Item, Table};

use crate::models::SessionKey;

/// Read access to per-session and global playback settings.
pub trait SettingsStore: Send + Sync {
    /// Whether tracks that finish normally rejoin the queue.
    fn repeat_mode(&self, key: SessionKey) -> bool;

    /// Default source id played when the queue empties, if configured.
    fn default_source(&self, key: SessionKey) -> Option<String>;

    /// Whether to keep the connection open after all content is exhausted.
    fn stay_connected(&self) -> bool;
}

/// Settings file schema.
///
/// ```toml
/// stay_connected = true
///
/// [sessions.640891]
/// repeat = true
/// default_source = "evening-rotation"
/// ```
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    stay_connected: Option<bool>,
    sessions: Option<HashMap<String, SessionSettings>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SessionSettings {
    repeat: Option<bool>,
    default_source: Option<String>,
}

/// TOML-file backed settings store.
///
/// Reads resolve against a cached parse; setters edit the document in place
/// so unrelated keys and comments survive every update.
pub struct FileSettings {
    path: PathBuf,
    cache: Mutex<SettingsFile>,
}

impl FileSettings {
    /// Load settings from `path`. A missing file yields defaults.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let parsed = match std::fs::read_to_string(&path) {
            Ok(raw) => parse_settings(&raw).with_context(|| format!("parse settings {:?}", path))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => SettingsFile::default(),
            Err(err) => return Err(err).with_context(|| format!("read settings {:?}", path)),
        };
        Ok(Self {
            path,
            cache: Mutex::new(parsed),
        })
    }

    /// Set the repeat flag for one session.
    pub fn set_repeat_mode(&self, key: SessionKey, repeat: bool) -> Result<()> {
        self.update(|doc| apply_repeat_mode(doc, key, repeat))
    }

    /// Set or clear the default source for one session.
    pub fn set_default_source(&self, key: SessionKey, source: Option<&str>) -> Result<()> {
        self.update(|doc| apply_default_source(doc, key, source))
    }

    /// Set the global stay-connected flag.
    pub fn set_stay_connected(&self, stay: bool) -> Result<()> {
        self.update(|doc| {
            doc["stay_connected"] = toml_edit::value(stay);
        })
    }

    fn update(&self, edit: impl FnOnce(&mut DocumentMut)) -> Result<()> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err).with_context(|| format!("read settings {:?}", self.path)),
        };
        let mut doc = raw
            .parse::<DocumentMut>()
            .with_context(|| format!("parse settings {:?}", self.path))?;
        edit(&mut doc);
        let updated = doc.to_string();
        std::fs::write(&self.path, &updated)
            .with_context(|| format!("write settings {:?}", self.path))?;

        let parsed =
            parse_settings(&updated).with_context(|| format!("reload settings {:?}", self.path))?;
        *self.lock_cache() = parsed;
        Ok(())
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, SettingsFile> {
        self.cache.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl SettingsStore for FileSettings {
    fn repeat_mode(&self, key: SessionKey) -> bool {
        self.lock_cache()
            .sessions
            .as_ref()
            .and_then(|sessions| sessions.get(&key.to_string()))
            .and_then(|s| s.repeat)
            .unwrap_or(false)
    }

    fn default_source(&self, key: SessionKey) -> Option<String> {
        self.lock_cache()
            .sessions
            .as_ref()
            .and_then(|sessions| sessions.get(&key.to_string()))
            .and_then(|s| s.default_source.clone())
    }

    fn stay_connected(&self) -> bool {
        self.lock_cache().stay_connected.unwrap_or(false)
    }
}

fn parse_settings(raw: &str) -> Result<SettingsFile> {
    toml::from_str::<SettingsFile>(raw).map_err(Into::into)
}

fn apply_repeat_mode(doc: &mut DocumentMut, key: SessionKey, repeat: bool) {
    session_table(doc, key)["repeat"] = toml_edit::value(repeat);
}

fn apply_default_source(doc: &mut DocumentMut, key: SessionKey, source: Option<&str>) {
    match source {
        Some(id) => session_table(doc, key)["default_source"] = toml_edit::value(id),
        None => clear_session_key(doc, key, "default_source"),
    }
}

/// Fetch (or create) the `[sessions.<key>]` table, normalizing any
/// non-table value that may sit in the way.
fn session_table(doc: &mut DocumentMut, key: SessionKey) -> &mut Table {
    let sessions = doc.entry("sessions").or_insert(Item::Table(Table::new()));
    if !sessions.is_table() {
        *sessions = Item::Table(Table::new());
    }
    let sessions = sessions.as_table_mut().expect("sessions is a table");
    let entry = sessions
        .entry(&key.to_string())
        .or_insert(Item::Table(Table::new()));
    if !entry.is_table() {
        *entry = Item::Table(Table::new());
    }
    entry.as_table_mut().expect("session entry is a table")
}

/// Remove one key from a session table, dropping tables that end up empty.
fn clear_session_key(doc: &mut DocumentMut, key: SessionKey, name: &str) {
    let id = key.to_string();
    let sessions_empty = {
        let Some(sessions) = doc.get_mut("sessions").and_then(Item::as_table_mut) else {
            return;
        };
        let mut drop_entry = false;
        if let Some(entry) = sessions.get_mut(&id).and_then(Item::as_table_mut) {
            entry.remove(name);
            drop_entry = entry.is_empty();
        }
        if drop_entry {
            sessions.remove(&id);
        }
        sessions.is_empty()
    };
    if sessions_empty {
        doc.as_table_mut().remove("sessions");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# global flags
stay_connected = true

[sessions.42]
repeat = true
default_source = "late-night"

[sessions.99]
repeat = false
"#;

    fn store_with(raw: &str) -> FileSettings {
        FileSettings {
            path: PathBuf::from("/nonexistent/settings.toml"),
            cache: Mutex::new(parse_settings(raw).unwrap()),
        }
    }

    #[test]
    fn resolves_per_session_values() {
        let store = store_with(SAMPLE);
        assert!(store.repeat_mode(42));
        assert!(!store.repeat_mode(99));
        assert_eq!(store.default_source(42).as_deref(), Some("late-night"));
        assert_eq!(store.default_source(99), None);
        assert!(store.stay_connected());
    }

    #[test]
    fn unknown_sessions_fall_back_to_defaults() {
        let store = store_with(SAMPLE);
        assert!(!store.repeat_mode(7));
        assert_eq!(store.default_source(7), None);

        let empty = store_with("");
        assert!(!empty.stay_connected());
        assert!(!empty.repeat_mode(42));
    }

    #[test]
    fn repeat_edit_preserves_unrelated_content() {
        let mut doc = SAMPLE.parse::<DocumentMut>().unwrap();
        apply_repeat_mode(&mut doc, 99, true);
        let updated = doc.to_string();

        assert!(updated.contains("# global flags"));
        assert!(updated.contains("default_source = \"late-night\""));
        let parsed = parse_settings(&updated).unwrap();
        assert_eq!(
            parsed.sessions.unwrap().get("99").unwrap().repeat,
            Some(true)
        );
    }

    #[test]
    fn edits_create_missing_tables() {
        let mut doc = DocumentMut::new();
        apply_repeat_mode(&mut doc, 5, true);
        apply_default_source(&mut doc, 5, Some("chill"));

        let parsed = parse_settings(&doc.to_string()).unwrap();
        let sessions = parsed.sessions.unwrap();
        assert_eq!(sessions.get("5").unwrap().repeat, Some(true));
        assert_eq!(
            sessions.get("5").unwrap().default_source.as_deref(),
            Some("chill")
        );
    }

    #[test]
    fn clearing_the_last_key_drops_the_session_table() {
        let mut doc = DocumentMut::new();
        apply_default_source(&mut doc, 5, Some("chill"));
        apply_default_source(&mut doc, 5, None);
        assert_eq!(doc.to_string().trim(), "");
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "jukebox-settings-{}-{}.toml",
            std::process::id(),
            line!()
        ));
        let _ = std::fs::remove_file(&path);

        let store = FileSettings::load(&path).unwrap();
        assert!(!store.repeat_mode(1));

        store.set_repeat_mode(1, true).unwrap();
        store.set_default_source(1, Some("rainy-day")).unwrap();
        store.set_stay_connected(true).unwrap();
        assert!(store.repeat_mode(1));

        let reloaded = FileSettings::load(&path).unwrap();
        assert!(reloaded.repeat_mode(1));
        assert_eq!(reloaded.default_source(1).as_deref(), Some("rainy-day"));
        assert!(reloaded.stay_connected());

        let _ = std::fs::remove_file(&path);
    }
}
