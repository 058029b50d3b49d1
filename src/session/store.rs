//! Durable session persistence
//!
//! The session is kept as three string keys (`language`, `savedCode`,
//! `fontSize`) in a key/value backend. Every mutation is written through
//! before the in-memory session is updated.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{clamp_font_size, Session, SessionPatch, DEFAULT_FONT_SIZE};
use crate::languages::Language;

/// Storage key constants
pub mod keys {
    /// Selected language (wire name, e.g. "python")
    pub const LANGUAGE: &str = "language";

    /// Source code text
    pub const SAVED_CODE: &str = "savedCode";

    /// Editor font size, stringified integer
    pub const FONT_SIZE: &str = "fontSize";
}

const SESSION_FILE: &str = "session.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable string key/value storage
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;

    /// Write all entries in one durable update
    fn set_many(&mut self, entries: Vec<(&'static str, String)>) -> Result<(), StoreError>;
}

/// Key/value store backed by a JSON object in a single file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Open (or create) the session file inside `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(SESSION_FILE);
        let entries = match fs::read_to_string(&path) {
            Ok(content) => parse_entries(&content).unwrap_or_else(|e| {
                warn!("Session file {} is corrupt ({}), starting fresh", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        debug!("Opened session file {} ({} keys)", path.display(), entries.len());

        Ok(Self { path, entries })
    }

    /// Replace the session file atomically with the current entries
    fn flush(&self) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        serde_json::to_writer_pretty(&mut tmp, &self.entries)?;
        tmp.flush().map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        Ok(())
    }
}

/// Parse the session file; non-string values are kept as their JSON text
fn parse_entries(content: &str) -> Result<BTreeMap<String, String>, serde_json::Error> {
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(content)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((k, s)),
            other => Some((k, other.to_string())),
        })
        .collect())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set_many(&mut self, entries: Vec<(&'static str, String)>) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        let previous = self.entries.clone();
        for (key, value) in entries {
            self.entries.insert(key.to_string(), value);
        }

        if let Err(e) = self.flush() {
            self.entries = previous;
            return Err(e);
        }

        debug!("Persisted session to {}", self.path.display());
        Ok(())
    }
}

/// Owner of the current `Session`.
///
/// The latest session is also published on a `watch` channel so readers
/// (like the run shortcut) always observe the current value.
pub struct SessionStore<S: KeyValueStore = FileStore> {
    backend: S,
    current: watch::Sender<Session>,
}

impl SessionStore<FileStore> {
    /// Open the durable session stored under `state_dir`
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::new(FileStore::open(state_dir)?))
    }
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(backend: S) -> Self {
        let session = read_session(&backend, String::new());
        let (current, _) = watch::channel(session);
        Self { backend, current }
    }

    /// Read the persisted session.
    ///
    /// `code` falls back to the language boilerplate only when no code was
    /// ever saved. `input` is not persisted and comes from memory.
    pub fn load(&self) -> Session {
        read_session(&self.backend, self.current.borrow().input.clone())
    }

    /// Current in-memory session
    pub fn current(&self) -> Session {
        self.current.borrow().clone()
    }

    /// Receiver that always holds the latest session
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.current.subscribe()
    }

    /// Merge `patch` into the session and persist it.
    ///
    /// Switching language re-seeds the code with the new language's
    /// boilerplate when the user has not written any code yet.
    pub fn save(&mut self, patch: SessionPatch) -> Result<Session, StoreError> {
        let mut next = self.current();
        let mut entries: Vec<(&'static str, String)> = Vec::new();

        if let Some(language) = patch.language {
            if language != next.language && patch.code.is_none() {
                let untouched = self.backend.get(keys::SAVED_CODE).is_none()
                    || next.code == next.language.boilerplate();
                if untouched {
                    next.code = language.boilerplate().to_string();
                    entries.push((keys::SAVED_CODE, next.code.clone()));
                }
            }
            next.language = language;
            entries.push((keys::LANGUAGE, language.as_str().to_string()));
        }

        if let Some(code) = patch.code {
            next.code = code;
            entries.push((keys::SAVED_CODE, next.code.clone()));
        }

        if let Some(size) = patch.font_size {
            next.font_size = clamp_font_size(size);
            entries.push((keys::FONT_SIZE, next.font_size.to_string()));
        }

        if let Some(input) = patch.input {
            next.input = input;
        }

        self.backend.set_many(entries)?;
        self.current.send_replace(next.clone());

        Ok(next)
    }

    /// Replace the code with the current language's boilerplate
    pub fn reset_code(&mut self) -> Result<Session, StoreError> {
        let boilerplate = self.current.borrow().language.boilerplate().to_string();
        self.save(SessionPatch::new().with_code(boilerplate))
    }
}

fn read_session<S: KeyValueStore>(backend: &S, input: String) -> Session {
    let language = match backend.get(keys::LANGUAGE) {
        Some(raw) => raw.parse::<Language>().unwrap_or_else(|e| {
            warn!("Ignoring stored language: {}", e);
            Language::default()
        }),
        None => Language::default(),
    };

    let code = backend
        .get(keys::SAVED_CODE)
        .unwrap_or_else(|| language.boilerplate().to_string());

    let font_size = backend
        .get(keys::FONT_SIZE)
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .map(clamp_font_size)
        .unwrap_or(DEFAULT_FONT_SIZE);

    Session {
        language,
        code,
        input,
        font_size,
    }
}
