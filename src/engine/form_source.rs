//! Form definitions by id
//!
//! Forms stored on disk live at `<form_dir>/form_<id>.json`, one file per
//! form. Loaded forms are cached for the lifetime of the loader.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::component::Form;
use crate::observability::{log_event_with_fields, Event};

use super::errors::{FormSourceError, FormSourceResult};

/// Trait for looking up the authoritative component tree of a form
#[async_trait]
pub trait FormSource: Send + Sync + std::fmt::Debug {
    /// Loads the form with the given id
    async fn load_form(&self, form_id: &str) -> FormSourceResult<Form>;
}

/// Form loader that reads form files from disk and keeps an in-memory registry.
#[derive(Debug)]
pub struct FormLoader {
    /// Directory containing form files
    form_dir: PathBuf,
    /// Loaded forms indexed by id
    forms: RwLock<HashMap<String, Form>>,
}

impl FormLoader {
    /// Creates a loader reading `form_<id>.json` files from `form_dir`.
    pub fn new(form_dir: &Path) -> Self {
        Self {
            form_dir: form_dir.to_path_buf(),
            forms: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the form directory path.
    pub fn form_dir(&self) -> &Path {
        &self.form_dir
    }

    /// Registers a form directly, replacing any cached form with its id.
    ///
    /// # Errors
    ///
    /// Returns `MissingId` if the form has no `_id`.
    pub async fn register(&self, form: Form) -> FormSourceResult<()> {
        let id = form.id.clone().ok_or(FormSourceError::MissingId)?;
        self.forms.write().await.insert(id, form);
        Ok(())
    }

    /// Loads every `form_*.json` file in the form directory.
    ///
    /// Returns the number of forms loaded. A missing directory holds no forms.
    pub async fn load_all(&self) -> FormSourceResult<usize> {
        let mut entries = match tokio::fs::read_dir(&self.form_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(FormSourceError::Io(format!("Failed to read form directory: {}", e))),
        };

        let mut loaded = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FormSourceError::Io(format!("Failed to read directory entry: {}", e)))?
        {
            let file_name = entry.file_name();
            let Some(id) = file_name
                .to_str()
                .and_then(|name| name.strip_prefix("form_"))
                .and_then(|name| name.strip_suffix(".json"))
            else {
                continue;
            };
            let form = self.read_form_file(id, &entry.path()).await?;
            self.forms.write().await.insert(id.to_string(), form);
            loaded += 1;
        }

        Ok(loaded)
    }

    /// Returns the number of cached forms.
    pub async fn form_count(&self) -> usize {
        self.forms.read().await.len()
    }

    fn form_path(&self, form_id: &str) -> FormSourceResult<PathBuf> {
        let valid = !form_id.is_empty()
            && form_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(FormSourceError::InvalidId(form_id.to_string()));
        }
        Ok(self.form_dir.join(format!("form_{}.json", form_id)))
    }

    async fn read_form_file(&self, form_id: &str, path: &Path) -> FormSourceResult<Form> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FormSourceError::NotFound(form_id.to_string()))
            }
            Err(e) => return Err(FormSourceError::Io(format!("Failed to read {}: {}", path.display(), e))),
        };

        let mut form: Form = serde_json::from_str(&content).map_err(|e| FormSourceError::Malformed {
            id: form_id.to_string(),
            message: format!("Invalid JSON: {}", e),
        })?;
        if form.id.is_none() {
            form.id = Some(form_id.to_string());
        }

        log_event_with_fields(Event::FormLoaded, &[("form", form_id)]);
        Ok(form)
    }
}

#[async_trait]
impl FormSource for FormLoader {
    async fn load_form(&self, form_id: &str) -> FormSourceResult<Form> {
        if let Some(form) = self.forms.read().await.get(form_id) {
            return Ok(form.clone());
        }

        let path = self.form_path(form_id)?;
        let form = match self.read_form_file(form_id, &path).await {
            Ok(form) => form,
            Err(e) => {
                let error = e.to_string();
                log_event_with_fields(Event::FormLoadFailed, &[("form", form_id), ("error", error.as_str())]);
                return Err(e);
            }
        };
        self.forms.write().await.insert(form_id.to_string(), form.clone());
        Ok(form)
    }
}
