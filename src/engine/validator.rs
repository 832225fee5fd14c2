//! Submission validation passes
//!
//! One pass, in order:
//! 1. Skip submissions without data
//! 2. Resolve visibility and strip excluded values
//! 3. Compile the schema and collect unique fields
//! 4. Look up unique values one at a time; the first conflict rejects
//! 5. Validate structure and run caller logic, collecting every error
//!
//! The caller's submission is never mutated.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::component::{path_index, Form};
use crate::observability::{log_event, log_event_with_fields, Event};
use crate::sandbox::Sandbox;
use crate::schema::{compile, SchemaValidator};
use crate::unique::{check_all, DocumentStore, LookupScope};
use crate::visibility::resolve;

use super::config::EngineConfig;
use super::errors::{FormSourceError, PatchError, ValidationError, ValidationResult};
use super::form_source::FormSource;
use super::patch::{apply_patch, PatchOperation};

/// A submission as received from a client or read back from the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Id of the form the submission belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Submission {
    /// A new submission for `form` holding `data`
    pub fn new(form: Option<&str>, data: Value) -> Self {
        Self {
            id: None,
            form: form.map(str::to_string),
            owner: None,
            data: Some(data),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
}

/// Public entry point: validates submissions against forms.
///
/// Stateless between passes; a single validator may serve concurrent
/// passes.
#[derive(Debug, Clone)]
pub struct SubmissionValidator {
    sandbox: Sandbox,
    store: Arc<dyn DocumentStore>,
    forms: Option<Arc<dyn FormSource>>,
}

impl SubmissionValidator {
    /// Creates a validator backed by the given store.
    pub fn new(config: &EngineConfig, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            sandbox: config.sandbox(),
            store,
            forms: None,
        }
    }

    /// Attaches the source used by [`SubmissionValidator::validate_form_id`].
    pub fn with_form_source(mut self, forms: Arc<dyn FormSource>) -> Self {
        self.forms = Some(forms);
        self
    }

    /// Validates a submission.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the submission has no data, otherwise the sanitized
    /// and coerced data document.
    ///
    /// # Errors
    ///
    /// - `Rejected` with every violation, or with the single uniqueness
    ///   conflict that stopped the pass
    /// - `Store` when a uniqueness lookup fails
    pub async fn validate(&self, form: &Form, submission: &Submission) -> ValidationResult<Option<Value>> {
        self.validate_with_cancel(form, submission, &CancellationToken::new())
            .await
    }

    /// Validates a submission, stopping early once `cancel` fires.
    ///
    /// Cancellation is observed before each uniqueness lookup and before
    /// structural validation.
    pub async fn validate_with_cancel(
        &self,
        form: &Form,
        submission: &Submission,
        cancel: &CancellationToken,
    ) -> ValidationResult<Option<Value>> {
        let Some(data) = submission.data.as_ref() else {
            return Ok(None);
        };

        let span = info_span!(
            "validation",
            pass = %Uuid::new_v4(),
            form = form.id.as_deref().unwrap_or(""),
        );
        self.run_pass(form, submission, data, cancel).instrument(span).await
    }

    async fn run_pass(
        &self,
        form: &Form,
        submission: &Submission,
        data: &Value,
        cancel: &CancellationToken,
    ) -> ValidationResult<Option<Value>> {
        log_event(Event::ValidationBegin);

        let visibility = resolve(&form.components, data, &self.sandbox);
        let sanitized = visibility.sanitize(data);
        let compiled = compile(&form.components, &visibility);
        let paths = path_index(&form.components);

        let scope = LookupScope {
            form_id: submission.form.as_deref().or(form.id.as_deref()),
            submission_id: submission.id.as_deref(),
        };
        if let Err(e) = check_all(&compiled.unique, &scope, &sanitized, &paths, self.store.as_ref(), cancel).await {
            return Err(self.finish_with(e.into()));
        }

        if cancel.is_cancelled() {
            return Err(self.finish_with(ValidationError::Cancelled));
        }

        let (document, report) = SchemaValidator::new(&self.sandbox).validate(&compiled.root, &sanitized);
        if !report.is_empty() {
            return Err(self.finish_with(ValidationError::Rejected(report)));
        }

        log_event(Event::ValidationComplete);
        Ok(Some(document))
    }

    fn finish_with(&self, error: ValidationError) -> ValidationError {
        match &error {
            ValidationError::Rejected(report) => {
                let count = report.len().to_string();
                log_event_with_fields(Event::ValidationRejected, &[("errors", count.as_str())]);
            }
            ValidationError::Cancelled => log_event(Event::ValidationCancelled),
            other => {
                let message = other.to_string();
                log_event_with_fields(Event::ValidationRejected, &[("error", message.as_str())]);
            }
        }
        error
    }

    /// Applies a JSON Patch to a copy of an existing submission and
    /// validates the result.
    ///
    /// Pointers address the whole submission, e.g. `/data/name`.
    ///
    /// # Errors
    ///
    /// `Patch` when the patch cannot be applied or leaves a malformed
    /// submission; otherwise as [`SubmissionValidator::validate`].
    pub async fn validate_patch(
        &self,
        form: &Form,
        existing: &Submission,
        patch: &[PatchOperation],
    ) -> ValidationResult<Option<Value>> {
        let document = serde_json::to_value(existing).map_err(|e| PatchError::InvalidDocument(e.to_string()))?;
        let patched = apply_patch(&document, patch)?;
        let submission: Submission =
            serde_json::from_value(patched).map_err(|e| PatchError::InvalidDocument(e.to_string()))?;

        self.validate(form, &submission).await
    }

    /// Loads a form from the attached form source, then validates.
    pub async fn validate_form_id(&self, form_id: &str, submission: &Submission) -> ValidationResult<Option<Value>> {
        let forms = self.forms.as_ref().ok_or(FormSourceError::NotConfigured)?;
        let form = forms.load_form(form_id).await?;
        self.validate(&form, submission).await
    }
}
