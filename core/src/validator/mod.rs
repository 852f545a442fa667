//! Validator Adapter: syntactic + size checks on a change set.
//!
//! Deadline-aware and side-effect-free from the core's perspective; the
//! "compile"/"test" checks a real deployment plugs in are modeled as an
//! optional collaborator behind [`ExternalCheck`] so this crate ships a
//! working default without shelling out to anything.

use async_trait::async_trait;
use tracing::debug;

use taskstore::FileChange;

use crate::parser::MAX_FILE_CHANGE_BYTES;

/// Outcome of validating a change set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub ok: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
        }
    }

    pub fn failure(errors: Vec<String>) -> Self {
        Self { ok: false, errors }
    }
}

/// Pluggable syntactic/semantic check beyond the minimum viable set (e.g. a
/// real compiler invocation for a given language). Implementations run
/// in-process or shell out to a sandboxed subprocess; the trait itself is
/// oblivious to which.
#[async_trait]
pub trait ExternalCheck: Send + Sync {
    async fn check(&self, change: &FileChange) -> Result<(), String>;
}

/// Validates change sets against the minimum-viable rule set from the
/// component contract, plus any configured [`ExternalCheck`]s.
pub struct Validator {
    checks: Vec<Box<dyn ExternalCheck>>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn with_check(mut self, check: Box<dyn ExternalCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// Validate a batch of changes. Cancellation-aware: the caller's
    /// deadline/cancel token governs how long `validate` is allowed to run,
    /// but this in-process implementation has no suspension points of its
    /// own beyond the configured external checks.
    pub async fn validate(&self, changes: &[FileChange]) -> ValidationResult {
        let mut errors = Vec::new();

        for change in changes {
            if let Err(e) = validate_path(&change.path) {
                errors.push(format!("{}: {}", change.path, e));
                continue;
            }
            if change.content.len() > MAX_FILE_CHANGE_BYTES {
                errors.push(format!("{}: file-too-large", change.path));
                continue;
            }
            for check in &self.checks {
                if let Err(e) = check.check(change).await {
                    errors.push(format!("{}: {}", change.path, e));
                }
            }
        }

        let ok = errors.is_empty();
        debug!(ok, error_count = errors.len(), "validator: batch validated");
        ValidationResult { ok, errors }
    }
}

fn validate_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("empty path");
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err("path escapes project root");
    }
    if path.starts_with('/') {
        return Err("absolute paths are not allowed");
    }
    Ok(())
}
