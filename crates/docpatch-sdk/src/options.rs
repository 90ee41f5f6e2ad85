use std::path::Path;

use serde::{Deserialize, Serialize};

use docpatch_stream::{UpdateMode, DEFAULT_ATTEMPT_LIMIT, DEFAULT_CONCURRENCY};

use crate::error::{RunError, RunResult};

/// Settings for one patch run.
///
/// Every field has a default, so a TOML file only needs to name what it
/// changes:
///
/// ```toml
/// db = "memory://app"
/// log_db = "memory://audit"
/// update = "query"
/// parallel = 8
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunOptions {
    /// Connection target of the application database.
    pub db: String,
    /// Connection target of the audit database; no audit log when unset.
    pub log_db: Option<String>,
    /// Audit collection name; defaults to the run id.
    pub log_collection: Option<String>,
    pub update: UpdateMode,
    /// Documents processed concurrently by each stage.
    pub parallel: usize,
    /// Keep per-index paths in the accumulated diff instead of `[*]`.
    pub diff_object: bool,
    /// Optimistic attempts before the document strategy falls back to a
    /// whole-document match.
    pub attempt_limit: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            db: String::new(),
            log_db: None,
            log_collection: None,
            update: UpdateMode::default(),
            parallel: DEFAULT_CONCURRENCY,
            diff_object: false,
            attempt_limit: DEFAULT_ATTEMPT_LIMIT,
        }
    }
}

impl RunOptions {
    /// Defaults for every option except the data database.
    pub fn new(db: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            ..Self::default()
        }
    }

    /// Parses options from TOML text.
    pub fn from_toml_str(source: &str) -> RunResult<Self> {
        toml::from_str(source).map_err(|err| RunError::Config(err.to_string()))
    }

    /// Reads options from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> RunResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|err| RunError::Config(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Rejects option combinations a run cannot use.
    pub fn validate(&self) -> RunResult<()> {
        if self.db.trim().is_empty() {
            return Err(RunError::Config("db is required".into()));
        }
        if self.parallel == 0 {
            return Err(RunError::Config("parallel must be at least 1".into()));
        }
        if self.log_collection.is_some() && self.log_db.is_none() {
            return Err(RunError::Config("log_collection requires log_db".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_options() {
        let o = RunOptions::default();
        assert_eq!(o.update, UpdateMode::Document);
        assert_eq!(o.parallel, 1);
        assert!(!o.diff_object);
        assert_eq!(o.attempt_limit, 5);
        assert!(o.log_db.is_none());
        assert!(o.log_collection.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let o = RunOptions::from_toml_str(
            r#"
            db = "memory://app"
            update = "query"
            parallel = 8
            "#,
        )
        .unwrap();
        assert_eq!(o.db, "memory://app");
        assert_eq!(o.update, UpdateMode::Query);
        assert_eq!(o.parallel, 8);
        assert_eq!(o.attempt_limit, 5);
        o.validate().unwrap();
    }

    #[test]
    fn rejects_unknown_keys_and_modes() {
        let err = RunOptions::from_toml_str("db = \"app\"\nparalel = 2").unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
        let err = RunOptions::from_toml_str("db = \"app\"\nupdate = \"fast\"").unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }

    #[test]
    fn validation() {
        assert!(RunOptions::default().validate().is_err());
        let mut o = RunOptions::new("app");
        o.parallel = 0;
        assert!(o.validate().is_err());
        let mut o = RunOptions::new("app");
        o.log_collection = Some("audit".into());
        assert!(o.validate().is_err());
        o.log_db = Some("audit_db".into());
        o.validate().unwrap();
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "db = \"memory://app\"").unwrap();
        writeln!(file, "log_db = \"memory://audit\"").unwrap();
        writeln!(file, "diff_object = true").unwrap();
        let o = RunOptions::from_file(file.path()).unwrap();
        assert_eq!(o.log_db.as_deref(), Some("memory://audit"));
        assert!(o.diff_object);

        let err = RunOptions::from_file(file.path().with_extension("missing")).unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }
}
