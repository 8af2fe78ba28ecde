use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::RuleError;
use crate::rule::RuleDefinition;

const MAX_ROUTER_NAME_LEN: usize = 64;
const EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// Where rule definitions come from.
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Loads the definition registered under `name`.
    async fn load(&self, name: &str) -> Result<RuleDefinition, RuleError>;

    /// Names of all known definitions.
    async fn names(&self) -> Result<Vec<String>, RuleError>;
}

/// Lowercases a router name and checks it against the naming policy:
/// non-empty, at most 64 characters, only `a-z`, `-` and `_`.
pub fn validate_router_name(name: &str) -> Result<String, RuleError> {
    let normalized = name.trim().to_lowercase();
    let valid = !normalized.is_empty()
        && normalized.len() <= MAX_ROUTER_NAME_LEN
        && normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c == '-' || c == '_');

    if valid {
        Ok(normalized)
    } else {
        Err(RuleError::InvalidName(name.to_string()))
    }
}

/// Reads `<dir>/<name>.yml` (or `.yaml`) on every load so edits apply live.
#[derive(Debug, Clone)]
pub struct FileSystemRuleSource {
    dir: PathBuf,
}

impl FileSystemRuleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_definition(&self, name: &str) -> Result<(PathBuf, String), RuleError> {
        for ext in EXTENSIONS {
            let path = self.dir.join(format!("{name}.{ext}"));
            match tokio::fs::read_to_string(&path).await {
                Ok(raw) => return Ok((path, raw)),
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(RuleError::from_io(path, err)),
            }
        }
        Err(RuleError::NotFound(name.to_string()))
    }
}

#[async_trait]
impl RuleSource for FileSystemRuleSource {
    async fn load(&self, name: &str) -> Result<RuleDefinition, RuleError> {
        let name = validate_router_name(name)?;
        let (path, raw) = self.read_definition(&name).await?;
        debug!(router = %name, path = %path.display(), "loaded rule definition");
        parse_definition(&name, &raw, &path)
    }

    async fn names(&self) -> Result<Vec<String>, RuleError> {
        if !self.dir.exists() {
            return Err(RuleError::MissingPath(self.dir.display().to_string()));
        }

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|err| RuleError::from_io(&self.dir, err))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| RuleError::from_io(&self.dir, err))?
        {
            let path = entry.path();
            let is_definition = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| EXTENSIONS.contains(&ext))
                .unwrap_or(false);
            if !is_definition {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                if validate_router_name(stem).is_ok() {
                    names.push(stem.to_lowercase());
                }
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Parses YAML text and validates it into a [`RuleDefinition`].
pub(crate) fn parse_definition(name: &str, raw: &str, path: &Path) -> Result<RuleDefinition, RuleError> {
    let document: Value = serde_yaml::from_str(raw)
        .map_err(|err| RuleError::parse_error(path.to_path_buf(), err.to_string()))?;

    RuleDefinition::from_value(name, &document).map_err(|report| RuleError::Invalid {
        name: name.to_string(),
        report,
    })
}
