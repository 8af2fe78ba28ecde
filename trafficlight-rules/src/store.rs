use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::RuleError;
use crate::loader::{validate_router_name, RuleSource};
use crate::rule::RuleDefinition;

/// Versioned history entry for a stored definition.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHistoryEntry {
    pub version: u32,
    pub definition: RuleDefinition,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

impl RuleHistoryEntry {
    fn new(version: u32, definition: RuleDefinition, updated_by: Option<String>) -> Self {
        Self {
            version,
            definition,
            created_at: Utc::now(),
            updated_by,
        }
    }
}

/// In-memory rule store with version tracking.
#[derive(Default, Clone)]
pub struct RuleStore {
    inner: Arc<RwLock<HashMap<String, Vec<RuleHistoryEntry>>>>,
}

impl RuleStore {
    /// Creates a new empty rule store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored router names, sorted.
    pub fn list_names(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut names: Vec<String> = inner.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the full history for a definition.
    pub fn history(&self, name: &str) -> Vec<RuleHistoryEntry> {
        let inner = self.inner.read();
        inner.get(name).cloned().unwrap_or_default()
    }

    /// Returns the latest version of a definition, if available.
    pub fn latest(&self, name: &str) -> Option<RuleHistoryEntry> {
        let inner = self.inner.read();
        inner.get(name).and_then(|versions| versions.last().cloned())
    }

    /// Inserts or updates a definition under its own name, returning the new history entry.
    pub fn put(
        &self,
        definition: RuleDefinition,
        updated_by: Option<String>,
    ) -> Result<RuleHistoryEntry, RuleError> {
        let name = validate_router_name(&definition.name)?;
        let definition = RuleDefinition { name: name.clone(), ..definition };

        let mut inner = self.inner.write();
        let history = inner.entry(name).or_default();
        let version = history.last().map(|last| last.version + 1).unwrap_or(1);
        let entry = RuleHistoryEntry::new(version, definition, updated_by);
        history.push(entry.clone());
        Ok(entry)
    }

    /// Validates a raw document and stores it.
    pub fn put_value(
        &self,
        name: &str,
        document: &Value,
        updated_by: Option<String>,
    ) -> Result<RuleHistoryEntry, RuleError> {
        let name = validate_router_name(name)?;
        let definition = RuleDefinition::from_value(&name, document)
            .map_err(|report| RuleError::Invalid { name, report })?;
        self.put(definition, updated_by)
    }
}

#[async_trait]
impl RuleSource for RuleStore {
    async fn load(&self, name: &str) -> Result<RuleDefinition, RuleError> {
        let name = validate_router_name(name)?;
        self.latest(&name)
            .map(|entry| entry.definition)
            .ok_or(RuleError::NotFound(name))
    }

    async fn names(&self) -> Result<Vec<String>, RuleError> {
        Ok(self.list_names())
    }
}
