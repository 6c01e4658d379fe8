//! Data models for the usage log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UsageError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryUsage {
    pub id: u64,
    pub library_name: String,
    pub version: String,
    pub project_name: String,
    pub method_name: String,
    pub usage_count: u64,
    pub last_used: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// Body of a create or update request
///
/// Every field is optional on the wire so a missing one is reported as a
/// validation error rather than a body rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageInput {
    pub library_name: Option<String>,
    pub version: Option<String>,
    pub project_name: Option<String>,
    pub method_name: Option<String>,
    pub usage_count: Option<u64>,
    pub last_used: Option<DateTime<Utc>>,
    pub metadata: Option<String>,
}

/// Validated fields of a usage record
pub(crate) struct UsageFields {
    pub library_name: String,
    pub version: String,
    pub project_name: String,
    pub method_name: String,
    pub usage_count: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub metadata: Option<String>,
}

fn required(value: &Option<String>, field: &str) -> Result<String, UsageError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(UsageError::Invalid(format!("{} is required", field))),
    }
}

impl UsageInput {
    pub(crate) fn validate(&self) -> Result<UsageFields, UsageError> {
        Ok(UsageFields {
            library_name: required(&self.library_name, "libraryName")?,
            version: required(&self.version, "version")?,
            project_name: required(&self.project_name, "projectName")?,
            method_name: required(&self.method_name, "methodName")?,
            usage_count: self
                .usage_count
                .ok_or_else(|| UsageError::Invalid("usageCount is required".to_string()))?,
            last_used: self.last_used,
            metadata: self.metadata.clone(),
        })
    }
}

impl LibraryUsage {
    pub(crate) fn from_fields(id: u64, fields: UsageFields, now: DateTime<Utc>) -> Self {
        Self {
            id,
            library_name: fields.library_name,
            version: fields.version,
            project_name: fields.project_name,
            method_name: fields.method_name,
            usage_count: fields.usage_count,
            last_used: fields.last_used.unwrap_or(now),
            metadata: fields.metadata,
        }
    }

    /// Replace every field but the id; an absent `lastUsed` keeps the old value
    pub(crate) fn apply(&mut self, fields: UsageFields) {
        self.library_name = fields.library_name;
        self.version = fields.version;
        self.project_name = fields.project_name;
        self.method_name = fields.method_name;
        self.usage_count = fields.usage_count;
        if let Some(last_used) = fields.last_used {
            self.last_used = last_used;
        }
        self.metadata = fields.metadata;
    }
}
