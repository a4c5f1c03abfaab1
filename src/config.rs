/// Grid configuration
///
/// Field names and defaults the query layer depends on. Everything here has a
/// sensible default so `GridConfig::default()` works against a service that
/// keys documents by `name` and stamps them with `modified`.

use crate::error::{GridError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Key field; always requested, and the field actually counted for `count`
    pub primary_key: String,
    /// Last-modified timestamp field; always requested
    pub modified_field: String,
    /// Ordering used when the sort model is empty
    pub default_order_by: String,
    /// Synthetic column the widget adds for grouped rows
    pub auto_group_column: String,
    /// Checkbox pseudo-column
    pub selection_column: String,
    /// Filter fields kept on save even when no column carries them
    pub always_valid_filter_fields: Vec<String>,
    /// Page size used when a request carries no end row
    pub page_size: usize,
    /// Drop responses that arrive after a newer request was issued
    pub discard_stale_responses: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            primary_key: "name".to_string(),
            modified_field: "modified".to_string(),
            default_order_by: "modified desc".to_string(),
            auto_group_column: "ag-Grid-AutoColumn".to_string(),
            selection_column: "ag-Grid-SelectionColumn".to_string(),
            always_valid_filter_fields: vec![
                "modified".to_string(),
                "_assign".to_string(),
                "workflow_state".to_string(),
                "title".to_string(),
            ],
            page_size: 100,
            discard_stale_responses: true,
        }
    }
}

impl GridConfig {
    /// Parse a JSON config; missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: GridConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.primary_key.trim().is_empty() {
            return Err(GridError::Config("primary_key must not be empty".to_string()));
        }
        if self.default_order_by.trim().is_empty() {
            return Err(GridError::Config("default_order_by must not be empty".to_string()));
        }
        if self.page_size == 0 {
            return Err(GridError::Config("page_size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn is_always_valid_filter_field(&self, field: &str) -> bool {
        self.always_valid_filter_fields.iter().any(|f| f == field)
    }
}
