// ABOUTME: Knowledge source type definitions
// ABOUTME: Source kinds, chunking bounds and create/update inputs

use chrono::{DateTime, Utc};
use crewyard_core::serde_helpers::double_option;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_CHUNK_SIZE: i64 = 4000;
pub const DEFAULT_CHUNK_OVERLAP: i64 = 200;
pub const MIN_CHUNK_SIZE: i64 = 50;
pub const MAX_CHUNK_SIZE: i64 = 20000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    InlineText,
    TextFile,
    Pdf,
    Csv,
    Excel,
    Json,
    DocUrl,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InlineText => "inline_text",
            Self::TextFile => "text_file",
            Self::Pdf => "pdf",
            Self::Csv => "csv",
            Self::Excel => "excel",
            Self::Json => "json",
            Self::DocUrl => "doc_url",
        }
    }

    /// Sources backed by a file under the knowledge directory
    pub fn is_file(&self) -> bool {
        matches!(
            self,
            Self::TextFile | Self::Pdf | Self::Csv | Self::Excel | Self::Json
        )
    }

    /// File sources whose contents are read as UTF-8 text
    pub fn is_text_file(&self) -> bool {
        matches!(self, Self::TextFile | Self::Csv | Self::Json)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSource {
    pub id: String,
    pub name: String,
    pub source_type: SourceType,
    pub source_path: Option<String>,
    pub content: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSourceCreateInput {
    pub name: String,
    pub source_type: SourceType,
    pub source_path: Option<String>,
    pub content: Option<String>,
    pub metadata: Option<BTreeMap<String, Value>>,
    pub chunk_size: Option<i64>,
    pub chunk_overlap: Option<i64>,
}

impl KnowledgeSourceCreateInput {
    pub fn new(name: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            name: name.into(),
            source_type,
            source_path: None,
            content: None,
            metadata: None,
            chunk_size: None,
            chunk_overlap: None,
        }
    }
}

/// Partial update. `source_path` and `content` distinguish absent from explicit null.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeSourceUpdateInput {
    pub name: Option<String>,
    pub source_type: Option<SourceType>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub source_path: Option<Option<String>>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub content: Option<Option<String>>,
    pub metadata: Option<BTreeMap<String, Value>>,
    pub chunk_size: Option<i64>,
    pub chunk_overlap: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_type_wire_names() {
        assert_eq!(
            serde_json::to_value(SourceType::DocUrl).unwrap(),
            json!("doc_url")
        );
        let parsed: SourceType = serde_json::from_value(json!("inline_text")).unwrap();
        assert_eq!(parsed, SourceType::InlineText);
        assert!(serde_json::from_value::<SourceType>(json!("docx")).is_err());
    }

    #[test]
    fn test_file_classification() {
        assert!(SourceType::Pdf.is_file());
        assert!(!SourceType::Pdf.is_text_file());
        assert!(SourceType::Csv.is_text_file());
        assert!(!SourceType::InlineText.is_file());
        assert!(!SourceType::DocUrl.is_file());
    }

    #[test]
    fn test_update_input_null_clears() {
        let input: KnowledgeSourceUpdateInput =
            serde_json::from_value(json!({"content": null})).unwrap();
        assert_eq!(input.content, Some(None));
        assert_eq!(input.source_path, None);
    }
}
