// ABOUTME: Knowledge loading contract and the filesystem-backed loader
// ABOUTME: Resolves source files under a base directory and splits text into overlapping chunks

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::types::{KnowledgeSource, SourceType};

/// Runtime-ready knowledge produced from a stored source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedKnowledge {
    pub source_id: String,
    pub name: String,
    pub source_type: SourceType,
    /// Resolved file path or URL; `None` for inline text
    pub location: Option<String>,
    /// Text chunks. Empty for binary files and URLs, which the runtime reads itself.
    pub chunks: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot load {kind} knowledge from '{path}': {cause}")]
pub struct LoaderError {
    pub kind: SourceType,
    pub path: String,
    pub cause: String,
}

impl LoaderError {
    fn new(source: &KnowledgeSource, path: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            kind: source.source_type,
            path: path.into(),
            cause: cause.into(),
        }
    }
}

/// Turns a stored knowledge source into runtime knowledge.
///
/// Implementations read only the record and the local filesystem.
pub trait KnowledgeLoader: Send + Sync {
    fn load(&self, source: &KnowledgeSource) -> Result<LoadedKnowledge, LoaderError>;

    /// Cheap readiness check used by validation
    fn check(&self, source: &KnowledgeSource) -> Result<(), LoaderError> {
        self.load(source).map(|_| ())
    }
}

#[derive(Debug, Clone)]
pub struct FsKnowledgeLoader {
    base_dir: PathBuf,
}

impl FsKnowledgeLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve `source_path` under the base directory, rejecting escapes
    pub fn resolve(&self, source: &KnowledgeSource) -> Result<PathBuf, LoaderError> {
        let raw = match source.source_path.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => return Err(LoaderError::new(source, "", "source_path is required")),
        };

        let relative = Path::new(raw);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(LoaderError::new(
                        source,
                        raw,
                        "path traversal outside the knowledge directory",
                    ))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(LoaderError::new(
                        source,
                        raw,
                        "absolute paths are not allowed",
                    ))
                }
            }
        }

        Ok(self.base_dir.join(relative))
    }

    fn readable_file(&self, source: &KnowledgeSource) -> Result<PathBuf, LoaderError> {
        let path = self.resolve(source)?;
        let display = path.display().to_string();

        let meta = fs::metadata(&path).map_err(|e| LoaderError::new(source, &display, e.to_string()))?;
        if !meta.is_file() {
            return Err(LoaderError::new(source, display, "not a regular file"));
        }
        fs::File::open(&path).map_err(|e| LoaderError::new(source, &display, e.to_string()))?;

        Ok(path)
    }

    fn parse_url(source: &KnowledgeSource) -> Result<Url, LoaderError> {
        let raw = source
            .source_path
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LoaderError::new(source, "", "source_path is required"))?;

        let url = Url::parse(raw).map_err(|e| LoaderError::new(source, raw, e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(LoaderError::new(
                source,
                raw,
                format!("unsupported URL scheme '{}'", other),
            )),
        }
    }

    fn inline_content(source: &KnowledgeSource) -> Result<&str, LoaderError> {
        match source.content.as_deref() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(LoaderError::new(source, "", "inline content is empty")),
        }
    }

    fn chunk(source: &KnowledgeSource, text: &str, path: &str) -> Result<Vec<String>, LoaderError> {
        if source.chunk_overlap < 0 || source.chunk_overlap >= source.chunk_size {
            return Err(LoaderError::new(
                source,
                path,
                "chunk_overlap must be smaller than chunk_size",
            ));
        }
        Ok(chunk_text(
            text,
            source.chunk_size as usize,
            source.chunk_overlap as usize,
        ))
    }
}

impl KnowledgeLoader for FsKnowledgeLoader {
    fn load(&self, source: &KnowledgeSource) -> Result<LoadedKnowledge, LoaderError> {
        debug!(
            "Loading knowledge source {} ({})",
            source.id, source.source_type
        );

        let (location, chunks) = match source.source_type {
            SourceType::InlineText => {
                let text = Self::inline_content(source)?;
                (None, Self::chunk(source, text, "")?)
            }
            SourceType::TextFile | SourceType::Csv | SourceType::Json => {
                let path = self.readable_file(source)?;
                let display = path.display().to_string();
                let text = fs::read_to_string(&path)
                    .map_err(|e| LoaderError::new(source, &display, e.to_string()))?;

                if source.source_type == SourceType::Json {
                    serde_json::from_str::<Value>(&text)
                        .map_err(|e| LoaderError::new(source, &display, e.to_string()))?;
                }

                let chunks = Self::chunk(source, &text, &display)?;
                (Some(display), chunks)
            }
            SourceType::Pdf | SourceType::Excel => {
                let path = self.readable_file(source)?;
                (Some(path.display().to_string()), Vec::new())
            }
            SourceType::DocUrl => {
                let url = Self::parse_url(source)?;
                (Some(url.to_string()), Vec::new())
            }
        };

        Ok(LoadedKnowledge {
            source_id: source.id.clone(),
            name: source.name.clone(),
            source_type: source.source_type,
            location,
            chunks,
            metadata: source.metadata.clone(),
        })
    }

    fn check(&self, source: &KnowledgeSource) -> Result<(), LoaderError> {
        match source.source_type {
            SourceType::InlineText => Self::inline_content(source).map(|_| ()),
            SourceType::DocUrl => Self::parse_url(source).map(|_| ()),
            _ => self.readable_file(source).map(|_| ()),
        }
    }
}

/// Split `text` into windows of `size` characters, each starting
/// `size - overlap` characters after the previous one.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    if size == 0 {
        return vec![text.to_string()];
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn source(source_type: SourceType, path: Option<&str>) -> KnowledgeSource {
        KnowledgeSource {
            id: "KS_test".to_string(),
            name: "notes".to_string(),
            source_type,
            source_path: path.map(str::to_string),
            content: None,
            metadata: BTreeMap::new(),
            chunk_size: 50,
            chunk_overlap: 10,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_chunk_text_overlaps() {
        let chunks = chunk_text("abcdefghij", 4, 1);
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_chunk_text_short_input() {
        assert_eq!(chunk_text("abc", 10, 2), vec!["abc"]);
        assert!(chunk_text("", 10, 2).is_empty());
    }

    #[test]
    fn test_chunk_text_counts_chars_not_bytes() {
        let chunks = chunk_text("ééééé", 2, 0);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let loader = FsKnowledgeLoader::new("/srv/knowledge");

        let err = loader
            .resolve(&source(SourceType::TextFile, Some("../secrets.txt")))
            .unwrap_err();
        assert!(err.cause.contains("traversal"));

        let err = loader
            .resolve(&source(SourceType::TextFile, Some("/etc/passwd")))
            .unwrap_err();
        assert!(err.cause.contains("absolute"));

        let path = loader
            .resolve(&source(SourceType::TextFile, Some("docs/./guide.md")))
            .unwrap();
        assert!(path.starts_with("/srv/knowledge"));
    }

    #[test]
    fn test_missing_path_is_reported() {
        let loader = FsKnowledgeLoader::new("/srv/knowledge");
        let err = loader.check(&source(SourceType::Pdf, None)).unwrap_err();
        assert_eq!(err.kind, SourceType::Pdf);
        assert_eq!(err.cause, "source_path is required");
    }

    #[test]
    fn test_doc_url_scheme() {
        let loader = FsKnowledgeLoader::new("/srv/knowledge");
        assert!(loader
            .check(&source(SourceType::DocUrl, Some("https://docs.rs/sqlx")))
            .is_ok());
        assert!(loader
            .check(&source(SourceType::DocUrl, Some("ftp://example.com/file")))
            .is_err());
        assert!(loader
            .check(&source(SourceType::DocUrl, Some("not a url")))
            .is_err());
    }
}
