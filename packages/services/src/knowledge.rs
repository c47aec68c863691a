// ABOUTME: Knowledge source service
// ABOUTME: Field checks on write, loader checks on validate, delete blocked by agents and crews

use chrono::Utc;
use crewyard_core::{EntityKind, ValidationReport};
use crewyard_knowledge::{
    KnowledgeLoader, KnowledgeSource, KnowledgeSourceCreateInput, KnowledgeSourceUpdateInput,
    LoadedKnowledge, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
use std::sync::Arc;
use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::stores::Stores;
use crate::support::{ensure_unreferenced, ensure_valid, referrers, validate_blocking};
use crate::validation::{check_knowledge_source, validate_knowledge_source};

#[derive(Clone)]
pub struct KnowledgeService {
    stores: Stores,
    loader: Arc<dyn KnowledgeLoader>,
}

impl KnowledgeService {
    pub fn new(stores: Stores, loader: Arc<dyn KnowledgeLoader>) -> Self {
        Self { stores, loader }
    }

    pub async fn list_knowledge_sources(
        &self,
        skip: i64,
        limit: i64,
    ) -> ServiceResult<Vec<KnowledgeSource>> {
        Ok(self
            .stores
            .knowledge
            .list_knowledge_sources(skip, limit)
            .await?)
    }

    pub async fn get_knowledge_source(&self, source_id: &str) -> ServiceResult<KnowledgeSource> {
        self.stores
            .knowledge
            .get_knowledge_source(source_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(EntityKind::KnowledgeSource, source_id))
    }

    pub async fn create_knowledge_source(
        &self,
        input: KnowledgeSourceCreateInput,
    ) -> ServiceResult<KnowledgeSource> {
        let now = Utc::now();
        let draft = KnowledgeSource {
            id: String::new(),
            name: input.name.clone(),
            source_type: input.source_type,
            source_path: input.source_path.clone(),
            content: input.content.clone(),
            metadata: input.metadata.clone().unwrap_or_default(),
            chunk_size: input.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            chunk_overlap: input.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP),
            created_at: now,
            updated_at: now,
        };
        ensure_valid(
            EntityKind::KnowledgeSource,
            &draft.name,
            check_knowledge_source(&draft),
        )?;

        let source = self.stores.knowledge.create_knowledge_source(input).await?;
        info!(
            "Created knowledge source {} ({}, {})",
            source.id, source.name, source.source_type
        );
        Ok(source)
    }

    pub async fn update_knowledge_source(
        &self,
        source_id: &str,
        input: KnowledgeSourceUpdateInput,
    ) -> ServiceResult<KnowledgeSource> {
        let mut draft = self.get_knowledge_source(source_id).await?;
        if let Some(name) = &input.name {
            draft.name = name.clone();
        }
        if let Some(source_type) = input.source_type {
            draft.source_type = source_type;
        }
        if let Some(path) = &input.source_path {
            draft.source_path = path.clone();
        }
        if let Some(content) = &input.content {
            draft.content = content.clone();
        }
        if let Some(chunk_size) = input.chunk_size {
            draft.chunk_size = chunk_size;
        }
        if let Some(chunk_overlap) = input.chunk_overlap {
            draft.chunk_overlap = chunk_overlap;
        }
        ensure_valid(
            EntityKind::KnowledgeSource,
            source_id,
            check_knowledge_source(&draft),
        )?;

        let source = self
            .stores
            .knowledge
            .update_knowledge_source(source_id, input)
            .await?;
        info!("Updated knowledge source {}", source_id);
        Ok(source)
    }

    pub async fn delete_knowledge_source(&self, source_id: &str) -> ServiceResult<()> {
        self.get_knowledge_source(source_id).await?;

        let mut blocking = referrers(
            EntityKind::Agent,
            self.stores
                .agents
                .agents_using_knowledge_source(source_id)
                .await?,
        );
        blocking.extend(referrers(
            EntityKind::Crew,
            self.stores
                .crews
                .crews_using_knowledge_source(source_id)
                .await?,
        ));
        ensure_unreferenced(EntityKind::KnowledgeSource, source_id, blocking)?;

        self.stores
            .knowledge
            .delete_knowledge_source(source_id)
            .await?;
        info!("Deleted knowledge source {}", source_id);
        Ok(())
    }

    pub async fn validate_knowledge_source(
        &self,
        source_id: &str,
    ) -> ServiceResult<ValidationReport> {
        let source = self.get_knowledge_source(source_id).await?;
        let loader = self.loader.clone();
        validate_blocking(move || validate_knowledge_source(&source, loader.as_ref())).await
    }

    /// Load and chunk a source through the configured loader
    pub async fn load_knowledge_source(&self, source_id: &str) -> ServiceResult<LoadedKnowledge> {
        let source = self.get_knowledge_source(source_id).await?;
        let loader = self.loader.clone();
        let loaded = tokio::task::spawn_blocking(move || loader.load(&source))
            .await
            .map_err(|e| ServiceError::Runtime(format!("loader task failed: {}", e)))??;
        Ok(loaded)
    }
}
