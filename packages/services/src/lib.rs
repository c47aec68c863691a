// ABOUTME: Business rules above the Crewyard repositories
// ABOUTME: Per-entity services, validation rules and the service error taxonomy

pub mod agents;
pub mod crews;
pub mod error;
pub mod knowledge;
pub mod stores;
pub mod tasks;
pub mod tools;
pub mod validation;

mod support;

use crewyard_knowledge::KnowledgeLoader;
use std::sync::Arc;

pub use agents::AgentService;
pub use crews::CrewService;
pub use error::{Referrer, ServiceError, ServiceResult};
pub use knowledge::KnowledgeService;
pub use stores::{ServiceSettings, Stores, ValidationRules};
pub use tasks::TaskService;
pub use tools::ToolService;

/// Every entity service wired over one set of stores
#[derive(Clone)]
pub struct Services {
    pub stores: Stores,
    pub tools: ToolService,
    pub knowledge: KnowledgeService,
    pub agents: AgentService,
    pub tasks: TaskService,
    pub crews: CrewService,
    pub loader: Arc<dyn KnowledgeLoader>,
}

impl Services {
    pub fn new(stores: Stores, settings: &ServiceSettings) -> Self {
        Self::with_loader(stores, settings, settings.loader())
    }

    /// Wire the services around a caller-supplied knowledge loader
    pub fn with_loader(
        stores: Stores,
        settings: &ServiceSettings,
        loader: Arc<dyn KnowledgeLoader>,
    ) -> Self {
        let rules = settings.rules();
        Self {
            tools: ToolService::new(stores.clone()),
            knowledge: KnowledgeService::new(stores.clone(), loader.clone()),
            agents: AgentService::new(stores.clone(), rules.clone(), loader.clone()),
            tasks: TaskService::new(stores.clone(), rules.clone(), loader.clone()),
            crews: CrewService::new(stores.clone(), rules, loader.clone()),
            stores,
            loader,
        }
    }
}
