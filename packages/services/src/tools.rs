// ABOUTME: Tool service with field checks and delete protection
// ABOUTME: A tool cannot be removed while any agent still carries it

use chrono::Utc;
use crewyard_core::{EntityKind, ValidationReport};
use crewyard_tools::{Tool, ToolCreateInput, ToolUpdateInput};
use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::stores::Stores;
use crate::support::{ensure_unreferenced, ensure_valid, referrers};
use crate::validation::{check_tool, validate_tool};

#[derive(Clone)]
pub struct ToolService {
    stores: Stores,
}

impl ToolService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn list_tools(&self, skip: i64, limit: i64) -> ServiceResult<Vec<Tool>> {
        Ok(self.stores.tools.list_tools(skip, limit).await?)
    }

    pub async fn get_tool(&self, tool_id: &str) -> ServiceResult<Tool> {
        self.stores
            .tools
            .get_tool(tool_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Tool, tool_id))
    }

    pub async fn create_tool(&self, input: ToolCreateInput) -> ServiceResult<Tool> {
        let now = Utc::now();
        let draft = Tool {
            id: String::new(),
            name: input.name.clone(),
            description: input.description.clone().unwrap_or_default(),
            parameters: input.parameters.clone().unwrap_or_default(),
            parameters_metadata: input.parameters_metadata.clone().unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        ensure_valid(EntityKind::Tool, &draft.name, check_tool(&draft))?;

        let tool = self.stores.tools.create_tool(input).await?;
        info!("Created tool {} ({})", tool.id, tool.name);
        Ok(tool)
    }

    pub async fn update_tool(&self, tool_id: &str, input: ToolUpdateInput) -> ServiceResult<Tool> {
        let mut draft = self.get_tool(tool_id).await?;
        if let Some(name) = &input.name {
            draft.name = name.clone();
        }
        ensure_valid(EntityKind::Tool, tool_id, check_tool(&draft))?;

        let tool = self.stores.tools.update_tool(tool_id, input).await?;
        info!("Updated tool {}", tool_id);
        Ok(tool)
    }

    pub async fn delete_tool(&self, tool_id: &str) -> ServiceResult<()> {
        self.get_tool(tool_id).await?;

        let agents = self.stores.agents.agents_using_tool(tool_id).await?;
        ensure_unreferenced(
            EntityKind::Tool,
            tool_id,
            referrers(EntityKind::Agent, agents),
        )?;

        self.stores.tools.delete_tool(tool_id).await?;
        info!("Deleted tool {}", tool_id);
        Ok(())
    }

    pub async fn validate_tool(&self, tool_id: &str) -> ServiceResult<ValidationReport> {
        let tool = self.get_tool(tool_id).await?;
        Ok(validate_tool(&tool))
    }
}
