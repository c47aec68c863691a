// ABOUTME: Shared fixtures for engine integration tests
// ABOUTME: In-memory stores, wired services and small entity builders

#![allow(dead_code)]

use crewyard_agents::AgentCreateInput;
use crewyard_crews::CrewCreateInput;
use crewyard_services::{ServiceSettings, Services, Stores};
use crewyard_storage::connect_in_memory;
use crewyard_tasks::{TaskCreateInput, TaskUpdateInput};
use tempfile::TempDir;

pub struct TestContext {
    pub services: Services,
    pub knowledge_dir: TempDir,
}

pub async fn setup() -> TestContext {
    let pool = connect_in_memory().await.unwrap();
    let knowledge_dir = TempDir::new().unwrap();
    let settings = ServiceSettings {
        knowledge_dir: knowledge_dir.path().to_path_buf(),
        llm_allowlist: None,
    };
    TestContext {
        services: Services::new(Stores::new(pool), &settings),
        knowledge_dir,
    }
}

impl TestContext {
    pub async fn agent(&self, role: &str) -> String {
        self.agent_with(AgentCreateInput {
            role: role.to_string(),
            ..Default::default()
        })
        .await
    }

    pub async fn agent_with(&self, input: AgentCreateInput) -> String {
        let input = AgentCreateInput {
            goal: "G".to_string(),
            backstory: "B".to_string(),
            llm_identifier: "openai/gpt-test".to_string(),
            ..input
        };
        self.services.agents.create_agent(input).await.unwrap().agent.id
    }

    pub async fn task(&self, agent_id: &str, description: &str) -> String {
        self.task_with(TaskCreateInput {
            description: description.to_string(),
            agent_id: agent_id.to_string(),
            ..Default::default()
        })
        .await
    }

    pub async fn task_with(&self, input: TaskCreateInput) -> String {
        let input = TaskCreateInput {
            expected_output: "hi".to_string(),
            ..input
        };
        self.services.tasks.create_task(input).await.unwrap().task.id
    }

    pub async fn set_sync_context(&self, task_id: &str, context: &[&str]) {
        self.services
            .tasks
            .update_task(
                task_id,
                TaskUpdateInput {
                    sync_context_task_ids: Some(context.iter().map(|s| s.to_string()).collect()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    pub async fn crew(&self, name: &str, agent_ids: &[&str], task_ids: &[&str]) -> String {
        self.crew_with(CrewCreateInput {
            name: name.to_string(),
            agent_ids: agent_ids.iter().map(|s| s.to_string()).collect(),
            task_ids: task_ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
        .await
    }

    pub async fn crew_with(&self, input: CrewCreateInput) -> String {
        self.services
            .crews
            .create_crew(input)
            .await
            .unwrap()
            .id()
            .to_string()
    }
}
