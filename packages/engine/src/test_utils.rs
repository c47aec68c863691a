// ABOUTME: Scripted runtime used by engine and facade tests
// ABOUTME: Records what the planner built and can hold kickoff open to exercise cancellation

use anyhow::anyhow;
use async_trait::async_trait;
use crewyard_crews::Process;
use crewyard_knowledge::LoadedKnowledge;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::runtime::{AgentSpec, CrewSpec, ManagerSpec, RuntimeFactory, TaskSpec};

#[derive(Debug, Clone, PartialEq)]
pub struct FakeLlm {
    pub identifier: String,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeKnowledge {
    pub source_id: String,
    pub chunks: usize,
}

#[derive(Debug)]
pub struct FakeAgent {
    pub id: String,
    pub role: String,
    pub llm: FakeLlm,
    pub tool_ids: Vec<String>,
    pub knowledge: Vec<FakeKnowledge>,
}

#[derive(Debug)]
pub struct FakeTask {
    pub id: String,
    pub description: String,
    pub agent_id: String,
    /// Ids of the context tasks handed over, `None` when no context argument was passed
    pub context: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FakeManager {
    Llm(String),
    Agent(String),
}

#[derive(Debug)]
pub struct FakeCrew {
    pub id: String,
    pub name: String,
    pub process: Process,
    pub agent_ids: Vec<String>,
    pub task_ids: Vec<String>,
    pub manager: Option<FakeManager>,
    pub planning_llm: Option<String>,
    pub max_rpm: Option<i32>,
    pub knowledge: Vec<FakeKnowledge>,
}

#[derive(Debug, Clone)]
enum Script {
    Succeed,
    Fail(String),
    Panic(String),
}

/// A runtime that never calls an LLM
#[derive(Debug)]
pub struct FakeRuntime {
    script: Script,
    gate: Option<Arc<Notify>>,
    started: Arc<Notify>,
    kickoffs: AtomicUsize,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            script: Script::Succeed,
            gate: None,
            started: Arc::new(Notify::new()),
            kickoffs: AtomicUsize::new(0),
        }
    }

    /// Kickoff returns this error
    pub fn failing(message: &str) -> Self {
        Self {
            script: Script::Fail(message.to_string()),
            ..Self::new()
        }
    }

    /// Kickoff panics with this message
    pub fn panicking(message: &str) -> Self {
        Self {
            script: Script::Panic(message.to_string()),
            ..Self::new()
        }
    }

    /// Kickoff waits on the returned `Notify` before finishing
    pub fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let runtime = Self {
            gate: Some(gate.clone()),
            ..Self::new()
        };
        (runtime, gate)
    }

    /// Notified each time a kickoff begins
    pub fn started(&self) -> Arc<Notify> {
        self.started.clone()
    }

    pub fn kickoff_count(&self) -> usize {
        self.kickoffs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuntimeFactory for FakeRuntime {
    type Llm = FakeLlm;
    type Knowledge = FakeKnowledge;
    type Agent = FakeAgent;
    type Task = FakeTask;
    type Crew = FakeCrew;

    fn make_llm(&self, identifier: &str, temperature: Option<f64>) -> anyhow::Result<FakeLlm> {
        if identifier.trim().is_empty() {
            return Err(anyhow!("empty llm identifier"));
        }
        Ok(FakeLlm {
            identifier: identifier.to_string(),
            temperature,
        })
    }

    fn make_knowledge(&self, knowledge: LoadedKnowledge) -> anyhow::Result<FakeKnowledge> {
        Ok(FakeKnowledge {
            source_id: knowledge.source_id,
            chunks: knowledge.chunks.len(),
        })
    }

    fn make_agent(&self, spec: AgentSpec<Self>) -> anyhow::Result<FakeAgent> {
        Ok(FakeAgent {
            id: spec.id,
            role: spec.role,
            llm: spec.llm,
            tool_ids: spec.tools.into_iter().map(|t| t.id).collect(),
            knowledge: spec.knowledge,
        })
    }

    fn make_task(&self, spec: TaskSpec<Self>) -> anyhow::Result<FakeTask> {
        Ok(FakeTask {
            id: spec.id,
            description: spec.description,
            agent_id: spec.agent.id.clone(),
            context: spec
                .context
                .map(|tasks| tasks.iter().map(|t| t.id.clone()).collect()),
        })
    }

    fn make_crew(&self, spec: CrewSpec<Self>) -> anyhow::Result<FakeCrew> {
        Ok(FakeCrew {
            id: spec.id,
            name: spec.name,
            process: spec.process,
            agent_ids: spec.agents.iter().map(|a| a.id.clone()).collect(),
            task_ids: spec.tasks.iter().map(|t| t.id.clone()).collect(),
            manager: spec.manager.map(|manager| match manager {
                ManagerSpec::Llm(llm) => FakeManager::Llm(llm.identifier),
                ManagerSpec::Agent(agent) => FakeManager::Agent(agent.id.clone()),
            }),
            planning_llm: spec.planning_llm.map(|llm| llm.identifier),
            max_rpm: spec.max_rpm,
            knowledge: spec.knowledge,
        })
    }

    async fn kickoff(
        &self,
        crew: &FakeCrew,
        inputs: &BTreeMap<String, Value>,
    ) -> anyhow::Result<String> {
        self.kickoffs.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.script {
            Script::Succeed => Ok(format!(
                "{} finished {} tasks with {} inputs",
                crew.name,
                crew.task_ids.len(),
                inputs.len()
            )),
            Script::Fail(message) => Err(anyhow!("{}", message).context("kickoff failed")),
            Script::Panic(message) => panic!("{}", message),
        }
    }
}
