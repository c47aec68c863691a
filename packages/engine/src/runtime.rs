// ABOUTME: Contract between Crewyard and the agent runtime that actually talks to LLMs
// ABOUTME: The planner builds runtime objects through this trait and the driver kicks them off

use async_trait::async_trait;
use crewyard_crews::Process;
use crewyard_knowledge::LoadedKnowledge;
use crewyard_tools::Tool;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds runtime objects and executes compiled crews.
///
/// Construction is synchronous because compilation runs on the blocking
/// pool. Only `kickoff` awaits, since it waits on the LLM provider.
#[async_trait]
pub trait RuntimeFactory: Send + Sync + 'static {
    type Llm: Send + Sync + 'static;
    type Knowledge: Send + Sync + 'static;
    type Agent: Send + Sync + 'static;
    type Task: Send + Sync + 'static;
    type Crew: Send + Sync + 'static;

    /// `temperature` is `None` for manager and planning models
    fn make_llm(&self, identifier: &str, temperature: Option<f64>) -> anyhow::Result<Self::Llm>;

    fn make_knowledge(&self, knowledge: LoadedKnowledge) -> anyhow::Result<Self::Knowledge>;

    fn make_agent(&self, spec: AgentSpec<Self>) -> anyhow::Result<Self::Agent>;

    fn make_task(&self, spec: TaskSpec<Self>) -> anyhow::Result<Self::Task>;

    fn make_crew(&self, spec: CrewSpec<Self>) -> anyhow::Result<Self::Crew>;

    /// Run the crew to completion and return its final output
    async fn kickoff(
        &self,
        crew: &Self::Crew,
        inputs: &BTreeMap<String, Value>,
    ) -> anyhow::Result<String>;
}

pub struct AgentSpec<R: RuntimeFactory + ?Sized> {
    pub id: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub llm: R::Llm,
    pub max_iter: i32,
    pub allow_delegation: bool,
    pub verbose: bool,
    pub cache: bool,
    pub tools: Vec<Tool>,
    pub knowledge: Vec<R::Knowledge>,
}

pub struct TaskSpec<R: RuntimeFactory + ?Sized> {
    pub id: String,
    pub description: String,
    pub expected_output: String,
    pub async_execution: bool,
    pub agent: Arc<R::Agent>,
    /// `None` means the runtime gets no context argument at all, which is
    /// different from an empty list.
    pub context: Option<Vec<Arc<R::Task>>>,
}

/// Who orchestrates a hierarchical crew
pub enum ManagerSpec<R: RuntimeFactory + ?Sized> {
    Llm(R::Llm),
    Agent(Arc<R::Agent>),
}

pub struct CrewSpec<R: RuntimeFactory + ?Sized> {
    pub id: String,
    pub name: String,
    pub agents: Vec<Arc<R::Agent>>,
    pub tasks: Vec<Arc<R::Task>>,
    pub process: Process,
    pub verbose: bool,
    pub cache: bool,
    pub max_rpm: Option<i32>,
    pub memory: bool,
    pub planning: bool,
    /// Only meaningful when `planning` is on. `None` selects the runtime default.
    pub planning_llm: Option<R::Llm>,
    pub manager: Option<ManagerSpec<R>>,
    pub knowledge: Vec<R::Knowledge>,
}
