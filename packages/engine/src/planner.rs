// ABOUTME: Compiles a stored crew into runtime objects ready for kickoff
// ABOUTME: Resolves task context recursively, breaking cycles and skipping orphans with warnings

use crewyard_agents::AgentWithRelations;
use crewyard_crews::{CrewWithRelations, Process};
use crewyard_knowledge::{KnowledgeLoader, KnowledgeSource};
use crewyard_services::{ServiceError, ServiceResult};
use crewyard_tasks::TaskWithRelations;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::runtime::{AgentSpec, CrewSpec, ManagerSpec, RuntimeFactory, TaskSpec};

/// A compiled crew
pub struct Plan<R: RuntimeFactory> {
    pub crew_id: String,
    pub crew: R::Crew,
    /// Task ids in the crew's declared order
    pub task_ids: Vec<String>,
    /// Runtime tasks in the same order as `task_ids`
    pub tasks: Vec<Arc<R::Task>>,
    pub warnings: Vec<String>,
}

impl<R: RuntimeFactory> Plan<R> {
    pub fn task(&self, task_id: &str) -> Option<&Arc<R::Task>> {
        self.task_ids
            .iter()
            .position(|id| id == task_id)
            .and_then(|index| self.tasks.get(index))
    }
}

/// Compile on the blocking pool; knowledge loading reads files
pub async fn compile<R: RuntimeFactory>(
    factory: Arc<R>,
    loader: Arc<dyn KnowledgeLoader>,
    crew: CrewWithRelations,
) -> ServiceResult<Plan<R>> {
    tokio::task::spawn_blocking(move || compile_blocking(factory.as_ref(), loader.as_ref(), &crew))
        .await
        .map_err(|e| ServiceError::Runtime(format!("plan compilation task failed: {}", e)))?
}

pub fn compile_blocking<R: RuntimeFactory>(
    factory: &R,
    loader: &dyn KnowledgeLoader,
    crew: &CrewWithRelations,
) -> ServiceResult<Plan<R>> {
    let mut planner = Planner {
        factory,
        loader,
        crew,
        agents: HashMap::new(),
        tasks: HashMap::new(),
        warnings: Vec::new(),
    };

    let mut agents = Vec::with_capacity(crew.agents.len());
    for agent in &crew.agents {
        agents.push(planner.agent(agent)?);
    }

    let mut task_ids = Vec::with_capacity(crew.tasks.len());
    let mut tasks = Vec::with_capacity(crew.tasks.len());
    for task in &crew.tasks {
        if task_ids.iter().any(|id| id == task.id()) {
            continue;
        }
        if let Some(built) = planner.materialize(task)? {
            task_ids.push(task.id().to_string());
            tasks.push(built);
        }
    }

    let manager = match crew.crew.process {
        Process::Hierarchical => planner.manager()?,
        Process::Sequential => None,
    };
    let planning_llm = match (&crew.crew.planning_llm, crew.crew.planning) {
        (Some(identifier), true) => Some(runtime(factory.make_llm(identifier, None))?),
        _ => None,
    };
    let knowledge = planner.knowledge(&crew.knowledge_sources)?;

    let spec = CrewSpec {
        id: crew.id().to_string(),
        name: crew.crew.name.clone(),
        agents,
        tasks: tasks.clone(),
        process: crew.crew.process,
        verbose: crew.crew.verbose,
        cache: crew.crew.cache,
        max_rpm: crew.crew.max_rpm,
        memory: crew.crew.memory,
        planning: crew.crew.planning,
        planning_llm,
        manager,
        knowledge,
    };
    let runtime_crew = runtime(factory.make_crew(spec))?;

    for warning in &planner.warnings {
        warn!("crew {}: {}", crew.id(), warning);
    }
    debug!(
        "Compiled crew {} with {} tasks and {} warnings",
        crew.id(),
        tasks.len(),
        planner.warnings.len()
    );

    Ok(Plan {
        crew_id: crew.id().to_string(),
        crew: runtime_crew,
        task_ids,
        tasks,
        warnings: planner.warnings,
    })
}

enum Slot<T> {
    InProgress,
    Built(Arc<T>),
}

struct Planner<'a, R: RuntimeFactory> {
    factory: &'a R,
    loader: &'a dyn KnowledgeLoader,
    crew: &'a CrewWithRelations,
    agents: HashMap<String, Arc<R::Agent>>,
    tasks: HashMap<String, Slot<R::Task>>,
    warnings: Vec<String>,
}

impl<R: RuntimeFactory> Planner<'_, R> {
    fn agent(&mut self, agent: &AgentWithRelations) -> ServiceResult<Arc<R::Agent>> {
        if let Some(built) = self.agents.get(agent.id()) {
            return Ok(built.clone());
        }

        let llm = runtime(
            self.factory
                .make_llm(&agent.agent.llm_identifier, Some(agent.agent.temperature)),
        )?;
        let knowledge = self.knowledge(&agent.knowledge_sources)?;
        let spec = AgentSpec {
            id: agent.id().to_string(),
            role: agent.agent.role.clone(),
            goal: agent.agent.goal.clone(),
            backstory: agent.agent.backstory.clone(),
            llm,
            max_iter: agent.agent.max_iter,
            allow_delegation: agent.agent.allow_delegation,
            verbose: agent.agent.verbose,
            cache: agent.agent.cache,
            tools: agent.tools.clone(),
            knowledge,
        };
        let built = Arc::new(runtime(self.factory.make_agent(spec))?);
        self.agents.insert(agent.id().to_string(), built.clone());
        Ok(built)
    }

    fn knowledge(&mut self, sources: &[KnowledgeSource]) -> ServiceResult<Vec<R::Knowledge>> {
        let mut built = Vec::with_capacity(sources.len());
        for source in sources {
            let loaded = self.loader.load(source)?;
            built.push(runtime(self.factory.make_knowledge(loaded))?);
        }
        Ok(built)
    }

    fn manager(&mut self) -> ServiceResult<Option<ManagerSpec<R>>> {
        let crew = self.crew;
        if let Some(identifier) = &crew.crew.manager_llm {
            let llm = runtime(self.factory.make_llm(identifier, None))?;
            return Ok(Some(ManagerSpec::Llm(llm)));
        }
        match &crew.manager_agent {
            Some(manager) => Ok(Some(ManagerSpec::Agent(self.agent(manager)?))),
            None => {
                self.warnings
                    .push("hierarchical crew has no manager; the runtime default applies".into());
                Ok(None)
            }
        }
    }

    /// Build `task` and, first, every context task it depends on.
    /// Returns `None` only when the task is already being built further up the stack.
    fn materialize(&mut self, task: &TaskWithRelations) -> ServiceResult<Option<Arc<R::Task>>> {
        match self.tasks.get(task.id()) {
            Some(Slot::Built(built)) => return Ok(Some(built.clone())),
            Some(Slot::InProgress) => return Ok(None),
            None => {}
        }
        self.tasks.insert(task.id().to_string(), Slot::InProgress);

        let crew = self.crew;
        let context_ids = task.context_task_ids();
        let mut context = Vec::with_capacity(context_ids.len());
        for context_id in &context_ids {
            match self.tasks.get(*context_id) {
                Some(Slot::Built(built)) => {
                    context.push(built.clone());
                    continue;
                }
                Some(Slot::InProgress) => {
                    self.warnings.push(format!(
                        "context cycle: task {} uses task {} which is still being built; link dropped",
                        task.id(),
                        context_id
                    ));
                    continue;
                }
                None => {}
            }

            let Some(context_task) = crew.task(context_id) else {
                self.warnings.push(format!(
                    "task {} uses context task {} which is not in the crew; link dropped",
                    task.id(),
                    context_id
                ));
                continue;
            };
            if let Some(built) = self.materialize(context_task)? {
                context.push(built);
            }
        }

        if !crew.has_agent(&task.task.agent_id) {
            self.warnings.push(format!(
                "task {} is owned by agent {} which is not in the crew",
                task.id(),
                task.task.agent_id
            ));
        }
        let agent = self.agent(&task.agent)?;

        let context = if task.task.async_execution || !context_ids.is_empty() {
            Some(context)
        } else {
            None
        };
        let spec = TaskSpec {
            id: task.id().to_string(),
            description: task.task.description.clone(),
            expected_output: task.task.expected_output.clone(),
            async_execution: task.task.async_execution,
            agent,
            context,
        };
        let built = Arc::new(runtime(self.factory.make_task(spec))?);
        self.tasks
            .insert(task.id().to_string(), Slot::Built(built.clone()));
        Ok(Some(built))
    }
}

fn runtime<T>(result: anyhow::Result<T>) -> ServiceResult<T> {
    result.map_err(|e| ServiceError::Runtime(format!("{:#}", e)))
}
