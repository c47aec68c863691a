// ABOUTME: End-to-end tests through the Studio facade
// ABOUTME: Entity lifecycle, deletion policies, plan compilation and the run lifecycle with a scripted runtime

use crewyard_agents::AgentCreateInput;
use crewyard_api::{RunStatus, Studio, CANCELLED_REASON};
use crewyard_core::{Config, EntityKind};
use crewyard_crews::{CrewCreateInput, CrewUpdateInput, Process};
use crewyard_engine::compile_blocking;
use crewyard_engine::test_utils::FakeRuntime;
use crewyard_services::{Referrer, ServiceSettings, Services, Stores};
use crewyard_storage::connect_in_memory;
use crewyard_tasks::{TaskCreateInput, TaskUpdateInput};
use crewyard_tools::ToolCreateInput;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    studio: Studio<FakeRuntime>,
    _knowledge_dir: TempDir,
}

async fn studio_with(runtime: FakeRuntime) -> Fixture {
    let pool = connect_in_memory().await.unwrap();
    let knowledge_dir = TempDir::new().unwrap();
    let settings = ServiceSettings {
        knowledge_dir: knowledge_dir.path().to_path_buf(),
        llm_allowlist: None,
    };
    Fixture {
        studio: Studio::new(Services::new(Stores::new(pool), &settings), Arc::new(runtime)),
        _knowledge_dir: knowledge_dir,
    }
}

/// Agent A1, task T1 and crew C2 as used by most scenarios
struct Basic {
    agent: String,
    task: String,
    crew: String,
}

async fn basic(studio: &Studio<FakeRuntime>) -> Basic {
    let agent = studio
        .create_agent(AgentCreateInput {
            role: "R".to_string(),
            goal: "G".to_string(),
            backstory: "B".to_string(),
            llm_identifier: "openai/gpt-test".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
        .agent
        .id;
    let task = studio
        .create_task(TaskCreateInput {
            description: "say hi".to_string(),
            expected_output: "hi".to_string(),
            agent_id: agent.clone(),
            ..Default::default()
        })
        .await
        .unwrap()
        .task
        .id;
    let crew = studio
        .create_crew(CrewCreateInput {
            name: "C2".to_string(),
            process: Some(Process::Sequential),
            agent_ids: vec![agent.clone()],
            task_ids: vec![task.clone()],
            ..Default::default()
        })
        .await
        .unwrap()
        .crew
        .id;
    Basic { agent, task, crew }
}

async fn wait_for_terminal(studio: &Studio<FakeRuntime>, run_id: &str) -> crewyard_api::Run {
    for _ in 0..500 {
        let run = studio.get_run(run_id).await.unwrap();
        if run.status.is_terminal() {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {} never finished", run_id);
}

#[tokio::test]
async fn test_empty_crew_rejects_execution() {
    let fx = studio_with(FakeRuntime::new()).await;
    let crew = fx
        .studio
        .create_crew(CrewCreateInput {
            name: "empty".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let err = fx
        .studio
        .execute_crew(crew.id(), BTreeMap::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "ValidationError");
    let errors = &err.report().unwrap().errors;
    assert!(errors.iter().any(|e| e.contains("no agents")));
    assert!(errors.iter().any(|e| e.contains("no tasks")));
    assert!(fx.studio.list_runs(crew.id(), 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_single_agent_single_task_completes() {
    let fx = studio_with(FakeRuntime::new()).await;
    let b = basic(&fx.studio).await;

    let run_id = fx
        .studio
        .execute_crew(&b.crew, BTreeMap::new())
        .await
        .unwrap();
    let run = wait_for_terminal(&fx.studio, &run_id).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert!(!run.result_text.as_deref().unwrap_or_default().is_empty());
    assert!(run.error_text.is_none());
    assert!(run.started_at.unwrap() <= run.completed_at.unwrap());
}

#[tokio::test]
async fn test_delete_agent_in_use_names_referrers() {
    let fx = studio_with(FakeRuntime::new()).await;
    let b = basic(&fx.studio).await;

    let err = fx.studio.delete_agent(&b.agent).await.unwrap_err();

    assert_eq!(err.kind(), "InUseError");
    match err {
        crewyard_api::ServiceError::InUse { referrers, .. } => assert_eq!(
            referrers,
            vec![
                Referrer::new(EntityKind::Task, b.task.clone()),
                Referrer::new(EntityKind::Crew, b.crew.clone()),
            ]
        ),
        other => panic!("unexpected error: {other}"),
    }
    assert!(fx.studio.get_agent(&b.agent).await.is_ok());
}

#[tokio::test]
async fn test_context_chain_compiles_in_order() {
    let fx = studio_with(FakeRuntime::new()).await;
    let b = basic(&fx.studio).await;

    let t2 = fx
        .studio
        .create_task(TaskCreateInput {
            description: "follow up".to_string(),
            expected_output: "more".to_string(),
            agent_id: b.agent.clone(),
            sync_context_task_ids: vec![b.task.clone()],
            ..Default::default()
        })
        .await
        .unwrap()
        .task
        .id;
    fx.studio
        .update_crew(
            &b.crew,
            CrewUpdateInput {
                task_ids: Some(vec![b.task.clone(), t2.clone()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let crew = fx.studio.get_crew(&b.crew).await.unwrap();
    let services = fx.studio.services();
    let plan = compile_blocking(&FakeRuntime::new(), services.loader.as_ref(), &crew).unwrap();

    assert_eq!(plan.task_ids, vec![b.task.clone(), t2.clone()]);
    assert_eq!(
        plan.task(&t2).unwrap().context,
        Some(vec![b.task.clone()])
    );

    // Compiling again yields the same order
    let again = compile_blocking(&FakeRuntime::new(), services.loader.as_ref(), &crew).unwrap();
    assert_eq!(again.task_ids, plan.task_ids);
}

#[tokio::test]
async fn test_hierarchical_without_manager_is_invalid() {
    let fx = studio_with(FakeRuntime::new()).await;
    let b = basic(&fx.studio).await;

    let c3 = fx
        .studio
        .create_crew(CrewCreateInput {
            name: "C3".to_string(),
            process: Some(Process::Hierarchical),
            agent_ids: vec![b.agent.clone()],
            task_ids: vec![b.task.clone()],
            ..Default::default()
        })
        .await
        .unwrap();

    let report = fx.studio.validate_crew(c3.id()).await.unwrap();
    assert!(!report.is_valid);
    assert!(report.errors.iter().any(|e| e.contains("manager")));

    // An invalid crew is refused synchronously
    let err = fx
        .studio
        .execute_crew(c3.id(), BTreeMap::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ValidationError");

    // And a valid one is accepted
    assert!(fx.studio.validate_crew(&b.crew).await.unwrap().is_valid);
    assert!(fx
        .studio
        .execute_crew(&b.crew, BTreeMap::new())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_cancel_during_running_window() {
    let (runtime, gate) = FakeRuntime::gated();
    let started = runtime.started();
    let fx = studio_with(runtime).await;
    let b = basic(&fx.studio).await;

    let run_id = fx
        .studio
        .execute_crew(&b.crew, BTreeMap::new())
        .await
        .unwrap();
    started.notified().await;

    fx.studio.cancel_run(&run_id).await.unwrap();
    gate.notify_one();

    let run = wait_for_terminal(&fx.studio, &run_id).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let run_later = fx.studio.get_run(&run_id).await.unwrap();

    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run_later.status, RunStatus::Cancelled);
    assert!(run_later.completed_at.is_some());
    assert!(run_later.result_text.is_none());
    assert_eq!(run_later.error_text.as_deref(), Some(CANCELLED_REASON));

    // Cancelling again is a no-op
    assert_eq!(
        fx.studio.cancel_run(&run_id).await.unwrap().status,
        RunStatus::Cancelled
    );
}

#[tokio::test]
async fn test_context_cycle_compiles_with_warning() {
    let fx = studio_with(FakeRuntime::new()).await;
    let b = basic(&fx.studio).await;

    let mut ids = Vec::new();
    for description in ["a", "b"] {
        let id = fx
            .studio
            .create_task(TaskCreateInput {
                description: description.to_string(),
                expected_output: "x".to_string(),
                agent_id: b.agent.clone(),
                ..Default::default()
            })
            .await
            .unwrap()
            .task
            .id;
        ids.push(id);
    }
    let (ta, tb) = (ids[0].clone(), ids[1].clone());
    for (task, other) in [(&ta, &tb), (&tb, &ta)] {
        fx.studio
            .update_task(
                task,
                TaskUpdateInput {
                    sync_context_task_ids: Some(vec![other.clone()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
    let crew = fx
        .studio
        .create_crew(CrewCreateInput {
            name: "cycle".to_string(),
            agent_ids: vec![b.agent.clone()],
            task_ids: vec![ta.clone(), tb.clone()],
            ..Default::default()
        })
        .await
        .unwrap();

    let plan = compile_blocking(
        &FakeRuntime::new(),
        fx.studio.services().loader.as_ref(),
        &crew,
    )
    .unwrap();
    assert_eq!(plan.task_ids, vec![ta, tb]);
    assert!(plan.warnings.iter().any(|w| w.contains("cycle")));

    // The compiled crew still runs
    let run_id = fx
        .studio
        .execute_crew(crew.id(), BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(
        wait_for_terminal(&fx.studio, &run_id).await.status,
        RunStatus::Completed
    );
}

#[tokio::test]
async fn test_add_then_remove_tool_restores_set() {
    let fx = studio_with(FakeRuntime::new()).await;
    let b = basic(&fx.studio).await;
    let search = fx
        .studio
        .create_tool(ToolCreateInput {
            name: "search".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let before = fx.studio.get_agent(&b.agent).await.unwrap().tools;
    let added = fx
        .studio
        .add_tool_to_agent(&b.agent, &search.id)
        .await
        .unwrap();
    assert_eq!(added.tools.len(), before.len() + 1);

    let removed = fx
        .studio
        .remove_tool_from_agent(&b.agent, &search.id)
        .await
        .unwrap();
    assert_eq!(removed.tools, before);

    fx.studio.delete_tool(&search.id).await.unwrap();
    assert_eq!(
        fx.studio.get_tool(&search.id).await.unwrap_err().kind(),
        "NotFound"
    );
}

#[tokio::test]
async fn test_terminal_runs_carry_one_artifact() {
    let ok = studio_with(FakeRuntime::new()).await;
    let b = basic(&ok.studio).await;
    let run_id = ok.studio.execute_crew(&b.crew, BTreeMap::new()).await.unwrap();
    let run = wait_for_terminal(&ok.studio, &run_id).await;
    assert!(run.result_text.is_some() && run.error_text.is_none());

    let failing = studio_with(FakeRuntime::failing("quota exceeded")).await;
    let b = basic(&failing.studio).await;
    let run_id = failing
        .studio
        .execute_crew(&b.crew, BTreeMap::new())
        .await
        .unwrap();
    let run = wait_for_terminal(&failing.studio, &run_id).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.result_text.is_none());
    assert!(run.error_text.unwrap().contains("quota exceeded"));
}

#[tokio::test]
async fn test_delete_crew_removes_runs() {
    let fx = studio_with(FakeRuntime::new()).await;
    let b = basic(&fx.studio).await;

    let run_id = fx
        .studio
        .execute_crew(&b.crew, BTreeMap::new())
        .await
        .unwrap();
    wait_for_terminal(&fx.studio, &run_id).await;

    assert_eq!(fx.studio.delete_crew(&b.crew).await.unwrap(), 1);

    let stores = &fx.studio.services().stores;
    assert!(stores.runs.list_runs(&b.crew, 10).await.unwrap().is_empty());
    assert_eq!(fx.studio.get_crew(&b.crew).await.unwrap_err().kind(), "NotFound");
    assert_eq!(fx.studio.get_run(&run_id).await.unwrap_err().kind(), "NotFound");
    assert_eq!(
        fx.studio.list_runs(&b.crew, 10).await.unwrap_err().kind(),
        "NotFound"
    );
}

#[tokio::test]
async fn test_deleting_context_task_lists_exact_referrers() {
    let fx = studio_with(FakeRuntime::new()).await;
    let b = basic(&fx.studio).await;

    let mut referrers = Vec::new();
    for (description, sync) in [("async user", false), ("sync user", true)] {
        let mut input = TaskCreateInput {
            description: description.to_string(),
            expected_output: "x".to_string(),
            agent_id: b.agent.clone(),
            ..Default::default()
        };
        if sync {
            input.sync_context_task_ids = vec![b.task.clone()];
        } else {
            input.async_context_task_ids = vec![b.task.clone()];
        }
        let id = fx.studio.create_task(input).await.unwrap().task.id;
        referrers.push(Referrer::new(EntityKind::Task, id));
    }
    // Unrelated task must not be listed
    fx.studio
        .create_task(TaskCreateInput {
            description: "bystander".to_string(),
            expected_output: "x".to_string(),
            agent_id: b.agent.clone(),
            ..Default::default()
        })
        .await
        .unwrap();

    let err = fx.studio.delete_task(&b.task).await.unwrap_err();
    match err {
        crewyard_api::ServiceError::InUse {
            referrers: mut found,
            ..
        } => {
            found.retain(|r| r.kind == EntityKind::Task);
            found.sort_by(|a, b| a.id.cmp(&b.id));
            referrers.sort_by(|a, b| a.id.cmp(&b.id));
            assert_eq!(found, referrers);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let fx = studio_with(FakeRuntime::new()).await;

    assert_eq!(fx.studio.get_agent("A_nope").await.unwrap_err().kind(), "NotFound");
    assert_eq!(fx.studio.get_task("T_nope").await.unwrap_err().kind(), "NotFound");
    assert_eq!(fx.studio.get_crew("C_nope").await.unwrap_err().kind(), "NotFound");
    assert_eq!(
        fx.studio.get_knowledge_source("KS_nope").await.unwrap_err().kind(),
        "NotFound"
    );
    assert_eq!(fx.studio.validate_tool("nope").await.unwrap_err().kind(), "NotFound");
    assert_eq!(fx.studio.get_run("CR_nope").await.unwrap_err().kind(), "NotFound");
    assert_eq!(fx.studio.cancel_run("CR_nope").await.unwrap_err().kind(), "NotFound");
    assert_eq!(
        fx.studio
            .execute_crew("C_nope", BTreeMap::new())
            .await
            .unwrap_err()
            .kind(),
        "NotFound"
    );
}

#[tokio::test]
async fn test_from_config_recovers_interrupted_runs() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        database_url: format!("sqlite:{}", dir.path().join("crewyard.db").display()),
        knowledge_dir: dir.path().join("knowledge"),
        max_connections: 2,
        llm_allowlist: None,
        log_filter: "info".to_string(),
    };

    let first = Studio::from_config(&config, Arc::new(FakeRuntime::new()))
        .await
        .unwrap();
    let b = basic(&first).await;
    let stale = first
        .services()
        .stores
        .runs
        .create_run(&b.crew, &BTreeMap::new())
        .await
        .unwrap();
    first.services().stores.pool.close().await;

    let second = Studio::from_config(&config, Arc::new(FakeRuntime::new()))
        .await
        .unwrap();
    let run = second.get_run(&stale.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.completed_at.is_some());
    assert_eq!(second.get_crew(&b.crew).await.unwrap().crew.name, "C2");
}
