// ABOUTME: Plan compiler tests against the scripted runtime
// ABOUTME: Context wiring, declared ordering, cycles, orphans, managers and knowledge loading

mod common;

use common::setup;
use crewyard_agents::AgentCreateInput;
use crewyard_crews::{CrewCreateInput, Process};
use crewyard_engine::test_utils::{FakeManager, FakeRuntime};
use crewyard_engine::{compile, compile_blocking, Plan};
use crewyard_knowledge::{KnowledgeSourceCreateInput, SourceType};
use crewyard_tasks::TaskCreateInput;
use pretty_assertions::assert_eq;
use std::sync::Arc;

async fn plan(ctx: &common::TestContext, crew_id: &str) -> Plan<FakeRuntime> {
    let crew = ctx
        .services
        .crews
        .get_crew_with_relations(crew_id)
        .await
        .unwrap();
    compile_blocking(&FakeRuntime::new(), ctx.services.loader.as_ref(), &crew).unwrap()
}

fn context_of(plan: &Plan<FakeRuntime>, task_id: &str) -> Option<Vec<String>> {
    plan.task(task_id).unwrap().context.clone()
}

#[tokio::test]
async fn test_context_chain() {
    let ctx = setup().await;
    let a1 = ctx.agent("R").await;
    let t1 = ctx.task(&a1, "say hi").await;
    let t2 = ctx
        .task_with(TaskCreateInput {
            description: "follow up".to_string(),
            agent_id: a1.clone(),
            sync_context_task_ids: vec![t1.clone()],
            ..Default::default()
        })
        .await;
    let c2 = ctx.crew("c2", &[&a1], &[&t1, &t2]).await;

    let plan = plan(&ctx, &c2).await;

    assert_eq!(plan.task_ids, vec![t1.clone(), t2.clone()]);
    assert_eq!(context_of(&plan, &t2), Some(vec![t1.clone()]));
    assert_eq!(context_of(&plan, &t1), None);
    assert!(plan.warnings.is_empty());

    // The context entry is the same runtime object as the crew's own task
    let crew_t1 = plan.task(&t1).unwrap();
    assert!(Arc::ptr_eq(crew_t1, &plan.tasks[0]));
    assert_eq!(plan.crew.task_ids, vec![t1, t2]);
}

#[tokio::test]
async fn test_declared_order_wins_over_discovery_order() {
    let ctx = setup().await;
    let a1 = ctx.agent("R").await;
    let t1 = ctx.task(&a1, "first built").await;
    let t2 = ctx
        .task_with(TaskCreateInput {
            description: "declared first".to_string(),
            agent_id: a1.clone(),
            async_context_task_ids: vec![t1.clone()],
            ..Default::default()
        })
        .await;
    let crew = ctx.crew("ordered", &[&a1], &[&t2, &t1]).await;

    let first = plan(&ctx, &crew).await;
    let second = plan(&ctx, &crew).await;

    assert_eq!(first.task_ids, vec![t2.clone(), t1.clone()]);
    assert_eq!(first.task_ids, second.task_ids);
    assert_eq!(context_of(&first, &t2), Some(vec![t1]));
}

#[tokio::test]
async fn test_async_task_without_context_gets_empty_list() {
    let ctx = setup().await;
    let a1 = ctx.agent("R").await;
    let t1 = ctx
        .task_with(TaskCreateInput {
            description: "background".to_string(),
            agent_id: a1.clone(),
            async_execution: Some(true),
            ..Default::default()
        })
        .await;
    let crew = ctx.crew("async", &[&a1], &[&t1]).await;

    let plan = plan(&ctx, &crew).await;
    assert_eq!(context_of(&plan, &t1), Some(vec![]));
}

#[tokio::test]
async fn test_context_cycle_terminates_with_warning() {
    let ctx = setup().await;
    let a1 = ctx.agent("R").await;
    let ta = ctx.task(&a1, "a").await;
    let tb = ctx.task(&a1, "b").await;
    ctx.set_sync_context(&ta, &[&tb]).await;
    ctx.set_sync_context(&tb, &[&ta]).await;
    let crew = ctx.crew("cycle", &[&a1], &[&ta, &tb]).await;

    let plan = plan(&ctx, &crew).await;

    assert_eq!(plan.task_ids, vec![ta.clone(), tb.clone()]);
    assert_eq!(context_of(&plan, &ta), Some(vec![tb.clone()]));
    assert_eq!(context_of(&plan, &tb), Some(vec![]));
    assert!(plan.warnings.iter().any(|w| w.contains("cycle")));
}

#[tokio::test]
async fn test_context_outside_crew_is_dropped_with_warning() {
    let ctx = setup().await;
    let a1 = ctx.agent("R").await;
    let outside = ctx.task(&a1, "elsewhere").await;
    let t2 = ctx
        .task_with(TaskCreateInput {
            description: "needs outside".to_string(),
            agent_id: a1.clone(),
            sync_context_task_ids: vec![outside.clone()],
            ..Default::default()
        })
        .await;
    let crew = ctx.crew("partial", &[&a1], &[&t2]).await;

    let plan = plan(&ctx, &crew).await;

    assert_eq!(plan.task_ids, vec![t2.clone()]);
    assert_eq!(context_of(&plan, &t2), Some(vec![]));
    assert_eq!(plan.warnings.len(), 1);
    assert!(plan.warnings[0].contains(&outside));
    assert!(plan.warnings[0].contains("not in the crew"));
}

#[tokio::test]
async fn test_sequential_crew_shape() {
    let ctx = setup().await;
    let a1 = ctx
        .agent_with(AgentCreateInput {
            role: "Writer".to_string(),
            ..Default::default()
        })
        .await;
    let t1 = ctx.task(&a1, "write").await;
    let crew = ctx.crew("writers", &[&a1], &[&t1]).await;

    let plan = plan(&ctx, &crew).await;
    let task = plan.task(&t1).unwrap();
    assert_eq!(task.agent_id, a1);
    assert_eq!(plan.crew.agent_ids, vec![a1]);
    assert_eq!(plan.crew.process, Process::Sequential);
    assert!(plan.crew.manager.is_none());
}

#[tokio::test]
async fn test_hierarchical_manager_variants() {
    let ctx = setup().await;
    let worker = ctx.agent("Worker").await;
    let boss = ctx.agent("Boss").await;
    let t1 = ctx.task(&worker, "work").await;

    let by_agent = ctx
        .crew_with(CrewCreateInput {
            name: "by-agent".to_string(),
            process: Some(Process::Hierarchical),
            manager_agent_id: Some(boss.clone()),
            agent_ids: vec![worker.clone()],
            task_ids: vec![t1.clone()],
            ..Default::default()
        })
        .await;
    let plan_a = plan(&ctx, &by_agent).await;
    assert_eq!(plan_a.crew.manager, Some(FakeManager::Agent(boss)));
    // The manager is not a member agent
    assert_eq!(plan_a.crew.agent_ids, vec![worker.clone()]);

    let by_llm = ctx
        .crew_with(CrewCreateInput {
            name: "by-llm".to_string(),
            process: Some(Process::Hierarchical),
            manager_llm: Some("openai/gpt-manager".to_string()),
            planning: Some(true),
            planning_llm: Some("openai/gpt-planner".to_string()),
            agent_ids: vec![worker],
            task_ids: vec![t1],
            ..Default::default()
        })
        .await;
    let plan_b = plan(&ctx, &by_llm).await;
    assert_eq!(
        plan_b.crew.manager,
        Some(FakeManager::Llm("openai/gpt-manager".to_string()))
    );
    assert_eq!(plan_b.crew.planning_llm.as_deref(), Some("openai/gpt-planner"));
}

#[tokio::test]
async fn test_knowledge_is_loaded_for_agents_and_crew() {
    let ctx = setup().await;
    let inline = ctx
        .services
        .knowledge
        .create_knowledge_source(KnowledgeSourceCreateInput {
            content: Some("x".repeat(120)),
            chunk_size: Some(50),
            chunk_overlap: Some(0),
            ..KnowledgeSourceCreateInput::new("inline", SourceType::InlineText)
        })
        .await
        .unwrap();
    let a1 = ctx
        .agent_with(AgentCreateInput {
            role: "Reader".to_string(),
            knowledge_source_ids: vec![inline.id.clone()],
            ..Default::default()
        })
        .await;
    let t1 = ctx.task(&a1, "read").await;
    let crew = ctx
        .crew_with(CrewCreateInput {
            name: "readers".to_string(),
            agent_ids: vec![a1],
            task_ids: vec![t1],
            knowledge_source_ids: vec![inline.id.clone()],
            ..Default::default()
        })
        .await;

    let plan = plan(&ctx, &crew).await;
    assert_eq!(plan.crew.knowledge.len(), 1);
    assert_eq!(plan.crew.knowledge[0].source_id, inline.id);
    assert_eq!(plan.crew.knowledge[0].chunks, 3);
}

#[tokio::test]
async fn test_unreadable_knowledge_fails_compilation() {
    let ctx = setup().await;
    let missing = ctx
        .services
        .knowledge
        .create_knowledge_source(KnowledgeSourceCreateInput {
            source_path: Some("gone.pdf".to_string()),
            ..KnowledgeSourceCreateInput::new("gone", SourceType::Pdf)
        })
        .await
        .unwrap();
    let crew_id = ctx
        .crew_with(CrewCreateInput {
            name: "broken".to_string(),
            knowledge_source_ids: vec![missing.id],
            ..Default::default()
        })
        .await;
    let crew = ctx
        .services
        .crews
        .get_crew_with_relations(&crew_id)
        .await
        .unwrap();

    let result = compile(
        Arc::new(FakeRuntime::new()),
        ctx.services.loader.clone(),
        crew,
    )
    .await;
    let err = result.err().unwrap();
    assert_eq!(err.kind(), "LoaderError");
    assert!(err.to_string().contains("gone.pdf"));
}
