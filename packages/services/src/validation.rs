// ABOUTME: Validation rules for every entity kind
// ABOUTME: `check_*` covers scalar fields at write time, `validate_*` adds relationships and files

use crewyard_agents::{Agent, AgentWithRelations};
use crewyard_core::ValidationReport;
use crewyard_crews::{Crew, CrewWithRelations, Process};
use crewyard_knowledge::{KnowledgeLoader, KnowledgeSource, SourceType, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use crewyard_tasks::{Task, TaskWithRelations};
use crewyard_tools::Tool;
use std::collections::HashSet;

use crate::stores::ValidationRules;

pub const MIN_TEMPERATURE: f64 = 0.0;
pub const MAX_TEMPERATURE: f64 = 1.0;
pub const RECOMMENDED_MIN_ITER: i32 = 1;
pub const RECOMMENDED_MAX_ITER: i32 = 100;

pub fn check_tool(tool: &Tool) -> ValidationReport {
    let mut report = ValidationReport::new();
    report.require_text("name", &tool.name);
    report
}

pub fn validate_tool(tool: &Tool) -> ValidationReport {
    let mut report = check_tool(tool);
    for name in tool.missing_mandatory_parameters() {
        report.error(format!("mandatory parameter '{}' has no value", name));
    }
    report
}

pub fn check_knowledge_source(source: &KnowledgeSource) -> ValidationReport {
    let mut report = ValidationReport::new();
    report.require_text("name", &source.name);

    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&source.chunk_size) {
        report.error(format!(
            "chunk_size must be between {} and {}",
            MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
        ));
    }
    if source.chunk_overlap < 0 || source.chunk_overlap >= source.chunk_size {
        report.error("chunk_overlap must be non-negative and smaller than chunk_size");
    }

    let has_path = source
        .source_path
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty());

    match source.source_type {
        SourceType::InlineText => {
            if source.content.as_deref().map_or(true, |c| c.trim().is_empty()) {
                report.error("content is required for inline_text sources");
            }
        }
        other => {
            if !has_path {
                report.error(format!("source_path is required for {} sources", other));
            }
        }
    }

    report
}

/// Field rules plus a loader readiness check (file readable, URL well formed)
pub fn validate_knowledge_source(
    source: &KnowledgeSource,
    loader: &dyn KnowledgeLoader,
) -> ValidationReport {
    let mut report = check_knowledge_source(source);
    if !report.has_errors() && source.source_type != SourceType::InlineText {
        if let Err(err) = loader.check(source) {
            report.error(err.to_string());
        }
    }
    report
}

pub fn check_agent(agent: &Agent, rules: &ValidationRules) -> ValidationReport {
    let mut report = ValidationReport::new();
    report.require_text("role", &agent.role);
    report.require_text("goal", &agent.goal);
    report.require_text("backstory", &agent.backstory);
    check_llm(&mut report, "llm_identifier", &agent.llm_identifier, rules);

    if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&agent.temperature) {
        report.error(format!(
            "temperature must be between {} and {}",
            MIN_TEMPERATURE, MAX_TEMPERATURE
        ));
    }
    if !(RECOMMENDED_MIN_ITER..=RECOMMENDED_MAX_ITER).contains(&agent.max_iter) {
        report.warning(format!(
            "max_iter {} is outside the recommended range {}-{}",
            agent.max_iter, RECOMMENDED_MIN_ITER, RECOMMENDED_MAX_ITER
        ));
    }

    report
}

pub fn validate_agent(
    agent: &AgentWithRelations,
    rules: &ValidationRules,
    loader: &dyn KnowledgeLoader,
) -> ValidationReport {
    let mut report = check_agent(&agent.agent, rules);

    for tool in &agent.tools {
        report.absorb(&format!("tool {}", tool.id), validate_tool(tool));
    }
    for source in &agent.knowledge_sources {
        report.absorb(
            &format!("knowledge source {}", source.id),
            validate_knowledge_source(source, loader),
        );
    }

    report
}

pub fn check_task(task: &Task, has_context: bool) -> ValidationReport {
    let mut report = ValidationReport::new();
    report.require_text("description", &task.description);
    report.require_text("expected_output", &task.expected_output);
    if task.agent_id.trim().is_empty() {
        report.error("agent is required");
    }
    if task.async_execution && !has_context {
        report.warning("async task has no context tasks");
    }
    report
}

/// Task rules without the owning agent's own report
fn validate_task_links(task: &TaskWithRelations) -> ValidationReport {
    let mut report = check_task(&task.task, task.has_context());
    if task.context_task_ids().contains(&task.id()) {
        report.error("task cannot use itself as context");
    }
    report
}

pub fn validate_task(
    task: &TaskWithRelations,
    rules: &ValidationRules,
    loader: &dyn KnowledgeLoader,
) -> ValidationReport {
    let mut report = validate_task_links(task);
    report.absorb(
        &format!("agent {}", task.agent.id()),
        validate_agent(&task.agent, rules, loader),
    );
    report
}

pub fn check_crew(crew: &Crew, rules: &ValidationRules) -> ValidationReport {
    let mut report = ValidationReport::new();
    report.require_text("name", &crew.name);

    if let Some(max_rpm) = crew.max_rpm {
        if max_rpm < 1 {
            report.error("max_rpm must be at least 1");
        }
    }
    if crew.manager_llm.is_some() && crew.manager_agent_id.is_some() {
        report.error("manager_llm and manager_agent cannot both be set");
    }
    if let Some(llm) = &crew.manager_llm {
        check_llm(&mut report, "manager_llm", llm, rules);
    }
    if let Some(llm) = &crew.planning_llm {
        check_llm(&mut report, "planning_llm", llm, rules);
    }

    report
}

/// Crew rules. `strict` is the execution-time variant: an empty crew and
/// tasks whose owner is outside the crew become errors.
pub fn validate_crew(
    crew: &CrewWithRelations,
    rules: &ValidationRules,
    loader: &dyn KnowledgeLoader,
    strict: bool,
) -> ValidationReport {
    let mut report = check_crew(&crew.crew, rules);

    let flag = |report: &mut ValidationReport, message: String| {
        if strict {
            report.error(message);
        } else {
            report.warning(message);
        }
    };

    if crew.agents.is_empty() {
        flag(&mut report, "crew has no agents".to_string());
    }
    if crew.tasks.is_empty() {
        flag(&mut report, "crew has no tasks".to_string());
    }

    if crew.crew.process == Process::Hierarchical && !crew.crew.has_manager() {
        report.error("hierarchical process requires a manager_llm or manager_agent");
    }

    let task_ids: HashSet<&str> = crew.tasks.iter().map(|t| t.id()).collect();
    for task in &crew.tasks {
        if !crew.has_agent(&task.task.agent_id) {
            flag(
                &mut report,
                format!(
                    "task {} is owned by agent {} which is not in the crew",
                    task.id(),
                    task.task.agent_id
                ),
            );
        }
        for context_id in task.context_task_ids() {
            if !task_ids.contains(context_id) {
                report.warning(format!(
                    "task {} uses context task {} which is not in the crew",
                    task.id(),
                    context_id
                ));
            }
        }
        report.absorb(&format!("task {}", task.id()), validate_task_links(task));
    }

    for agent in &crew.agents {
        report.absorb(
            &format!("agent {}", agent.id()),
            validate_agent(agent, rules, loader),
        );
    }
    if let Some(manager) = &crew.manager_agent {
        if !crew.has_agent(manager.id()) {
            report.absorb(
                &format!("manager agent {}", manager.id()),
                validate_agent(manager, rules, loader),
            );
        }
    }
    for source in &crew.knowledge_sources {
        report.absorb(
            &format!("knowledge source {}", source.id),
            validate_knowledge_source(source, loader),
        );
    }

    report
}

fn check_llm(report: &mut ValidationReport, field: &str, value: &str, rules: &ValidationRules) {
    if value.trim().is_empty() {
        report.error(format!("{} is required", field));
    } else if !rules.allows_llm(value) {
        report.error(format!("{} '{}' is not in the allowed list", field, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crewyard_knowledge::FsKnowledgeLoader;
    use rstest::rstest;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn agent() -> Agent {
        let now = Utc::now();
        Agent {
            id: "A_1".to_string(),
            role: "Researcher".to_string(),
            backstory: "Curious".to_string(),
            goal: "Find facts".to_string(),
            llm_identifier: "openai/gpt-4o".to_string(),
            temperature: 0.1,
            max_iter: 25,
            allow_delegation: false,
            verbose: true,
            cache: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn source(source_type: SourceType) -> KnowledgeSource {
        let now = Utc::now();
        KnowledgeSource {
            id: "KS_1".to_string(),
            name: "notes".to_string(),
            source_type,
            source_path: None,
            content: Some("text".to_string()),
            metadata: BTreeMap::new(),
            chunk_size: 4000,
            chunk_overlap: 200,
            created_at: now,
            updated_at: now,
        }
    }

    fn loader() -> FsKnowledgeLoader {
        FsKnowledgeLoader::new("/nonexistent-knowledge-dir")
    }

    #[rstest]
    #[case(0.0, true)]
    #[case(1.0, true)]
    #[case(0.55, true)]
    #[case(-0.1, false)]
    #[case(1.01, false)]
    fn test_temperature_bounds(#[case] temperature: f64, #[case] valid: bool) {
        let agent = Agent {
            temperature,
            ..agent()
        };
        assert_eq!(check_agent(&agent, &ValidationRules::default()).is_valid, valid);
    }

    #[rstest]
    #[case(0)]
    #[case(101)]
    fn test_max_iter_outside_band_is_warning(#[case] max_iter: i32) {
        let agent = Agent {
            max_iter,
            ..agent()
        };
        let report = check_agent(&agent, &ValidationRules::default());
        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_missing_persona_fields() {
        let agent = Agent {
            role: String::new(),
            goal: " ".to_string(),
            backstory: String::new(),
            ..agent()
        };
        let report = check_agent(&agent, &ValidationRules::default());
        assert_eq!(
            report.errors,
            vec!["role is required", "goal is required", "backstory is required"]
        );
    }

    #[test]
    fn test_llm_allowlist() {
        let rules = ValidationRules {
            llm_allowlist: Some(vec!["anthropic/claude".to_string()]),
        };
        let report = check_agent(&agent(), &rules);
        assert!(!report.is_valid);
        assert!(report.errors[0].contains("not in the allowed list"));
    }

    #[rstest]
    #[case(SourceType::InlineText, None, Some(""), "content is required")]
    #[case(SourceType::TextFile, None, None, "source_path is required")]
    #[case(SourceType::Pdf, Some("  "), None, "source_path is required")]
    #[case(SourceType::DocUrl, None, None, "source_path is required")]
    fn test_knowledge_field_errors(
        #[case] source_type: SourceType,
        #[case] path: Option<&str>,
        #[case] content: Option<&str>,
        #[case] expected: &str,
    ) {
        let source = KnowledgeSource {
            source_path: path.map(str::to_string),
            content: content.map(str::to_string),
            ..source(source_type)
        };
        let report = check_knowledge_source(&source);
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains(expected)));
    }

    #[rstest]
    #[case(4000, 4000)]
    #[case(100, 150)]
    #[case(100, -1)]
    #[case(10, 0)]
    #[case(30000, 0)]
    fn test_chunk_bounds(#[case] chunk_size: i64, #[case] chunk_overlap: i64) {
        let source = KnowledgeSource {
            chunk_size,
            chunk_overlap,
            ..source(SourceType::InlineText)
        };
        assert!(!check_knowledge_source(&source).is_valid);
    }

    #[test]
    fn test_unreadable_file_is_error() {
        let source = KnowledgeSource {
            source_path: Some("missing.txt".to_string()),
            ..source(SourceType::TextFile)
        };
        assert!(check_knowledge_source(&source).is_valid);

        let report = validate_knowledge_source(&source, &loader());
        assert!(!report.is_valid);
        assert!(report.errors[0].contains("missing.txt"));
    }

    #[test]
    fn test_tool_mandatory_parameter() {
        let now = Utc::now();
        let tool = Tool {
            id: "abcdefabcdef".to_string(),
            name: "search".to_string(),
            description: String::new(),
            parameters: BTreeMap::new(),
            parameters_metadata: serde_json::from_value(json!({"api_key": {"mandatory": true}}))
                .unwrap(),
            created_at: now,
            updated_at: now,
        };
        assert!(check_tool(&tool).is_valid);
        let report = validate_tool(&tool);
        assert_eq!(report.errors, vec!["mandatory parameter 'api_key' has no value"]);
    }

    #[test]
    fn test_agent_absorbs_tool_errors() {
        let now = Utc::now();
        let tool = Tool {
            id: "abcdefabcdef".to_string(),
            name: String::new(),
            description: String::new(),
            parameters: BTreeMap::new(),
            parameters_metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };
        let agent = AgentWithRelations {
            agent: agent(),
            tools: vec![tool],
            knowledge_sources: vec![source(SourceType::InlineText)],
        };
        let report = validate_agent(&agent, &ValidationRules::default(), &loader());
        assert_eq!(report.errors, vec!["tool abcdefabcdef: name is required"]);
    }

    #[test]
    fn test_async_task_without_context_warns() {
        let now = Utc::now();
        let task = Task {
            id: "T_1".to_string(),
            description: "d".to_string(),
            expected_output: "e".to_string(),
            async_execution: true,
            agent_id: "A_1".to_string(),
            created_at: now,
            updated_at: now,
        };
        let report = check_task(&task, false);
        assert!(report.is_valid);
        assert_eq!(report.warnings, vec!["async task has no context tasks"]);
        assert!(check_task(&task, true).warnings.is_empty());
    }

    #[test]
    fn test_crew_both_managers() {
        let now = Utc::now();
        let crew = Crew {
            id: "C_1".to_string(),
            name: "c".to_string(),
            process: Process::Hierarchical,
            verbose: true,
            cache: true,
            max_rpm: Some(0),
            memory: false,
            planning: false,
            manager_llm: Some("openai/gpt-4o".to_string()),
            manager_agent_id: Some("A_1".to_string()),
            planning_llm: None,
            created_at: now,
            updated_at: now,
        };
        let report = check_crew(&crew, &ValidationRules::default());
        assert_eq!(
            report.errors,
            vec![
                "max_rpm must be at least 1",
                "manager_llm and manager_agent cannot both be set"
            ]
        );
    }
}
