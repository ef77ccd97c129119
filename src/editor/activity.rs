//! Detection of the nodes a running crew is working on.
//!
//! The run service only exposes a free-text log, so the active subset is
//! guessed from its trailing lines: a node is active when a recent line
//! mentions it by name or by id.

use std::collections::BTreeSet;

use regex::Regex;

use crate::{
    graph::{NodeId, agent_node_id, task_node_id},
    model::{Agent, Task},
};

const ACTIVITY_WORDS: [&str; 6] = ["starting", "running", "executing", "processing", "working", "analyzing"];

/// Ids of the nodes mentioned in the last `window` lines of `log`.
///
/// When no node is mentioned but the log still shows activity, the first
/// agent is reported so that the graph never looks idle during a run.
pub fn detect_active_nodes(
    log: &str,
    agents: &[Agent],
    tasks: &[Task],
    window: usize,
) -> BTreeSet<NodeId> {
    let lines: Vec<String> = log.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_lowercase).collect();
    let recent = &lines[lines.len().saturating_sub(window)..];

    let mut active = BTreeSet::new();
    if recent.is_empty() {
        return active;
    }

    for agent in agents {
        let pattern = id_pattern("agent", &agent.id);
        let name = agent.name.trim().to_lowercase();
        if recent.iter().any(|line| (!name.is_empty() && line.contains(&name)) || pattern.as_ref().is_some_and(|p| p.is_match(line))) {
            active.insert(agent_node_id(&agent.id));
        }
    }

    for task in tasks {
        let pattern = id_pattern("task", &task.id);
        let description = task.description.trim().to_lowercase();
        if recent.iter().any(|line| (!description.is_empty() && line.contains(&description)) || pattern.as_ref().is_some_and(|p| p.is_match(line))) {
            active.insert(task_node_id(&task.id));
        }
    }

    if active.is_empty() && recent.iter().any(|line| ACTIVITY_WORDS.iter().any(|w| line.contains(w))) {
        if let Some(first) = agents.first() {
            active.insert(agent_node_id(&first.id));
        }
    }

    active
}

/// `agent-7` or `agent 7`, not followed by more id characters.
fn id_pattern(
    prefix: &str,
    id: &str,
) -> Option<Regex> {
    if id.is_empty() {
        return None;
    }
    Regex::new(&format!(r"{}[- ]{}(?:$|[^\w-])", prefix, regex::escape(&id.to_lowercase()))).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crew() -> (Vec<Agent>, Vec<Task>) {
        (
            vec![Agent::new("1", "Researcher"), Agent::new("12", "Writer")],
            vec![Task::new("3", "Collect sources on rust"), Task::new("4", "Draft")],
        )
    }

    #[test]
    fn test_detects_by_name_and_id() {
        let (agents, tasks) = crew();
        let log = "booting\n[Researcher] looking for papers\nfinished task-4\n";
        let active = detect_active_nodes(log, &agents, &tasks, 15);
        assert_eq!(active, BTreeSet::from(["agent-1".to_string(), "task-4".to_string()]));
    }

    #[test]
    fn test_id_match_is_exact() {
        let (agents, tasks) = crew();
        let active = detect_active_nodes("handing over to agent 12", &agents, &tasks, 15);
        assert_eq!(active, BTreeSet::from(["agent-12".to_string()]));
    }

    #[test]
    fn test_only_recent_lines_count() {
        let (agents, tasks) = crew();
        let log = "Researcher started\nline\nline\nline";
        let active = detect_active_nodes(log, &agents, &tasks, 3);
        assert!(active.is_empty());
    }

    #[test]
    fn test_activity_fallback_to_first_agent() {
        let (agents, tasks) = crew();
        let active = detect_active_nodes("Executing step 2 of 5", &agents, &tasks, 15);
        assert_eq!(active, BTreeSet::from(["agent-1".to_string()]));
    }

    #[test]
    fn test_empty_log() {
        let (agents, tasks) = crew();
        assert!(detect_active_nodes("", &agents, &tasks, 15).is_empty());
    }
}
