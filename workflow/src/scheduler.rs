//! DAG scheduling primitives (spec §4.H): dependency resolution over
//! `depends_on` + edges, Kahn's-algorithm topological order for the
//! sequential mode, and readiness checks shared by all three modes.

use std::collections::{HashMap, HashSet, VecDeque};

use dashmap::DashMap;
use skillflow_storage::model::{NodeStatus, SkillGraph};

/// Every node a given node must wait on: its explicit `depends_on` plus
/// any edge pointing at it.
pub fn dependencies_of<'a>(node_id: &str, graph: &'a SkillGraph) -> HashSet<&'a str> {
    let mut deps = HashSet::new();
    if let Some(node) = graph.node(node_id) {
        for dep in &node.depends_on {
            deps.insert(dep.as_str());
        }
    }
    for edge in &graph.edges {
        if edge.to_node == node_id {
            deps.insert(edge.from_node.as_str());
        }
    }
    deps
}

/// A stable topological order over the graph's nodes. `SkillGraph::validate`
/// rejects cycles at save time, so every node here has a well-defined
/// position.
pub fn topological_order(graph: &SkillGraph) -> Vec<String> {
    let mut indegree: HashMap<&str, usize> =
        graph.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> =
        graph.nodes.iter().map(|n| (n.id.as_str(), Vec::new())).collect();

    for node in &graph.nodes {
        for dep in dependencies_of(&node.id, graph) {
            adjacency.entry(dep).or_default().push(node.id.as_str());
            *indegree.entry(node.id.as_str()).or_default() += 1;
        }
    }

    let mut ready: Vec<&str> = indegree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(id, _)| *id)
        .collect();
    ready.sort_unstable();
    let mut queue: VecDeque<&str> = ready.into();

    let mut order = Vec::with_capacity(graph.nodes.len());
    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        if let Some(children) = adjacency.get(id) {
            let mut newly_ready = Vec::new();
            for &child in children {
                if let Some(degree) = indegree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        newly_ready.push(child);
                    }
                }
            }
            newly_ready.sort_unstable();
            for child in newly_ready {
                queue.push_back(child);
            }
        }
    }
    order
}

pub enum Readiness {
    Ready,
    /// At least one dependency failed (or was skipped) conclusively; this
    /// node can never run and should be marked `Skipped`.
    Skip,
    /// Dependencies are still pending or running.
    Wait,
}

pub fn check_readiness(
    node_id: &str,
    graph: &SkillGraph,
    statuses: &DashMap<String, NodeStatus>,
) -> Readiness {
    let deps = dependencies_of(node_id, graph);
    if deps.is_empty() {
        return Readiness::Ready;
    }

    let mut all_success = true;
    let mut conclusively_blocked = false;
    for dep in deps {
        match statuses.get(dep).map(|s| *s.value()) {
            Some(NodeStatus::Success) => {}
            Some(status) if status.is_terminal() => {
                all_success = false;
                conclusively_blocked = true;
            }
            _ => all_success = false,
        }
    }

    if all_success {
        Readiness::Ready
    } else if conclusively_blocked {
        Readiness::Skip
    } else {
        Readiness::Wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillflow_storage::model::{Concurrency, ErrorStrategy, NodeKind, SkillEdge, SkillNode};
    use std::collections::HashMap as StdHashMap;

    fn tool_node(id: &str, depends_on: Vec<&str>) -> SkillNode {
        SkillNode {
            id: id.to_string(),
            kind: NodeKind::ToolCall {
                server_id: "s".into(),
                tool: "t".into(),
            },
            args_template: serde_json::Value::Null,
            export_outputs: StdHashMap::new(),
            depends_on: depends_on.into_iter().map(String::from).collect(),
            error_strategy: ErrorStrategy::FailFast,
            retry: None,
            timeout_ms: None,
            parameter_transform: None,
        }
    }

    #[test]
    fn topological_order_respects_edges_and_depends_on() {
        let graph = SkillGraph {
            nodes: vec![
                tool_node("a", vec![]),
                tool_node("b", vec!["a"]),
                tool_node("c", vec![]),
            ],
            edges: vec![SkillEdge {
                from_node: "c".into(),
                to_node: "b".into(),
                condition: None,
            }],
            concurrency: Concurrency::default(),
        };
        let order = topological_order(&graph);
        assert!(order.iter().position(|n| n == "a").unwrap() < order.iter().position(|n| n == "b").unwrap());
        assert!(order.iter().position(|n| n == "c").unwrap() < order.iter().position(|n| n == "b").unwrap());
    }

    #[test]
    fn readiness_skips_when_a_dependency_failed() {
        let graph = SkillGraph {
            nodes: vec![tool_node("a", vec![]), tool_node("b", vec!["a"])],
            edges: vec![],
            concurrency: Concurrency::default(),
        };
        let statuses = DashMap::new();
        statuses.insert("a".to_string(), NodeStatus::Failed);
        assert!(matches!(check_readiness("b", &graph, &statuses), Readiness::Skip));
    }

    #[test]
    fn readiness_waits_while_a_dependency_is_still_running() {
        let graph = SkillGraph {
            nodes: vec![tool_node("a", vec![]), tool_node("b", vec!["a"])],
            edges: vec![],
            concurrency: Concurrency::default(),
        };
        let statuses = DashMap::new();
        statuses.insert("a".to_string(), NodeStatus::Running);
        assert!(matches!(check_readiness("b", &graph, &statuses), Readiness::Wait));
    }
}
