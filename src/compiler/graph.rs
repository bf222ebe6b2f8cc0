use crate::error::{CompileError, CompileResult};
use crate::model::logic::RawLBlock;
use crate::model::{ProjectItem, normalize_input};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

/// One turn of an authored conversation, linked to its neighbours by id.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogNode {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub zone_id: Uuid,
    /// Normalized entry phrases, deduplicated, in first-seen order.
    pub entry_input: Vec<String>,
    pub logic: RawLBlock,
    pub is_root: bool,
    pub unknown_handler: bool,
    pub parent_nodes: Vec<Uuid>,
    pub child_nodes: Vec<Uuid>,
}

impl DialogNode {
    pub fn has_children(&self) -> bool {
        !self.child_nodes.is_empty()
    }
}

/// Read-only dialog graph for one compile job.
///
/// Roots are the nodes whose `IsRoot` column is set; having no parent edge
/// does not make a node a root.
#[derive(Debug, Default)]
pub struct DialogGraph {
    nodes: HashMap<Uuid, DialogNode>,
    order: Vec<Uuid>,
    roots: Vec<Uuid>,
}

impl DialogGraph {
    /// Rebuilds the graph from denormalized rows in a single pass.
    ///
    /// Rows may arrive in any order: node definitions are collected first and
    /// edges are linked once every node is known.
    pub fn build(items: &[ProjectItem]) -> CompileResult<Self> {
        let mut nodes: HashMap<Uuid, DialogNode> = HashMap::new();
        let mut order = Vec::new();
        let mut seen_inputs: HashMap<Uuid, HashSet<String>> = HashMap::new();
        let mut edges: Vec<(Uuid, Uuid)> = Vec::new();
        let mut seen_edges: HashSet<(Uuid, Uuid)> = HashSet::new();

        for item in items {
            if !nodes.contains_key(&item.dialog_id) {
                let owner = format!("dialog node {}", item.dialog_id);
                let logic = RawLBlock::decode(&owner, &item.always_exec, item.statements.as_ref())?;
                nodes.insert(
                    item.dialog_id,
                    DialogNode {
                        id: item.dialog_id,
                        actor_id: item.actor_id,
                        zone_id: item.zone_id,
                        entry_input: Vec::new(),
                        logic,
                        is_root: item.is_root,
                        unknown_handler: item.unknown_handler,
                        parent_nodes: Vec::new(),
                        child_nodes: Vec::new(),
                    },
                );
                order.push(item.dialog_id);
            }

            if let Some(node) = nodes.get_mut(&item.dialog_id) {
                let seen = seen_inputs.entry(item.dialog_id).or_default();
                for raw in item.dialog_entry.iter().flatten() {
                    let phrase = normalize_input(raw);
                    if !phrase.is_empty() && seen.insert(phrase.clone()) {
                        node.entry_input.push(phrase);
                    }
                }
            }

            match (item.parent_dialog_id, item.child_dialog_id) {
                (Some(parent), Some(child)) => {
                    if seen_edges.insert((parent, child)) {
                        edges.push((parent, child));
                    }
                }
                (None, None) => {}
                _ => debug!(dialog_id = %item.dialog_id, "Ignoring half-specified edge"),
            }
        }

        for (parent, child) in edges {
            if !nodes.contains_key(&parent) || !nodes.contains_key(&child) {
                return Err(CompileError::DanglingEdge { parent, child });
            }
            if let Some(node) = nodes.get_mut(&parent) {
                node.child_nodes.push(child);
            }
            if let Some(node) = nodes.get_mut(&child) {
                node.parent_nodes.push(parent);
            }
        }

        let roots = order.iter().copied().filter(|id| nodes[id].is_root).collect();
        let graph = Self { nodes, order, roots };
        graph.check_acyclic()?;
        Ok(graph)
    }

    pub fn get(&self, id: &Uuid) -> Option<&DialogNode> {
        self.nodes.get(id)
    }

    pub fn node(&self, id: &Uuid) -> CompileResult<&DialogNode> {
        self.get(id).ok_or(CompileError::NodeNotFound(*id))
    }

    pub fn roots(&self) -> &[Uuid] {
        &self.roots
    }

    /// Node ids in first-seen row order.
    pub fn ids(&self) -> &[Uuid] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root nodes grouped by owning actor, actors in first-seen order.
    pub fn roots_by_actor(&self) -> Vec<(Uuid, Vec<Uuid>)> {
        let mut grouped: Vec<(Uuid, Vec<Uuid>)> = Vec::new();
        for id in &self.roots {
            let actor = self.nodes[id].actor_id;
            match grouped.iter_mut().find(|(a, _)| *a == actor) {
                Some((_, ids)) => ids.push(*id),
                None => grouped.push((actor, vec![*id])),
            }
        }
        grouped
    }

    /// Iterative DFS with an on-path set; a child already on the path closes a cycle.
    fn check_acyclic(&self) -> CompileResult<()> {
        let mut done: HashSet<Uuid> = HashSet::new();
        let mut on_path: HashSet<Uuid> = HashSet::new();

        for start in &self.order {
            if done.contains(start) {
                continue;
            }
            let mut stack: Vec<(Uuid, usize)> = vec![(*start, 0)];
            on_path.insert(*start);

            while let Some((id, next_child)) = stack.last_mut() {
                let current = *id;
                let child = self.nodes[&current].child_nodes.get(*next_child).copied();
                *next_child += 1;

                match child {
                    Some(child) if on_path.contains(&child) => return Err(CompileError::Cycle(child)),
                    Some(child) => {
                        if !done.contains(&child) {
                            on_path.insert(child);
                            stack.push((child, 0));
                        }
                    }
                    None => {
                        stack.pop();
                        on_path.remove(&current);
                        done.insert(current);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn row(node: u128, edge: Option<(u128, u128)>, root: bool, entry: &[&str]) -> ProjectItem {
        ProjectItem {
            project_id: id(1000),
            actor_id: id(500),
            zone_id: id(600),
            dialog_id: id(node),
            dialog_entry: Some(entry.iter().map(|s| s.to_string()).collect()),
            always_exec: Value::Null,
            statements: None,
            is_root: root,
            unknown_handler: false,
            parent_dialog_id: edge.map(|(p, _)| id(p)),
            child_dialog_id: edge.map(|(_, c)| id(c)),
        }
    }

    #[test]
    fn test_rows_are_deduplicated_and_linked() {
        // Child rows arrive before the parent's own row
        let rows = vec![
            row(2, Some((1, 2)), false, &["yes"]),
            row(2, Some((1, 2)), false, &["Yes!", "sure"]),
            row(1, Some((1, 2)), true, &["hello"]),
            row(1, Some((1, 3)), true, &["hello"]),
            row(3, Some((1, 3)), false, &["no"]),
        ];

        let graph = DialogGraph::build(&rows).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.roots(), &[id(1)]);

        let root = graph.node(&id(1)).unwrap();
        assert_eq!(root.child_nodes, vec![id(2), id(3)]);
        assert_eq!(root.entry_input, vec!["HELLO"]);

        let yes = graph.node(&id(2)).unwrap();
        assert_eq!(yes.parent_nodes, vec![id(1)]);
        assert_eq!(yes.entry_input, vec!["YES", "SURE"]);
        assert!(!yes.has_children());
    }

    #[test]
    fn test_shared_child_has_both_parents() {
        let rows = vec![
            row(1, Some((1, 3)), true, &[]),
            row(2, Some((2, 3)), true, &[]),
            row(3, Some((1, 3)), false, &["x"]),
            row(3, Some((2, 3)), false, &["x"]),
        ];
        let graph = DialogGraph::build(&rows).unwrap();
        assert_eq!(graph.node(&id(3)).unwrap().parent_nodes, vec![id(1), id(2)]);
        assert_eq!(graph.roots_by_actor(), vec![(id(500), vec![id(1), id(2)])]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let rows = vec![
            row(1, Some((1, 2)), true, &[]),
            row(2, Some((2, 3)), false, &[]),
            row(3, Some((3, 2)), false, &[]),
        ];
        assert!(matches!(DialogGraph::build(&rows), Err(CompileError::Cycle(_))));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let rows = vec![
            row(1, Some((1, 2)), true, &[]),
            row(1, Some((1, 3)), true, &[]),
            row(2, Some((2, 4)), false, &[]),
            row(3, Some((3, 4)), false, &[]),
            row(4, None, false, &[]),
        ];
        assert!(DialogGraph::build(&rows).is_ok());
    }

    #[test]
    fn test_dangling_edge_is_rejected() {
        let rows = vec![row(1, Some((1, 9)), true, &[])];
        assert!(matches!(
            DialogGraph::build(&rows),
            Err(CompileError::DanglingEdge { parent, child }) if parent == id(1) && child == id(9)
        ));
    }

    #[test]
    fn test_bad_logic_names_the_node() {
        let mut bad = row(1, None, true, &[]);
        bad.always_exec = serde_json::json!({ "Teleport": [] });
        match DialogGraph::build(&[bad]) {
            Err(CompileError::LogicDecode { owner, .. }) => assert!(owner.contains(&id(1).to_string())),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
