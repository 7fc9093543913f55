// 🌳 Agent Hierarchy - Cycle-safe forest of agents per panchayath
//
// Agents are grouped by panchayath name, rooted at team leaders and expanded
// through a parent id → children index. Parent pointers come from user data,
// so cycles and dangling references are expected and tolerated.

use crate::entities::{Agent, AgentRole};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentNode {
    pub agent: Agent,
    pub depth: usize,

    /// Pro: own customers. Others: sum over the subtree.
    pub total_customers: u64,

    pub children: Vec<AgentNode>,
}

impl AgentNode {
    /// Number of nodes in this subtree, self included
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(AgentNode::size).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanchayathGroup {
    pub name: String,
    pub agent_count: usize,
    pub roots: Vec<AgentNode>,
}

impl PanchayathGroup {
    pub fn node_count(&self) -> usize {
        self.roots.iter().map(AgentNode::size).sum()
    }
}

// ============================================================================
// GROUP ARENA
// ============================================================================

/// One panchayath's agents plus the parent → children adjacency
struct Arena<'a> {
    agents: Vec<&'a Agent>,
    children: HashMap<&'a str, Vec<usize>>,
}

impl<'a> Arena<'a> {
    fn new(agents: Vec<&'a Agent>) -> Self {
        let mut children: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (idx, agent) in agents.iter().enumerate() {
            if let Some(parent) = agent.parent_agent_id.as_deref() {
                children.entry(parent).or_default().push(idx);
            }
        }
        Arena { agents, children }
    }

    fn children_of(&self, idx: usize) -> &[usize] {
        self.children
            .get(self.agents[idx].id.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn roots(&self) -> Vec<usize> {
        let leaders: Vec<usize> = (0..self.agents.len())
            .filter(|&idx| self.agents[idx].role.is_root())
            .collect();

        if leaders.is_empty() {
            // No team leader: show every agent at the top level
            (0..self.agents.len()).collect()
        } else {
            leaders
        }
    }

    /// `path` holds the ids of every ancestor of `idx`
    fn build_node(&self, idx: usize, depth: usize, path: &mut HashSet<&'a str>) -> AgentNode {
        let agent = self.agents[idx];

        path.insert(agent.id.as_str());
        let visible: Vec<usize> = self
            .children_of(idx)
            .iter()
            .copied()
            .filter(|&child| {
                let child_id = self.agents[child].id.as_str();
                child_id != agent.id && !path.contains(child_id)
            })
            .collect();
        let children = visible
            .into_iter()
            .map(|child| self.build_node(child, depth + 1, path))
            .collect();
        path.remove(agent.id.as_str());

        AgentNode {
            agent: agent.clone(),
            depth,
            total_customers: self.total_customers(idx),
            children,
        }
    }

    fn total_customers(&self, idx: usize) -> u64 {
        let mut visited = HashSet::new();
        self.sum_customers(idx, &mut visited)
    }

    fn sum_customers(&self, idx: usize, visited: &mut HashSet<&'a str>) -> u64 {
        let agent = self.agents[idx];
        if !visited.insert(agent.id.as_str()) {
            return 0;
        }

        if agent.role == AgentRole::Pro {
            return agent.customer_count;
        }

        self.children_of(idx)
            .iter()
            .map(|&child| self.sum_customers(child, visited))
            .sum()
    }
}

// ============================================================================
// FOREST
// ============================================================================

/// Build one tree group per panchayath, groups in first-seen order.
pub fn build_forest(agents: &[Agent]) -> Vec<PanchayathGroup> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&Agent>> = HashMap::new();

    for agent in agents {
        let name = agent.panchayath_display_name();
        groups
            .entry(name)
            .or_insert_with(|| {
                order.push(name);
                Vec::new()
            })
            .push(agent);
    }

    order
        .into_iter()
        .filter_map(|name| groups.remove(name).map(|members| (name, members)))
        .map(|(name, members)| {
            let agent_count = members.len();
            let arena = Arena::new(members);
            let mut path = HashSet::new();
            let roots = arena
                .roots()
                .into_iter()
                .map(|idx| arena.build_node(idx, 0, &mut path))
                .collect();

            PanchayathGroup {
                name: name.to_string(),
                agent_count,
                roots,
            }
        })
        .collect()
}

// ============================================================================
// TREE VIEW (expand / collapse)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKind {
    Panchayath { agent_count: usize },
    Agent { role: AgentRole, mobile: String, ward: String },
}

/// One visible line of the flattened tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    /// Path of ids from the panchayath down to this row; the same agent
    /// reached twice gets two keys
    pub key: String,
    pub depth: usize,
    pub label: String,
    pub kind: RowKind,

    /// Badge value: own customers for pro, subtree total otherwise
    pub customers: Option<u64>,

    pub has_children: bool,
    pub expanded: bool,
}

impl TreeRow {
    /// Ward tag, hidden for the "N/A" placeholder
    pub fn ward_tag(&self) -> Option<String> {
        match &self.kind {
            RowKind::Agent { ward, .. } if !ward.is_empty() && ward != "N/A" => Some(format!("W{}", ward)),
            _ => None,
        }
    }
}

/// Expansion state over a forest; everything starts expanded
#[derive(Debug, Clone, Default)]
pub struct TreeView {
    collapsed: HashSet<String>,
}

pub fn panchayath_key(name: &str) -> String {
    format!("panchayath:{}", name)
}

impl TreeView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_expanded(&self, key: &str) -> bool {
        !self.collapsed.contains(key)
    }

    pub fn toggle(&mut self, key: &str) {
        if !self.collapsed.remove(key) {
            self.collapsed.insert(key.to_string());
        }
    }

    pub fn collapse_all(&mut self, forest: &[PanchayathGroup]) {
        for group in forest {
            self.collapsed.insert(panchayath_key(&group.name));
        }
    }

    pub fn expand_all(&mut self) {
        self.collapsed.clear();
    }

    /// Visible rows in display order
    pub fn rows(&self, forest: &[PanchayathGroup]) -> Vec<TreeRow> {
        let mut rows = Vec::new();

        for group in forest {
            let key = panchayath_key(&group.name);
            let expanded = self.is_expanded(&key);
            rows.push(TreeRow {
                key: key.clone(),
                depth: 0,
                label: group.name.clone(),
                kind: RowKind::Panchayath {
                    agent_count: group.agent_count,
                },
                customers: None,
                has_children: !group.roots.is_empty(),
                expanded,
            });

            if expanded {
                for root in &group.roots {
                    self.push_agent_rows(root, &key, 1, &mut rows);
                }
            }
        }

        rows
    }

    fn push_agent_rows(&self, node: &AgentNode, parent_key: &str, depth: usize, rows: &mut Vec<TreeRow>) {
        let key = format!("{}/{}", parent_key, node.agent.id);
        let expanded = self.is_expanded(&key);
        let customers = if node.agent.role.is_leaf() {
            Some(node.agent.customer_count)
        } else {
            Some(node.total_customers).filter(|&total| total > 0)
        };

        rows.push(TreeRow {
            key: key.clone(),
            depth,
            label: node.agent.name.clone(),
            kind: RowKind::Agent {
                role: node.agent.role,
                mobile: node.agent.mobile.clone(),
                ward: node.agent.ward.clone(),
            },
            customers,
            has_children: !node.children.is_empty(),
            expanded,
        });

        if expanded {
            for child in &node.children {
                self.push_agent_rows(child, &key, depth + 1, rows);
            }
        }
    }
}
