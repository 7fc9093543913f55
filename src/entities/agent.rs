// 🧑‍🤝‍🧑 Agent Entity - Pennyekart field agents
//
// Agents form a reporting chain team_leader → coordinator → group_leader → pro
// through a self-referential parent pointer. Only pro agents own customers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    TeamLeader,
    Coordinator,
    GroupLeader,
    Pro,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::TeamLeader => "team_leader",
            AgentRole::Coordinator => "coordinator",
            AgentRole::GroupLeader => "group_leader",
            AgentRole::Pro => "pro",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgentRole::TeamLeader => "Team Leader",
            AgentRole::Coordinator => "Coordinator",
            AgentRole::GroupLeader => "Group Leader",
            AgentRole::Pro => "PRO",
        }
    }

    /// Top of the reporting chain
    pub fn is_root(&self) -> bool {
        matches!(self, AgentRole::TeamLeader)
    }

    /// Customer counts live on this role only
    pub fn is_leaf(&self) -> bool {
        matches!(self, AgentRole::Pro)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "team_leader" => Ok(AgentRole::TeamLeader),
            "coordinator" => Ok(AgentRole::Coordinator),
            "group_leader" => Ok(AgentRole::GroupLeader),
            "pro" => Ok(AgentRole::Pro),
            other => Err(format!("Unknown agent role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub mobile: String,
    pub role: AgentRole,
    pub parent_agent_id: Option<String>,
    pub panchayath_id: Option<String>,

    /// Nested projection of the panchayath's name
    pub panchayath_name: Option<String>,

    pub ward: String,

    /// Meaningful only for pro agents
    pub customer_count: u64,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Grouping key for the hierarchy view
    pub fn panchayath_display_name(&self) -> &str {
        match self.panchayath_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => "Unknown Panchayath",
        }
    }
}
