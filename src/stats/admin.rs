// 📈 Division Admin Stats - Programs, registrations and members per area

use crate::context::RequestContext;
use crate::entities::{ClusterWithPanchayath, Member, Panchayath, Program, Registration};
use crate::error::Result;
use crate::store::DataStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Registrations shown in the recent activity panel
pub const RECENT_REGISTRATION_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanchayathStats {
    pub id: String,
    pub name: String,
    pub registrations: u64,
    pub programs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub id: String,
    pub name: String,
    pub members: u64,
    pub panchayath_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentRegistration {
    pub id: String,
    pub program_name: String,
    pub registrant_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_programs: u64,
    pub active_programs: u64,
    pub total_registrations: u64,
    pub total_members: u64,
    pub panchayath_stats: Vec<PanchayathStats>,
    pub cluster_stats: Vec<ClusterStats>,
    pub recent_registrations: Vec<RecentRegistration>,
}

// ============================================================================
// PURE BUILDERS
// ============================================================================

/// Panchayath id → ids of the programs that apply to it.
///
/// A program applies to its own panchayath, or to every known panchayath when
/// flagged `all_panchayaths`. Each id appears at most once per panchayath.
pub fn map_programs_to_panchayaths(
    programs: &[Program],
    panchayaths: &[Panchayath],
) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();

    let mut add = |panchayath_id: &str, program_id: &str| {
        let ids = map.entry(panchayath_id.to_string()).or_default();
        if !ids.iter().any(|id| id == program_id) {
            ids.push(program_id.to_string());
        }
    };

    for program in programs {
        if program.all_panchayaths {
            for panchayath in panchayaths {
                add(&panchayath.id, &program.id);
            }
        } else if let Some(panchayath_id) = program.panchayath_id.as_deref() {
            add(panchayath_id, &program.id);
        }
    }

    map
}

fn count_by_program(registrations: &[Registration]) -> HashMap<&str, u64> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for registration in registrations {
        *counts.entry(registration.program_id.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Per-panchayath program and registration totals, busiest first.
/// Panchayaths with neither programs nor registrations are left out.
pub fn build_panchayath_stats(
    panchayaths: &[Panchayath],
    programs: &[Program],
    registrations: &[Registration],
) -> Vec<PanchayathStats> {
    let by_panchayath = map_programs_to_panchayaths(programs, panchayaths);
    let by_program = count_by_program(registrations);

    let mut stats: Vec<PanchayathStats> = panchayaths
        .iter()
        .filter_map(|panchayath| {
            let program_ids = by_panchayath.get(&panchayath.id).map(Vec::as_slice).unwrap_or(&[]);
            let registrations: u64 = program_ids
                .iter()
                .map(|id| by_program.get(id.as_str()).copied().unwrap_or(0))
                .sum();

            if program_ids.is_empty() && registrations == 0 {
                return None;
            }

            Some(PanchayathStats {
                id: panchayath.id.clone(),
                name: panchayath.name.clone(),
                registrations,
                programs: program_ids.len() as u64,
            })
        })
        .collect();

    // Stable: ties keep panchayath fetch order
    stats.sort_by(|a, b| b.registrations.cmp(&a.registrations));
    stats
}

/// Members per cluster, largest first. Empty clusters are left out.
pub fn build_cluster_stats(clusters: &[ClusterWithPanchayath], members: &[Member]) -> Vec<ClusterStats> {
    let mut by_cluster: HashMap<&str, u64> = HashMap::new();
    for member in members {
        if let Some(cluster_id) = member.cluster_id.as_deref() {
            *by_cluster.entry(cluster_id).or_insert(0) += 1;
        }
    }

    let mut stats: Vec<ClusterStats> = clusters
        .iter()
        .filter_map(|c| {
            let members = by_cluster.get(c.cluster.id.as_str()).copied().unwrap_or(0);
            (members > 0).then(|| ClusterStats {
                id: c.cluster.id.clone(),
                name: c.cluster.name.clone(),
                members,
                panchayath_name: c
                    .panchayath_name
                    .clone()
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| "Unknown".to_string()),
            })
        })
        .collect();

    stats.sort_by(|a, b| b.members.cmp(&a.members));
    stats
}

/// Distinct program ids among the newest registrations, first-seen order
fn recent_program_ids(recent: &[Registration]) -> Vec<String> {
    let mut seen = HashSet::new();
    recent
        .iter()
        .filter(|r| seen.insert(r.program_id.as_str()))
        .map(|r| r.program_id.clone())
        .collect()
}

/// Display rows for the newest registrations.
///
/// `registrations` must already be newest first; only the first
/// `RECENT_REGISTRATION_LIMIT` are used.
pub fn build_recent_registrations(
    registrations: &[Registration],
    program_names: &HashMap<String, String>,
) -> Vec<RecentRegistration> {
    registrations
        .iter()
        .take(RECENT_REGISTRATION_LIMIT)
        .map(|r| RecentRegistration {
            id: r.id.clone(),
            program_name: program_names
                .get(&r.program_id)
                .cloned()
                .unwrap_or_else(|| "Unknown Program".to_string()),
            registrant_name: r.answers.registrant_name(),
            created_at: r.created_at,
        })
        .collect()
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Dashboard stats for the divisions `ctx` may see.
pub async fn fetch_admin_stats(store: &dyn DataStore, ctx: &RequestContext) -> Result<AdminStats> {
    let Some(scope) = ctx.accessible_scope() else {
        debug!("No accessible divisions, returning empty stats");
        return Ok(AdminStats::default());
    };

    let (programs, members, panchayaths, clusters) = futures::try_join!(
        store.programs(&scope),
        store.members(&scope),
        store.active_panchayaths(),
        store.active_clusters(),
    )?;

    let program_ids: Vec<String> = programs.iter().map(|p| p.id.clone()).collect();
    let registrations = store.registrations(&program_ids).await?;

    let recent: Vec<Registration> = registrations
        .iter()
        .take(RECENT_REGISTRATION_LIMIT)
        .cloned()
        .collect();
    let program_names = store.program_names(&recent_program_ids(&recent)).await?;

    let stats = AdminStats {
        total_programs: programs.len() as u64,
        active_programs: programs.iter().filter(|p| p.is_active).count() as u64,
        total_registrations: registrations.len() as u64,
        total_members: members.len() as u64,
        panchayath_stats: build_panchayath_stats(&panchayaths, &programs, &registrations),
        cluster_stats: build_cluster_stats(&clusters, &members),
        recent_registrations: build_recent_registrations(&recent, &program_names),
    };

    info!(
        "Admin stats: {} programs, {} registrations, {} members",
        stats.total_programs, stats.total_registrations, stats.total_members
    );
    Ok(stats)
}
