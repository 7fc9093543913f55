// 🌐 Super Admin Stats - Platform-wide totals and activity feed

use crate::context::DivisionScope;
use crate::entities::{AdminInfo, Division, Member, Program};
use crate::error::Result;
use crate::store::{DataStore, RegistrationWithProgram};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Entries of each kind fed into the activity feed
const RECENT_PER_KIND: usize = 5;

/// Total entries in the merged activity feed
pub const RECENT_ACTIVITY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Registration,
    Program,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentActivity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivisionInfo {
    #[serde(flatten)]
    pub division: Division,
    pub program_count: u64,
    pub member_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuperAdminStats {
    pub total_admins: u64,
    pub active_admins: u64,
    pub total_divisions: u64,
    pub active_divisions: u64,
    pub total_programs: u64,
    pub active_programs: u64,
    pub total_registrations: u64,
    pub total_members: u64,
    pub admins: Vec<AdminInfo>,
    pub divisions: Vec<DivisionInfo>,
    pub recent_activity: Vec<RecentActivity>,
}

/// Divisions with program and member counts tallied from the fetched rows
pub fn build_division_info(divisions: &[Division], programs: &[Program], members: &[Member]) -> Vec<DivisionInfo> {
    let mut program_counts: HashMap<&str, u64> = HashMap::new();
    for division_id in programs.iter().filter_map(|p| p.division_id.as_deref()) {
        *program_counts.entry(division_id).or_insert(0) += 1;
    }

    let mut member_counts: HashMap<&str, u64> = HashMap::new();
    for division_id in members.iter().filter_map(|m| m.division_id.as_deref()) {
        *member_counts.entry(division_id).or_insert(0) += 1;
    }

    divisions
        .iter()
        .map(|division| DivisionInfo {
            program_count: program_counts.get(division.id.as_str()).copied().unwrap_or(0),
            member_count: member_counts.get(division.id.as_str()).copied().unwrap_or(0),
            division: division.clone(),
        })
        .collect()
}

/// Merge the newest registrations and programs into one feed, newest first.
///
/// Both inputs are expected newest first.
pub fn build_recent_activity(
    registrations: &[RegistrationWithProgram],
    programs: &[Program],
) -> Vec<RecentActivity> {
    let registrations = registrations.iter().take(RECENT_PER_KIND).map(|r| RecentActivity {
        id: r.registration.id.clone(),
        kind: ActivityKind::Registration,
        description: format!(
            "New registration for \"{}\"",
            r.program_name.as_deref().unwrap_or("Unknown Program")
        ),
        timestamp: r.registration.created_at,
    });

    let programs = programs.iter().take(RECENT_PER_KIND).map(|p| RecentActivity {
        id: p.id.clone(),
        kind: ActivityKind::Program,
        description: format!("Program \"{}\" was created", p.name),
        timestamp: p.created_at,
    });

    let mut activity: Vec<RecentActivity> = registrations.chain(programs).collect();
    activity.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    activity.truncate(RECENT_ACTIVITY_LIMIT);
    activity
}

pub async fn fetch_super_admin_stats(store: &dyn DataStore) -> Result<SuperAdminStats> {
    let scope = DivisionScope::Unrestricted;

    let (admins, divisions, programs, members, total_registrations, recent) = futures::try_join!(
        store.admins(),
        store.divisions(),
        store.programs(&scope),
        store.members(&scope),
        store.count_registrations(),
        store.recent_registrations(RECENT_PER_KIND),
    )?;

    let division_info = build_division_info(&divisions, &programs, &members);

    let stats = SuperAdminStats {
        total_admins: admins.len() as u64,
        active_admins: admins.iter().filter(|a| a.admin.is_active).count() as u64,
        total_divisions: division_info.len() as u64,
        active_divisions: division_info.iter().filter(|d| d.division.is_active).count() as u64,
        total_programs: programs.len() as u64,
        active_programs: programs.iter().filter(|p| p.is_active).count() as u64,
        total_registrations,
        total_members: members.len() as u64,
        recent_activity: build_recent_activity(&recent, &programs),
        admins,
        divisions: division_info,
    };

    info!(
        "Super admin stats: {} admins, {} divisions, {} programs",
        stats.total_admins, stats.total_divisions, stats.total_programs
    );
    Ok(stats)
}

/// Flip an admin's active flag; callers refetch afterwards
pub async fn toggle_admin_status(store: &dyn DataStore, admin_id: &str, currently_active: bool) -> Result<()> {
    store.set_admin_active(admin_id, !currently_active).await?;
    info!("Admin {} is now {}", admin_id, if currently_active { "inactive" } else { "active" });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{at, program, registration};
    use crate::db::SqliteStore;
    use crate::entities::{Admin, AdminProfile};
    use serde_json::json;

    fn division(id: &str, name: &str, active: bool) -> Division {
        Division {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            is_active: active,
        }
    }

    #[test]
    fn test_recent_activity_merged_and_capped() {
        let registrations: Vec<RegistrationWithProgram> = (0..5)
            .map(|i| RegistrationWithProgram {
                registration: registration(&format!("r{}", i), "a", json!({}), 50 - i * 2),
                program_name: if i == 0 { None } else { Some("Farm".to_string()) },
            })
            .collect();
        let programs: Vec<crate::entities::Program> = (0..7)
            .map(|i| program(&format!("p{}", i), "d1", None, false, 49 - i * 2))
            .collect();

        let activity = build_recent_activity(&registrations, &programs);
        assert_eq!(activity.len(), RECENT_ACTIVITY_LIMIT);
        assert_eq!(activity[0].description, "New registration for \"Unknown Program\"");
        assert_eq!(activity[1].description, "Program \"Program p0\" was created");
        assert_eq!(activity[1].kind, ActivityKind::Program);
        assert!(activity.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        // Programs beyond the fifth never enter the feed
        assert!(activity.iter().all(|a| a.id != "p5" && a.id != "p6"));
    }

    #[test]
    fn test_division_info_counts() {
        let divisions = vec![division("d1", "Alpha", true), division("d2", "Beta", false)];
        let programs = vec![
            program("a", "d1", None, false, 1),
            program("b", "d1", None, false, 2),
        ];
        let members = vec![Member { id: "m1".into(), cluster_id: None, division_id: Some("d2".into()) }];

        let info = build_division_info(&divisions, &programs, &members);
        assert_eq!(info[0].program_count, 2);
        assert_eq!(info[0].member_count, 0);
        assert_eq!(info[1].member_count, 1);
    }

    #[tokio::test]
    async fn test_fetch_and_toggle() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_division(&division("d1", "Alpha", true)).unwrap();
        store.insert_division(&division("d2", "Beta", false)).unwrap();
        store
            .insert_admin(
                &Admin {
                    id: "adm1".into(),
                    user_id: "u1".into(),
                    division_id: Some("d1".into()),
                    is_active: true,
                    phone: None,
                    created_at: at(1),
                },
                Some(&AdminProfile { full_name: Some("Ravi".into()), email: "ravi@example.org".into() }),
            )
            .unwrap();
        store.insert_program(&program("a", "d1", None, false, 2)).unwrap();
        store
            .insert_registration(&registration("r1", "a", json!({}), 3))
            .await
            .unwrap();

        let stats = fetch_super_admin_stats(&store).await.unwrap();
        assert_eq!(stats.total_admins, 1);
        assert_eq!(stats.active_admins, 1);
        assert_eq!(stats.total_divisions, 2);
        assert_eq!(stats.active_divisions, 1);
        assert_eq!(stats.total_registrations, 1);
        assert_eq!(stats.admins[0].division_name.as_deref(), Some("Alpha"));
        assert_eq!(stats.recent_activity.len(), 2);
        assert_eq!(stats.recent_activity[0].description, "New registration for \"Program a\"");

        toggle_admin_status(&store, "adm1", true).await.unwrap();
        let stats = fetch_super_admin_stats(&store).await.unwrap();
        assert_eq!(stats.active_admins, 0);
    }
}
