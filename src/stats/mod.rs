// 📊 Statistics - Role-scoped dashboard aggregation
//
// Each aggregator issues its independent fetches concurrently, then groups the
// snapshots in memory. Any fetch failure aborts the whole aggregation.

pub mod admin;
pub mod super_admin;
pub mod tracker;

pub use admin::{
    build_cluster_stats, build_panchayath_stats, build_recent_registrations, fetch_admin_stats,
    map_programs_to_panchayaths, AdminStats, ClusterStats, PanchayathStats, RecentRegistration,
    RECENT_REGISTRATION_LIMIT,
};
pub use super_admin::{
    build_division_info, build_recent_activity, fetch_super_admin_stats, toggle_admin_status,
    ActivityKind, DivisionInfo, RecentActivity, SuperAdminStats, RECENT_ACTIVITY_LIMIT,
};
pub use tracker::{LoadState, StatsTracker, Ticket};
