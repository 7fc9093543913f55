// Division Admin - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod context;
pub mod db;
pub mod entities;
pub mod error;
pub mod export;
pub mod hierarchy;
pub mod programs;
pub mod proxy;
pub mod stats;
pub mod store;
pub mod token;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::Config;
pub use context::{AdminRole, DivisionScope, RequestContext};
pub use db::{
    import_agents, import_divisions, import_panchayaths, import_programs, load_csv, setup_database,
    AgentRecord, DivisionRecord, PanchayathRecord, ProgramRecord, SqliteStore,
};
pub use error::{AdminError, Result};
pub use export::ExportTable;
pub use hierarchy::{build_forest, AgentNode, PanchayathGroup, TreeRow, TreeView};
pub use proxy::{AdminProxy, ProxyRequest, ProxyResponse};
pub use stats::{fetch_admin_stats, fetch_super_admin_stats, AdminStats, LoadState, StatsTracker, SuperAdminStats};
pub use store::DataStore;
pub use token::{AdminClaims, AdminTokenSigner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
