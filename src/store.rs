// 🗄️ Data Access - The boundary to the hosted data store
//
// Everything above this trait works on fetched snapshots. Implementations
// return rows or a single error; they never retry.

use crate::context::DivisionScope;
use crate::entities::{
    AdminInfo, Agent, Cluster, ClusterPatch, ClusterWithPanchayath, ContentKind, Division,
    FormQuestion, Member, ModuleType, NewCluster, NewPanchayath, Panchayath, PanchayathPatch,
    Program, ProgramContent, ProgramListing, ProgramModule, ProgramUpdate, Registration,
};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Registration with its program's name (nested projection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationWithProgram {
    #[serde(flatten)]
    pub registration: Registration,
    pub program_name: Option<String>,
}

#[async_trait]
pub trait DataStore: Send + Sync {
    // ------------------------------------------------------------------
    // Programs
    // ------------------------------------------------------------------

    /// Programs visible under `scope`, newest first
    async fn programs(&self, scope: &DivisionScope) -> Result<Vec<Program>>;

    async fn program(&self, id: &str) -> Result<Option<Program>>;

    /// Batched id → name lookup
    async fn program_names(&self, ids: &[String]) -> Result<HashMap<String, String>>;

    /// Active programs with division, panchayath and modules, newest first
    async fn public_programs(&self) -> Result<Vec<ProgramListing>>;

    async fn update_program(&self, id: &str, update: &ProgramUpdate) -> Result<()>;

    async fn set_program_active(&self, id: &str, is_active: bool) -> Result<()>;

    /// Removes the program with its modules, content, questions and registrations
    async fn delete_program(&self, id: &str) -> Result<()>;

    // ------------------------------------------------------------------
    // Modules & content
    // ------------------------------------------------------------------

    async fn program_modules(&self, program_id: &str) -> Result<Vec<ProgramModule>>;

    async fn insert_program_module(&self, program_id: &str, module_type: ModuleType) -> Result<ProgramModule>;

    async fn delete_program_module(&self, module_id: &str) -> Result<()>;

    async fn set_module_published(&self, module_id: &str, is_published: bool) -> Result<()>;

    async fn program_content(&self, kind: ContentKind, program_id: &str) -> Result<Vec<ProgramContent>>;

    async fn insert_program_content(&self, content: &ProgramContent) -> Result<()>;

    async fn update_program_content(&self, content: &ProgramContent) -> Result<()>;

    async fn delete_program_content(&self, kind: ContentKind, id: &str) -> Result<()>;

    async fn set_content_published(&self, kind: ContentKind, id: &str, is_published: bool) -> Result<()>;

    // ------------------------------------------------------------------
    // Forms & registrations
    // ------------------------------------------------------------------

    async fn form_questions(&self, program_id: &str) -> Result<Vec<FormQuestion>>;

    /// Registrations for any of `program_ids`, newest first
    async fn registrations(&self, program_ids: &[String]) -> Result<Vec<Registration>>;

    /// Newest registrations across all programs
    async fn recent_registrations(&self, limit: usize) -> Result<Vec<RegistrationWithProgram>>;

    async fn count_registrations(&self) -> Result<u64>;

    async fn insert_registration(&self, registration: &Registration) -> Result<()>;

    // ------------------------------------------------------------------
    // Organization
    // ------------------------------------------------------------------

    async fn members(&self, scope: &DivisionScope) -> Result<Vec<Member>>;

    async fn active_panchayaths(&self) -> Result<Vec<Panchayath>>;

    async fn active_clusters(&self) -> Result<Vec<ClusterWithPanchayath>>;

    /// All divisions ordered by name
    async fn divisions(&self) -> Result<Vec<Division>>;

    /// Admins with division name and profile, newest first
    async fn admins(&self) -> Result<Vec<AdminInfo>>;

    async fn set_admin_active(&self, id: &str, is_active: bool) -> Result<()>;

    // ------------------------------------------------------------------
    // Locations (privileged proxy)
    // ------------------------------------------------------------------

    async fn list_panchayaths(&self) -> Result<Vec<Panchayath>>;

    async fn create_panchayath(&self, input: &NewPanchayath) -> Result<Panchayath>;

    async fn update_panchayath(&self, patch: &PanchayathPatch) -> Result<Panchayath>;

    async fn list_clusters(&self) -> Result<Vec<ClusterWithPanchayath>>;

    async fn create_cluster(&self, input: &NewCluster) -> Result<Cluster>;

    async fn update_cluster(&self, patch: &ClusterPatch) -> Result<Cluster>;

    // ------------------------------------------------------------------
    // Agents
    // ------------------------------------------------------------------

    /// All agents with panchayath name, in insertion order
    async fn agents(&self) -> Result<Vec<Agent>>;
}
