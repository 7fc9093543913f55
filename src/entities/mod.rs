// Entity Models
// Read-only snapshots of rows owned by the data store. This crate shapes
// views over them; it never owns their lifecycle.

pub mod agent;
pub mod organization;
pub mod program;
pub mod registration;

pub use agent::{Agent, AgentRole};
pub use organization::{
    Admin, AdminInfo, AdminProfile, Cluster, ClusterPatch, ClusterWithPanchayath, Division,
    Member, NewCluster, NewPanchayath, Panchayath, PanchayathPatch,
};
pub use program::{
    ContentInput, ContentKind, FormQuestion, ModuleType, Program, ProgramContent,
    ProgramListing, ProgramModule, ProgramUpdate,
};
pub use registration::{AnswerValue, FixedAnswers, FixedField, Registration, RegistrationAnswers};
