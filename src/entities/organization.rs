// 🏛️ Organization Entities - Lookups used for grouping and access scoping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Division {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panchayath {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub panchayath_id: Option<String>,
    pub is_active: bool,
}

/// Cluster with its panchayath's name (nested projection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterWithPanchayath {
    #[serde(flatten)]
    pub cluster: Cluster,
    pub panchayath_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub cluster_id: Option<String>,
    pub division_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admin {
    pub id: String,
    pub user_id: String,
    pub division_id: Option<String>,
    pub is_active: bool,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminProfile {
    pub full_name: Option<String>,
    pub email: String,
}

/// Admin with division name and profile, as listed on the super admin dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminInfo {
    #[serde(flatten)]
    pub admin: Admin,
    pub division_name: Option<String>,
    pub profile: Option<AdminProfile>,
}

// ============================================================================
// LOCATION INPUTS (admin-locations proxy bodies)
// ============================================================================

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewPanchayath {
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PanchayathPatch {
    pub id: String,
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewCluster {
    pub name: String,
    pub panchayath_id: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterPatch {
    pub id: String,
    pub name: Option<String>,
    pub panchayath_id: Option<String>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_panchayath_defaults_active() {
        let input: NewPanchayath = serde_json::from_value(json!({"name": "Kodur"})).unwrap();
        assert!(input.is_active);
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let result: Result<ClusterPatch, _> =
            serde_json::from_value(json!({"id": "c1", "color": "red"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_cluster_flattened_serialization() {
        let cluster = ClusterWithPanchayath {
            cluster: Cluster {
                id: "c1".into(),
                name: "North".into(),
                panchayath_id: Some("p1".into()),
                is_active: true,
            },
            panchayath_name: Some("Kodur".into()),
        };
        let value = serde_json::to_value(&cluster).unwrap();
        assert_eq!(value["name"], "North");
        assert_eq!(value["panchayath_name"], "Kodur");
    }
}
