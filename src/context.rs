// 🔐 Request Context - Who is asking, and which divisions they may see
//
// Passed explicitly to every aggregation and query; nothing reads auth state
// from globals.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    SuperAdmin,
    DivisionAdmin,
    Member,
}

impl AdminRole {
    pub fn label(&self) -> &'static str {
        match self {
            AdminRole::SuperAdmin => "Super Admin",
            AdminRole::DivisionAdmin => "Admin",
            AdminRole::Member => "Member",
        }
    }
}

// ============================================================================
// DIVISION SCOPE
// ============================================================================

/// Row filter derived from the caller's accessible divisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DivisionScope {
    /// No division filter
    Unrestricted,

    /// Only rows whose division is in this set
    Divisions(Vec<String>),
}

impl DivisionScope {
    /// An empty id set means unrestricted access
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        ids.sort();
        ids.dedup();

        if ids.is_empty() {
            DivisionScope::Unrestricted
        } else {
            DivisionScope::Divisions(ids)
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, DivisionScope::Unrestricted)
    }

    pub fn allows(&self, division_id: Option<&str>) -> bool {
        match self {
            DivisionScope::Unrestricted => true,
            DivisionScope::Divisions(ids) => {
                division_id.map(|d| ids.iter().any(|id| id == d)).unwrap_or(false)
            }
        }
    }
}

// ============================================================================
// REQUEST CONTEXT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub role: AdminRole,

    /// Admin's home division
    pub division_id: Option<String>,

    /// Extra divisions granted to this admin
    #[serde(default)]
    pub additional_division_ids: Vec<String>,

    /// Admin may see every division
    #[serde(default)]
    pub access_all_divisions: bool,

    /// Admin token the request was authenticated with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl RequestContext {
    pub fn super_admin() -> Self {
        RequestContext {
            role: AdminRole::SuperAdmin,
            division_id: None,
            additional_division_ids: Vec::new(),
            access_all_divisions: false,
            token: None,
        }
    }

    pub fn division_admin(division_id: impl Into<String>) -> Self {
        RequestContext {
            role: AdminRole::DivisionAdmin,
            division_id: Some(division_id.into()),
            additional_division_ids: Vec::new(),
            access_all_divisions: false,
            token: None,
        }
    }

    pub fn member() -> Self {
        RequestContext {
            role: AdminRole::Member,
            division_id: None,
            additional_division_ids: Vec::new(),
            access_all_divisions: false,
            token: None,
        }
    }

    pub fn with_additional_divisions<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_division_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_access_all(mut self, access_all: bool) -> Self {
        self.access_all_divisions = access_all;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == AdminRole::SuperAdmin
    }

    /// Divisions this caller may aggregate over.
    ///
    /// `None` means the caller has no division and no unrestricted access,
    /// so there is nothing to show.
    pub fn accessible_scope(&self) -> Option<DivisionScope> {
        if self.is_super_admin() || self.access_all_divisions {
            return Some(DivisionScope::Unrestricted);
        }

        let home = self.division_id.as_ref()?;
        let ids = std::iter::once(home.clone()).chain(self.additional_division_ids.iter().cloned());
        Some(DivisionScope::from_ids(ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_admin_is_unrestricted() {
        assert_eq!(
            RequestContext::super_admin().accessible_scope(),
            Some(DivisionScope::Unrestricted)
        );
    }

    #[test]
    fn test_access_all_is_unrestricted() {
        let ctx = RequestContext::division_admin("d1").with_access_all(true);
        assert_eq!(ctx.accessible_scope(), Some(DivisionScope::Unrestricted));
    }

    #[test]
    fn test_division_admin_with_additional() {
        let ctx = RequestContext::division_admin("d2").with_additional_divisions(["d1", "d2"]);
        assert_eq!(
            ctx.accessible_scope(),
            Some(DivisionScope::Divisions(vec!["d1".to_string(), "d2".to_string()]))
        );
    }

    #[test]
    fn test_member_without_division_has_no_scope() {
        assert_eq!(RequestContext::member().accessible_scope(), None);
    }

    #[test]
    fn test_empty_ids_mean_unrestricted() {
        assert!(DivisionScope::from_ids(Vec::<String>::new()).is_unrestricted());
    }

    #[test]
    fn test_scope_allows() {
        let scope = DivisionScope::from_ids(["d1"]);
        assert!(scope.allows(Some("d1")));
        assert!(!scope.allows(Some("d2")));
        assert!(!scope.allows(None));
        assert!(DivisionScope::Unrestricted.allows(None));
    }
}
