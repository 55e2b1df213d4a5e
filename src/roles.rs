//! Role resolution: one-shot at startup, three terminal states.
//!
//! Staff admins get a fixed data scope (their own registry record id).
//! Super users must pick an establishment before any data loads - that is
//! a suspended state, not an error. Neither lookup succeeding is terminal:
//! the dashboard renders a fixed message and issues no further fetches.

use crate::error::ApiResult;
use crate::fields::{
    STAFF_ADMIN_EMAIL_FIELD, STAFF_ADMIN_OBJECT, SUPER_USER_EMAIL_FIELD, SUPER_USER_OBJECT,
};
use crate::filters::FilterCriterion;
use crate::gateway::{DashboardApi, RecordQuery};
use crate::logging::{json_log, obj, v_str};
use crate::model::{Cycle, DashboardScope};

pub const UNAUTHORIZED_MESSAGE: &str =
    "No dashboard access is configured for this account. Contact your administrator.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    StaffAdmin { record_id: String },
    /// `establishment_id` stays `None` until the selection step completes.
    SuperUser { record_id: String, establishment_id: Option<String> },
    Unauthorized,
}

impl Role {
    pub fn kind(&self) -> &'static str {
        match self {
            Role::StaffAdmin { .. } => "staff_admin",
            Role::SuperUser { .. } => "super_user",
            Role::Unauthorized => "unauthorized",
        }
    }

    /// Super-user establishment selection. A no-op for other roles.
    pub fn with_establishment(self, establishment_id: impl Into<String>) -> Role {
        match self {
            Role::SuperUser { record_id, .. } => Role::SuperUser {
                record_id,
                establishment_id: Some(establishment_id.into()),
            },
            other => other,
        }
    }

    /// The data partition this role may load, or `None` while no partition
    /// is available (unauthorized, or super user still awaiting selection).
    pub fn data_scope(&self, cycle: Cycle, filters: Vec<FilterCriterion>) -> Option<DashboardScope> {
        match self {
            Role::StaffAdmin { record_id } => {
                Some(DashboardScope::for_staff_admin(cycle, record_id.clone()).with_filters(filters))
            }
            Role::SuperUser { establishment_id: Some(est), .. } => {
                Some(DashboardScope::for_establishment(cycle, est.clone()).with_filters(filters))
            }
            _ => None,
        }
    }

    pub fn awaiting_establishment(&self) -> bool {
        matches!(self, Role::SuperUser { establishment_id: None, .. })
    }
}

pub struct RoleResolver<'a> {
    api: &'a dyn DashboardApi,
}

impl<'a> RoleResolver<'a> {
    pub fn new(api: &'a dyn DashboardApi) -> Self {
        RoleResolver { api }
    }

    /// Email lookup against the staff-admin registry, then the super-user
    /// registry. Deterministic within a session: same email, same record
    /// id. Gateway failures propagate - an unreachable registry is not the
    /// same thing as an unauthorized user.
    pub async fn resolve(&self, email: &str) -> ApiResult<Role> {
        let staff_query =
            RecordQuery::matching_email(STAFF_ADMIN_OBJECT, STAFF_ADMIN_EMAIL_FIELD, email);
        let staff = self.api.fetch_records(&staff_query).await?;
        if let Some(record) = staff.first() {
            json_log(
                "roles",
                obj(&[("resolved", v_str("staff_admin")), ("record_id", v_str(&record.id))]),
            );
            return Ok(Role::StaffAdmin { record_id: record.id.clone() });
        }

        let super_query =
            RecordQuery::matching_email(SUPER_USER_OBJECT, SUPER_USER_EMAIL_FIELD, email);
        let supers = self.api.fetch_records(&super_query).await?;
        if let Some(record) = supers.first() {
            json_log(
                "roles",
                obj(&[("resolved", v_str("super_user")), ("record_id", v_str(&record.id))]),
            );
            return Ok(Role::SuperUser { record_id: record.id.clone(), establishment_id: None });
        }

        json_log("roles", obj(&[("resolved", v_str("unauthorized"))]));
        Ok(Role::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, ApiResult};
    use crate::model::{
        BatchPayload, EstablishmentList, InterrogationQuestion, NationalEri, QuestionMappings,
        Record, SchoolEri,
    };
    use async_trait::async_trait;
    use serde_json::Value;

    /// Registry stub: staff-admin and super-user lookups answered from
    /// fixed lists, everything else unreachable.
    struct RegistryStub {
        staff_admins: Vec<(String, String)>, // (email, record id)
        super_users: Vec<(String, String)>,
    }

    #[async_trait]
    impl DashboardApi for RegistryStub {
        async fn fetch_batch(&self, _scope: &DashboardScope) -> ApiResult<BatchPayload> {
            Err(ApiError::Network("not wired".into()))
        }

        async fn fetch_records(&self, query: &RecordQuery) -> ApiResult<Vec<Record>> {
            let wanted = query.filters.first().map(|f| f.value.clone()).unwrap_or_default();
            let pool = match query.object_key.as_str() {
                STAFF_ADMIN_OBJECT => &self.staff_admins,
                SUPER_USER_OBJECT => &self.super_users,
                _ => return Ok(Vec::new()),
            };
            Ok(pool
                .iter()
                .filter(|(email, _)| email.eq_ignore_ascii_case(&wanted))
                .map(|(_, id)| Record::new(id.clone()))
                .collect())
        }

        async fn fetch_establishments(&self) -> ApiResult<EstablishmentList> {
            Err(ApiError::Network("not wired".into()))
        }

        async fn fetch_school_eri(&self, _scope: &DashboardScope) -> ApiResult<SchoolEri> {
            Err(ApiError::Network("not wired".into()))
        }

        async fn fetch_national_eri(&self, _cycle: Cycle) -> ApiResult<NationalEri> {
            Err(ApiError::Network("not wired".into()))
        }

        async fn fetch_question_mappings(&self) -> ApiResult<QuestionMappings> {
            Err(ApiError::Network("not wired".into()))
        }

        async fn fetch_interrogation_questions(&self) -> ApiResult<Vec<InterrogationQuestion>> {
            Err(ApiError::Network("not wired".into()))
        }

        async fn qla_chat(&self, _query: &str, _data: &Value) -> ApiResult<String> {
            Err(ApiError::Network("not wired".into()))
        }
    }

    fn registry() -> RegistryStub {
        RegistryStub {
            staff_admins: vec![("admin@school.example".to_string(), "sa-rec-1".to_string())],
            super_users: vec![("regional@trust.example".to_string(), "su-rec-9".to_string())],
        }
    }

    #[tokio::test]
    async fn test_staff_admin_wins_and_is_deterministic() {
        let api = registry();
        let resolver = RoleResolver::new(&api);
        let first = resolver.resolve("admin@school.example").await.unwrap();
        let second = resolver.resolve("admin@school.example").await.unwrap();
        assert_eq!(first, Role::StaffAdmin { record_id: "sa-rec-1".to_string() });
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_super_user_starts_suspended() {
        let api = registry();
        let resolver = RoleResolver::new(&api);
        let role = resolver.resolve("regional@trust.example").await.unwrap();
        assert!(role.awaiting_establishment());
        assert!(role.data_scope(Cycle::One, Vec::new()).is_none());

        let selected = role.with_establishment("est-42");
        let scope = selected.data_scope(Cycle::One, Vec::new()).unwrap();
        assert_eq!(scope.establishment_id.as_deref(), Some("est-42"));
        assert_eq!(scope.staff_admin_id, None);
    }

    #[tokio::test]
    async fn test_unknown_email_is_unauthorized() {
        let api = registry();
        let resolver = RoleResolver::new(&api);
        let role = resolver.resolve("stranger@nowhere.example").await.unwrap();
        assert_eq!(role, Role::Unauthorized);
        assert!(role.data_scope(Cycle::One, Vec::new()).is_none());
    }

    #[tokio::test]
    async fn test_staff_admin_scope_uses_record_id() {
        let api = registry();
        let resolver = RoleResolver::new(&api);
        let role = resolver.resolve("admin@school.example").await.unwrap();
        let scope = role.data_scope(Cycle::Two, Vec::new()).unwrap();
        assert_eq!(scope.staff_admin_id.as_deref(), Some("sa-rec-1"));
        assert_eq!(scope.establishment_id, None);
        assert!(scope.validate().is_ok());
    }
}
