//! The resolved per-principal snapshot (`AuthInfo`) and the two synthetic
//! pseudo-principals that never touch the rule store.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::rule::{
    AssetGrants, DataGrants, GlobalGrants, PageGrants, PathMode, Rule, RuleDetail, RulePath,
};
use crate::models::role::Role;
use crate::models::user::UserRecord;

/// Login of the unauthenticated pseudo-principal: public read of published
/// content only, no asset or data access.
pub const ANONYMOUS_LOGIN: &str = "anonymous";

/// Login of the server-side rendering pseudo-principal: sees the latest
/// draft of pages and data and reads the full asset tree, without being a
/// real user.
pub const RENDER_LOGIN: &str = "render";

pub fn is_pseudo_login(login: &str) -> bool {
    login == ANONYMOUS_LOGIN || login == RENDER_LOGIN
}

/// One principal's resolved rule/role/group snapshot. Effectively immutable
/// once built; shared between requests behind an `Arc` and recomputed when
/// the cache freshness window lapses or a mutation invalidates it.
#[derive(Debug, Clone, Serialize)]
pub struct AuthInfo {
    pub login: String,
    pub user: Option<UserRecord>,
    pub roles: Vec<Role>,
    pub groups: Vec<String>,
    /// Global grants pre-reduced with OR: global rules have no scope to
    /// distinguish them, so only the merged record is kept.
    pub global: GlobalGrants,
    pub site_rules: Vec<Rule>,
    pub template_rules: Vec<Rule>,
    pub page_rules: Vec<Rule>,
    pub asset_rules: Vec<Rule>,
    pub data_rules: Vec<Rule>,
}

impl AuthInfo {
    pub fn empty(login: impl Into<String>) -> Self {
        AuthInfo {
            login: login.into(),
            user: None,
            roles: Vec::new(),
            groups: Vec::new(),
            global: GlobalGrants::default(),
            site_rules: Vec::new(),
            template_rules: Vec::new(),
            page_rules: Vec::new(),
            asset_rules: Vec::new(),
            data_rules: Vec::new(),
        }
    }

    pub fn role_ids(&self) -> Vec<Uuid> {
        self.roles.iter().map(|r| r.id).collect()
    }

    pub fn holds_role(&self, role_id: Uuid) -> bool {
        self.roles.iter().any(|r| r.id == role_id)
    }

    /// Rules of the same kind as `detail`, for the escalation guard.
    /// Global rules are pre-merged into `global`, so the slice is empty
    /// for that kind and the guard special-cases it.
    pub fn rules_of_kind(&self, detail: &RuleDetail) -> &[Rule] {
        match detail {
            RuleDetail::Global { .. } => &[],
            RuleDetail::Site { .. } => &self.site_rules,
            RuleDetail::Template { .. } => &self.template_rules,
            RuleDetail::Page { .. } => &self.page_rules,
            RuleDetail::Asset { .. } => &self.asset_rules,
            RuleDetail::Data { .. } => &self.data_rules,
        }
    }

    /// The anonymous pseudo-principal: one page rule rooted at `/` with no
    /// elevated grants. Published-only visibility falls out of the grant
    /// aggregation (an applicable rule without `viewlatest` reads published
    /// content only).
    pub fn anonymous() -> Self {
        let mut info = AuthInfo::empty(ANONYMOUS_LOGIN);
        info.page_rules.push(synthetic(RuleDetail::Page {
            site_id: None,
            pagetree_id: None,
            path: RulePath::root(),
            mode: PathMode::SelfAndSub,
            grants: PageGrants::default(),
        }));
        info
    }

    /// The render pseudo-principal: page coverage plus `viewlatest`,
    /// full-tree asset read and data `viewlatest`. The asset rule's
    /// `update` flag is the derivation vehicle for asset view; the render
    /// path never reaches the mutation facade.
    pub fn render() -> Self {
        let mut info = AuthInfo::empty(RENDER_LOGIN);
        info.page_rules.push(synthetic(RuleDetail::Page {
            site_id: None,
            pagetree_id: None,
            path: RulePath::root(),
            mode: PathMode::SelfAndSub,
            grants: PageGrants { viewlatest: true, ..Default::default() },
        }));
        info.asset_rules.push(synthetic(RuleDetail::Asset {
            site_id: None,
            path: RulePath::root(),
            mode: PathMode::SelfAndSub,
            grants: AssetGrants { update: true, ..Default::default() },
        }));
        info.data_rules.push(synthetic(RuleDetail::Data {
            site_id: None,
            template_id: None,
            path: RulePath::root(),
            mode: PathMode::SelfAndSub,
            grants: DataGrants { viewlatest: true, ..Default::default() },
        }));
        info
    }

    pub fn pseudo(login: &str) -> Option<Self> {
        match login {
            ANONYMOUS_LOGIN => Some(AuthInfo::anonymous()),
            RENDER_LOGIN => Some(AuthInfo::render()),
            _ => None,
        }
    }
}

fn synthetic(detail: RuleDetail) -> Rule {
    Rule { id: Uuid::nil(), role_id: Uuid::nil(), detail }
}

/// Introspection summary returned by the principals endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct PrincipalSummary {
    pub login: String,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
    pub global: GlobalGrants,
    pub site_rules: usize,
    pub template_rules: usize,
    pub page_rules: usize,
    pub asset_rules: usize,
    pub data_rules: usize,
}

impl From<&AuthInfo> for PrincipalSummary {
    fn from(info: &AuthInfo) -> Self {
        PrincipalSummary {
            login: info.login.clone(),
            roles: info.roles.iter().map(|r| r.name.clone()).collect(),
            groups: info.groups.clone(),
            global: info.global,
            site_rules: info.site_rules.len(),
            template_rules: info.template_rules.len(),
            page_rules: info.page_rules.len(),
            asset_rules: info.asset_rules.len(),
            data_rules: info.data_rules.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_logins_resolve_without_a_store() {
        assert!(is_pseudo_login(ANONYMOUS_LOGIN));
        assert!(is_pseudo_login(RENDER_LOGIN));
        assert!(!is_pseudo_login("ada"));

        let anon = AuthInfo::pseudo(ANONYMOUS_LOGIN).unwrap();
        assert_eq!(anon.page_rules.len(), 1);
        assert!(anon.asset_rules.is_empty());
        assert!(anon.data_rules.is_empty());
        assert!(!anon.global.any());

        let render = AuthInfo::pseudo(RENDER_LOGIN).unwrap();
        assert_eq!(render.page_rules.len(), 1);
        assert_eq!(render.asset_rules.len(), 1);
        assert_eq!(render.data_rules.len(), 1);
        assert!(AuthInfo::pseudo("ada").is_none());
    }
}
