//! Authorization kernel - rule resolution and escalation prevention
//!
//! Every read and mutation in the surrounding CMS routes through here:
//! - scoped grant rules owned by roles, six kinds (global, site, template,
//!   page, asset, data), modeled as one tagged sum type
//! - scope subsumption and the "at least as powerful" relation used to stop
//!   a role from authoring rules beyond its own ceiling
//! - OR-aggregation of applicable rules into yes/no decisions, deny by
//!   default
//! - per-login snapshot caching with a bounded freshness window, plus a
//!   short-TTL sub-cache for the hot null-site rule slice

mod authorizer;
mod cache;
mod facade;
mod power;
mod principal;
mod rule;
mod scope;
mod store;

pub use authorizer::{Authorizer, AuthzConfig, MutationResult};
pub use cache::{AuthCache, GlobalSiteRuleCache};
pub use facade::{AssetViewDerivation, MAX_FOLDER_DEPTH};
pub use power::{as_or_more_powerful, too_powerful};
pub use principal::{
    is_pseudo_login, AuthInfo, PrincipalSummary, ANONYMOUS_LOGIN, RENDER_LOGIN,
};
pub use rule::{
    AssetGrants, DataGrants, GlobalGrants, PageGrants, PathMode, Rule, RuleDetail, RuleDraft,
    RuleKind, RulePath, SiteGrants, TemplateGrants,
};
pub use scope::{mode_subsumes, subsumes};
pub use store::{IdentityStore, RuleStore, SqliteIdentityStore, SqliteRuleStore};
