//! The process-wide authorization engine: resolves principals through the
//! caches, serves the permission facade, and runs the rule mutation flow
//! (authorize → validate → escalation guard → write → invalidate).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::cache::{AuthCache, GlobalSiteRuleCache};
use crate::authz::facade::AssetViewDerivation;
use crate::authz::power;
use crate::authz::principal::{is_pseudo_login, AuthInfo};
use crate::authz::rule::{GlobalGrants, Rule, RuleDetail, RuleDraft, RuleKind};
use crate::authz::store::{
    IdentityStore, RuleStore, SqliteIdentityStore, SqliteRuleStore,
};
use crate::errors::{AppError, AppResult};

const DEFAULT_AUTH_TTL_SECS: u64 = 30;
const DEFAULT_GLOBAL_RULE_TTL_SECS: u64 = 5;

#[derive(Debug, Clone, Copy)]
pub struct AuthzConfig {
    /// Freshness window for per-login AuthInfo snapshots.
    pub auth_ttl: Duration,
    /// Freshness window for the null-site rule overlay.
    pub global_rule_ttl: Duration,
    pub asset_view: AssetViewDerivation,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        AuthzConfig {
            auth_ttl: Duration::from_secs(DEFAULT_AUTH_TTL_SECS),
            global_rule_ttl: Duration::from_secs(DEFAULT_GLOBAL_RULE_TTL_SECS),
            asset_view: AssetViewDerivation::default(),
        }
    }
}

impl AuthzConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = AuthzConfig::default();
        if let Ok(raw) = std::env::var("AUTHZ_CACHE_TTL_SECS") {
            let secs = raw.parse::<u64>().map_err(|_| {
                AppError::configuration("AUTHZ_CACHE_TTL_SECS must be a valid integer")
            })?;
            config.auth_ttl = Duration::from_secs(secs);
        }
        if let Ok(raw) = std::env::var("AUTHZ_GLOBAL_RULE_TTL_SECS") {
            let secs = raw.parse::<u64>().map_err(|_| {
                AppError::configuration("AUTHZ_GLOBAL_RULE_TTL_SECS must be a valid integer")
            })?;
            config.global_rule_ttl = Duration::from_secs(secs);
        }
        if let Ok(raw) = std::env::var("AUTHZ_ASSET_VIEW") {
            config.asset_view = match raw.as_str() {
                "anygrant" => AssetViewDerivation::AnyGrant,
                "foldercontainment" => AssetViewDerivation::FolderContainment,
                _ => {
                    return Err(AppError::configuration(
                        "AUTHZ_ASSET_VIEW must be 'anygrant' or 'foldercontainment'",
                    ))
                }
            };
        }
        Ok(config)
    }
}

/// Outcome of a rule create/update. A failed escalation or reference check
/// is a normal result on the unhappy path, not an error: callers get the
/// messages back and may fix the input and retry.
#[derive(Debug, Serialize, ToSchema)]
pub struct MutationResult {
    pub success: bool,
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<Rule>,
}

impl MutationResult {
    fn succeeded(rule: Rule) -> Self {
        MutationResult { success: true, messages: Vec::new(), rule: Some(rule) }
    }

    fn rejected(message: impl Into<String>) -> Self {
        MutationResult { success: false, messages: vec![message.into()], rule: None }
    }
}

#[derive(Clone)]
pub struct Authorizer {
    inner: Arc<Inner>,
}

struct Inner {
    rules: Arc<dyn RuleStore>,
    identity: Arc<dyn IdentityStore>,
    cache: AuthCache,
    global_site: GlobalSiteRuleCache,
    config: AuthzConfig,
}

impl Authorizer {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        identity: Arc<dyn IdentityStore>,
        config: AuthzConfig,
    ) -> Self {
        Authorizer {
            inner: Arc::new(Inner {
                cache: AuthCache::new(config.auth_ttl),
                global_site: GlobalSiteRuleCache::new(config.global_rule_ttl),
                rules,
                identity,
                config,
            }),
        }
    }

    pub fn for_pool(pool: SqlitePool, config: AuthzConfig) -> Self {
        Authorizer::new(
            Arc::new(SqliteRuleStore::new(pool.clone())),
            Arc::new(SqliteIdentityStore::new(pool)),
            config,
        )
    }

    pub fn asset_view_derivation(&self) -> AssetViewDerivation {
        self.inner.config.asset_view
    }

    /// Resolve a principal through the cache. Pseudo logins are hard-coded
    /// and never touch the stores.
    pub async fn auth_for(&self, login: &str) -> AppResult<Arc<AuthInfo>> {
        if let Some(pseudo) = AuthInfo::pseudo(login) {
            return Ok(Arc::new(pseudo));
        }
        let rules = self.inner.rules.clone();
        let identity = self.inner.identity.clone();
        let owned = login.to_string();
        self.inner
            .cache
            .resolve(login, move || async move {
                load_auth_info(&*rules, &*identity, &owned).await.map_err(|err| {
                    tracing::error!(login = %owned, error = %err, "failed to load auth info");
                    "an error occurred while resolving permissions".to_string()
                })
            })
            .await
            .map_err(AppError::internal)
    }

    /// Resolve a principal bypassing the cache. The mutation flow uses this
    /// so the escalation guard always sees the actor's current rules, not a
    /// snapshot cached for decision traffic.
    pub async fn resolve_fresh(&self, login: &str) -> AppResult<AuthInfo> {
        if let Some(pseudo) = AuthInfo::pseudo(login) {
            return Ok(pseudo);
        }
        load_auth_info(&*self.inner.rules, &*self.inner.identity, login).await
    }

    /// The fresh null-site rule slice used by site-scoped checks.
    pub async fn global_site_overlay(&self) -> AppResult<Arc<Vec<Rule>>> {
        let rules = self.inner.rules.clone();
        self.inner
            .global_site
            .get_or_fetch(move || async move { rules.global_site_rules().await })
            .await
    }

    pub async fn invalidate(&self, login: Option<&str>) {
        self.inner.cache.invalidate(login).await;
    }

    /// The escalation predicate, exposed for UI-side pre-validation.
    pub async fn too_powerful(&self, actor: &str, draft: &RuleDraft) -> AppResult<bool> {
        let actor_auth = self.resolve_fresh(actor).await?;
        Ok(power::too_powerful(&draft.detail, &actor_auth))
    }

    /// Guard for any rule/role mutation targeting `role_id`; runs before
    /// the store is touched.
    pub fn authorize_role_management(actor: &AuthInfo, role_id: Uuid) -> AppResult<()> {
        if !actor.may_manage_access() {
            return Err(AppError::forbidden(
                "managing roles and rules requires the manage_access grant",
            ));
        }
        if actor.holds_role(role_id) && !actor.may_manage_parent_roles() {
            return Err(AppError::forbidden(
                "managing a role you hold requires the manage_parent_roles grant",
            ));
        }
        Ok(())
    }

    pub async fn create_rule(&self, actor: &str, draft: RuleDraft) -> AppResult<MutationResult> {
        let actor_auth = self.mutating_actor(actor).await?;
        Self::authorize_role_management(&actor_auth, draft.role_id)?;

        if self.inner.identity.role_by_id(draft.role_id).await?.is_none() {
            return Ok(MutationResult::rejected(format!(
                "role {} does not exist",
                draft.role_id
            )));
        }
        if power::too_powerful(&draft.detail, &actor_auth) {
            return Ok(MutationResult::rejected(
                "the rule would grant permissions beyond your own access",
            ));
        }

        let rule = self.inner.rules.insert_rule(&draft).await?;
        self.after_mutation(draft.detail.is_global_site_scope()).await;
        tracing::info!(actor = %actor, rule_id = %rule.id, kind = %rule.kind(), "rule created");
        Ok(MutationResult::succeeded(rule))
    }

    pub async fn update_rule(
        &self,
        actor: &str,
        id: Uuid,
        detail: RuleDetail,
    ) -> AppResult<MutationResult> {
        let actor_auth = self.mutating_actor(actor).await?;
        let existing = self
            .inner
            .rules
            .rule_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("rule not found"))?;
        Self::authorize_role_management(&actor_auth, existing.role_id)?;

        if existing.detail.kind() != detail.kind() {
            return Ok(MutationResult::rejected(format!(
                "a {} rule cannot be changed into a {} rule",
                existing.detail.kind(),
                detail.kind()
            )));
        }
        // re-check the guard: an edit can widen scope or add grants
        if power::too_powerful(&detail, &actor_auth) {
            return Ok(MutationResult::rejected(
                "the rule would grant permissions beyond your own access",
            ));
        }

        let touched_global =
            existing.detail.is_global_site_scope() || detail.is_global_site_scope();
        self.inner.rules.update_rule(id, &detail).await?;
        self.after_mutation(touched_global).await;
        tracing::info!(actor = %actor, rule_id = %id, "rule updated");
        Ok(MutationResult::succeeded(Rule { id, role_id: existing.role_id, detail }))
    }

    pub async fn delete_rule(&self, actor: &str, id: Uuid) -> AppResult<Rule> {
        let actor_auth = self.mutating_actor(actor).await?;
        let existing = self
            .inner
            .rules
            .rule_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("rule not found"))?;
        Self::authorize_role_management(&actor_auth, existing.role_id)?;

        self.inner.rules.delete_rule(id).await?;
        self.after_mutation(existing.detail.is_global_site_scope()).await;
        tracing::info!(actor = %actor, rule_id = %id, "rule deleted");
        Ok(existing)
    }

    pub fn rule_store(&self) -> &dyn RuleStore {
        &*self.inner.rules
    }

    pub fn identity_store(&self) -> &dyn IdentityStore {
        &*self.inner.identity
    }

    async fn mutating_actor(&self, actor: &str) -> AppResult<AuthInfo> {
        if is_pseudo_login(actor) {
            return Err(AppError::forbidden("pseudo principals cannot mutate rules"));
        }
        self.resolve_fresh(actor).await
    }

    /// Invalidation runs before the mutation result is returned, so the
    /// mutating caller's next check cannot observe its own stale grants.
    async fn after_mutation(&self, touched_global_scope: bool) {
        self.inner.cache.invalidate(None).await;
        if touched_global_scope {
            self.inner.global_site.clear().await;
        }
    }
}

async fn load_auth_info(
    rules: &dyn RuleStore,
    identity: &dyn IdentityStore,
    login: &str,
) -> AppResult<AuthInfo> {
    let mut info = AuthInfo::empty(login);

    let user = match identity.user_by_login(login).await? {
        Some(user) => user,
        None => return Ok(info),
    };
    let user_id = user.id;
    let disabled = user.disabled;
    info.user = Some(user);
    // disabled accounts keep their identity but resolve to no rules
    if disabled {
        return Ok(info);
    }

    let (roles, groups) =
        tokio::join!(identity.roles_for_user(user_id), identity.groups_for_user(user_id));
    info.roles = roles?;
    info.groups = groups?;

    let role_ids = info.role_ids();
    let (global, site, template, page, asset, data) = tokio::join!(
        rules.rules_for_roles(RuleKind::Global, &role_ids),
        rules.rules_for_roles(RuleKind::Site, &role_ids),
        rules.rules_for_roles(RuleKind::Template, &role_ids),
        rules.rules_for_roles(RuleKind::Page, &role_ids),
        rules.rules_for_roles(RuleKind::Asset, &role_ids),
        rules.rules_for_roles(RuleKind::Data, &role_ids),
    );

    // global rules have no scope to distinguish them: keep only the OR-merge
    let mut merged = GlobalGrants::default();
    for rule in global? {
        if let RuleDetail::Global { grants } = &rule.detail {
            merged.union(grants);
        }
    }
    info.global = merged;
    info.site_rules = site?;
    info.template_rules = template?;
    info.page_rules = page?;
    info.asset_rules = asset?;
    info.data_rules = data?;
    Ok(info)
}
