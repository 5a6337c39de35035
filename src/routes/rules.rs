//! Rule admin endpoints: CRUD through the mutation facade plus the
//! `too_powerful` pre-validation hook. A rejected candidate (escalation,
//! dangling role reference) is a 200 with `success: false`, not an error -
//! the caller is expected to fix the input and retry.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{MutationResult, Rule, RuleDraft};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::api::{RuleUpdateRequest, ValidateRuleResponse};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListRulesParams {
    /// Restrict the listing to one role.
    pub role_id: Option<Uuid>,
}

/// List rules, optionally filtered by role
#[utoipa::path(
    get,
    path = "/authz/rules",
    tag = "Rules",
    params(ListRulesParams),
    responses(
        (status = 200, description = "List of rules", body = Vec<Rule>),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_rules(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<ListRulesParams>,
) -> AppResult<Json<Vec<Rule>>> {
    let actor = state.authz.auth_for(&auth.login).await?;
    if !actor.may_manage_access() {
        return Err(AppError::forbidden("listing rules requires the manage_access grant"));
    }
    let rules = state.authz.rule_store().list_rules(params.role_id).await?;
    Ok(Json(rules))
}

/// Get a rule by ID
#[utoipa::path(
    get,
    path = "/authz/rules/{rule_id}",
    tag = "Rules",
    params(
        ("rule_id" = Uuid, Path, description = "Rule ID"),
    ),
    responses(
        (status = 200, description = "Rule details", body = Rule),
        (status = 404, description = "Rule not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_rule(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(rule_id): Path<Uuid>,
) -> AppResult<Json<Rule>> {
    let actor = state.authz.auth_for(&auth.login).await?;
    if !actor.may_manage_access() {
        return Err(AppError::forbidden("viewing rules requires the manage_access grant"));
    }
    let rule = state
        .authz
        .rule_store()
        .rule_by_id(rule_id)
        .await?
        .ok_or_else(|| AppError::not_found("Rule not found"))?;
    Ok(Json(rule))
}

/// Create a rule
#[utoipa::path(
    post,
    path = "/authz/rules",
    tag = "Rules",
    request_body = RuleDraft,
    responses(
        (status = 201, description = "Rule created", body = MutationResult),
        (status = 200, description = "Rule rejected by validation", body = MutationResult),
        (status = 403, description = "Caller may not manage this role's rules"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_rule(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(draft): Json<RuleDraft>,
) -> AppResult<(StatusCode, Json<MutationResult>)> {
    let result = state.authz.create_rule(&auth.login, draft).await?;

    if let Some(rule) = &result.rule {
        log_activity(&state.event_bus, "created", Some(&auth.login), rule, None);
        return Ok((StatusCode::CREATED, Json(result)));
    }
    Ok((StatusCode::OK, Json(result)))
}

/// Update a rule's scope or grants
#[utoipa::path(
    put,
    path = "/authz/rules/{rule_id}",
    tag = "Rules",
    params(
        ("rule_id" = Uuid, Path, description = "Rule ID"),
    ),
    request_body = RuleUpdateRequest,
    responses(
        (status = 200, description = "Mutation result", body = MutationResult),
        (status = 404, description = "Rule not found"),
        (status = 403, description = "Caller may not manage this role's rules"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_rule(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(rule_id): Path<Uuid>,
    Json(req): Json<RuleUpdateRequest>,
) -> AppResult<Json<MutationResult>> {
    let result = state.authz.update_rule(&auth.login, rule_id, req.detail).await?;

    if let Some(rule) = &result.rule {
        log_activity(&state.event_bus, "updated", Some(&auth.login), rule, None);
    }
    Ok(Json(result))
}

/// Delete a rule
#[utoipa::path(
    delete,
    path = "/authz/rules/{rule_id}",
    tag = "Rules",
    params(
        ("rule_id" = Uuid, Path, description = "Rule ID"),
    ),
    responses(
        (status = 204, description = "Rule deleted"),
        (status = 404, description = "Rule not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_rule(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(rule_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let deleted = state.authz.delete_rule(&auth.login, rule_id).await?;
    log_activity(&state.event_bus, "deleted", Some(&auth.login), &deleted, None);
    Ok(StatusCode::NO_CONTENT)
}

/// Pre-validate a candidate rule against the caller's own ceiling
#[utoipa::path(
    post,
    path = "/authz/rules/validate",
    tag = "Rules",
    request_body = RuleDraft,
    responses(
        (status = 200, description = "Escalation verdict", body = ValidateRuleResponse),
    ),
    security(("bearerAuth" = []))
)]
pub async fn validate_rule(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(draft): Json<RuleDraft>,
) -> AppResult<Json<ValidateRuleResponse>> {
    let too_powerful = state.authz.too_powerful(&auth.login, &draft).await?;
    Ok(Json(ValidateRuleResponse { too_powerful }))
}
