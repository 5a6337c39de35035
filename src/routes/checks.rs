//! The permission check endpoint and principal introspection. Checks run
//! against the caller's own principal by default; checking another login
//! requires `manage_access`.

use axum::extract::{Path, State};
use axum::Json;

use crate::app::AppState;
use crate::authz::{AuthInfo, PrincipalSummary};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::api::{
    AssetAction, CheckRequest, CheckResponse, CheckTarget, DataAction, GlobalAction, PageAction,
    SiteAction,
};

/// Evaluate one permission question
#[utoipa::path(
    post,
    path = "/authz/check",
    tag = "Checks",
    request_body = CheckRequest,
    responses(
        (status = 200, description = "Decision", body = CheckResponse),
        (status = 403, description = "Caller may not check other principals"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn check(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CheckRequest>,
) -> AppResult<Json<CheckResponse>> {
    let login = req.login.as_deref().unwrap_or(&auth.login);
    if login != auth.login {
        let actor = state.authz.auth_for(&auth.login).await?;
        if !actor.may_manage_access() {
            return Err(AppError::forbidden(
                "checking another principal requires the manage_access grant",
            ));
        }
    }

    let principal = state.authz.auth_for(login).await?;
    let granted = evaluate(&state, &principal, &req.check).await?;
    tracing::debug!(login = %login, granted, "permission check");
    Ok(Json(CheckResponse { granted }))
}

async fn evaluate(
    state: &AppState,
    principal: &AuthInfo,
    check: &CheckTarget,
) -> AppResult<bool> {
    let derivation = state.authz.asset_view_derivation();
    Ok(match check {
        CheckTarget::Page { action, target } => match action {
            PageAction::View => principal.may_view_page(target),
            PageAction::ViewForEdit => principal.may_view_page_for_edit(target),
            PageAction::Update => principal.may_update_page(target),
            PageAction::Move => principal.may_move_page(target),
            PageAction::Create => principal.may_create_page(target),
            PageAction::Publish => principal.may_publish_page(target),
            PageAction::Unpublish => principal.may_unpublish_page(target),
            PageAction::Delete => principal.may_delete_page(target),
            PageAction::Undelete => principal.may_undelete_page(target),
        },
        CheckTarget::Asset { action, target } => match action {
            AssetAction::View => principal.may_view_asset(target, derivation),
            AssetAction::ViewForEdit => principal.may_view_asset_for_edit(target, derivation),
            AssetAction::Create => principal.may_create_asset(target),
            AssetAction::Update => principal.may_update_asset(target),
            AssetAction::Move => principal.may_move_asset(target),
            AssetAction::Delete => principal.may_delete_asset(target),
            AssetAction::Undelete => principal.may_undelete_asset(target),
        },
        CheckTarget::AssetFolder { target } => {
            principal.may_view_asset_folder(target, derivation)
        }
        CheckTarget::Data { action, target } => match action {
            DataAction::View => principal.may_view_data(target),
            DataAction::ViewForEdit => principal.may_view_data_for_edit(target),
            DataAction::Create => principal.may_create_data(target),
            DataAction::Update => principal.may_update_data(target),
            DataAction::Move => principal.may_move_data(target),
            DataAction::Publish => principal.may_publish_data(target),
            DataAction::Unpublish => principal.may_unpublish_data(target),
            DataAction::Delete => principal.may_delete_data(target),
            DataAction::Undelete => principal.may_undelete_data(target),
        },
        CheckTarget::DataFolder { target } => principal.may_view_data_folder(target),
        CheckTarget::Site { action, site_id } => {
            let overlay = state.authz.global_site_overlay().await?;
            match action {
                SiteAction::Launch => principal.may_launch_site(&overlay, *site_id),
                SiteAction::Rename => principal.may_rename_site(&overlay, *site_id),
                SiteAction::ManageOwners => principal.may_manage_site_owners(&overlay, *site_id),
                SiteAction::ManagePagetrees => principal.may_manage_pagetrees(&overlay, *site_id),
                SiteAction::PromotePagetree => principal.may_promote_pagetree(&overlay, *site_id),
                SiteAction::Delete => principal.may_delete_site(&overlay, *site_id),
                SiteAction::Undelete => principal.may_undelete_site(&overlay, *site_id),
            }
        }
        CheckTarget::Template { template_id } => principal.may_use_template(*template_id),
        CheckTarget::Global { action } => match action {
            GlobalAction::ManageAccess => principal.may_manage_access(),
            GlobalAction::ManageParentRoles => principal.may_manage_parent_roles(),
            GlobalAction::CreateSites => principal.may_create_sites(),
            GlobalAction::ManageGlobalData => principal.may_manage_global_data(),
            GlobalAction::ManageTemplates => principal.may_manage_templates(),
        },
    })
}

/// Resolved snapshot summary for one principal
#[utoipa::path(
    get,
    path = "/authz/principals/{login}",
    tag = "Checks",
    params(
        ("login" = String, Path, description = "Login to inspect"),
    ),
    responses(
        (status = 200, description = "Principal summary", body = PrincipalSummary),
        (status = 403, description = "Caller may not inspect other principals"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn principal_summary(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(login): Path<String>,
) -> AppResult<Json<PrincipalSummary>> {
    if login != auth.login {
        let actor = state.authz.auth_for(&auth.login).await?;
        if !actor.may_manage_access() {
            return Err(AppError::forbidden(
                "inspecting another principal requires the manage_access grant",
            ));
        }
    }
    let principal = state.authz.auth_for(&login).await?;
    Ok(Json(PrincipalSummary::from(&*principal)))
}
