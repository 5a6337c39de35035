//! Role admin endpoints. Every mutation is gated before the store is
//! touched and logged to the activity log with Critical severity.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Authorizer;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::role::{Role, RoleCreateRequest};

fn role_from_row(row: &sqlx::sqlite::SqliteRow) -> Role {
    Role {
        id: Uuid::parse_str(row.get::<&str, _>("id")).unwrap_or_default(),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// List all roles
#[utoipa::path(
    get,
    path = "/authz/roles",
    tag = "Roles",
    responses(
        (status = 200, description = "List of roles", body = Vec<Role>),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Role>>> {
    let actor = state.authz.auth_for(&auth.login).await?;
    if !actor.may_manage_access() {
        return Err(AppError::forbidden("listing roles requires the manage_access grant"));
    }

    let rows = sqlx::query(
        "SELECT id, name, description, created_at, updated_at FROM roles ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.iter().map(role_from_row).collect()))
}

/// Create a new role
#[utoipa::path(
    post,
    path = "/authz/roles",
    tag = "Roles",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 403, description = "Caller may not manage access"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    let actor = state.authz.resolve_fresh(&auth.login).await?;
    if !actor.may_manage_access() {
        return Err(AppError::forbidden("creating roles requires the manage_access grant"));
    }

    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO roles (id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&req.name)
    .bind(&req.description)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let role = Role {
        id,
        name: req.name,
        description: req.description,
        created_at: now,
        updated_at: now,
    };

    log_activity(&state.event_bus, "created", Some(&auth.login), &role, None);

    Ok((StatusCode::CREATED, Json(role)))
}

/// Get a role by ID
#[utoipa::path(
    get,
    path = "/authz/roles/{role_id}",
    tag = "Roles",
    params(
        ("role_id" = Uuid, Path, description = "Role ID"),
    ),
    responses(
        (status = 200, description = "Role details", body = Role),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<Role>> {
    let actor = state.authz.auth_for(&auth.login).await?;
    if !actor.may_manage_access() {
        return Err(AppError::forbidden("viewing roles requires the manage_access grant"));
    }

    let role = state
        .authz
        .identity_store()
        .role_by_id(role_id)
        .await?
        .ok_or_else(|| AppError::not_found("Role not found"))?;

    Ok(Json(role))
}

/// Delete a role (cascades to its rules)
#[utoipa::path(
    delete,
    path = "/authz/roles/{role_id}",
    tag = "Roles",
    params(
        ("role_id" = Uuid, Path, description = "Role ID"),
    ),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(role_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let actor = state.authz.resolve_fresh(&auth.login).await?;
    Authorizer::authorize_role_management(&actor, role_id)?;

    let role = state
        .authz
        .identity_store()
        .role_by_id(role_id)
        .await?
        .ok_or_else(|| AppError::not_found("Role not found"))?;

    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(role_id.to_string())
        .execute(&state.pool)
        .await?;

    // dropping a role drops its rules with it; every snapshot may change
    state.authz.invalidate(None).await;

    log_activity(&state.event_bus, "deleted", Some(&auth.login), &role, None);

    Ok(StatusCode::NO_CONTENT)
}
