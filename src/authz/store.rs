//! Persistence seams: the rule store and identity resolution. The kernel
//! only depends on the traits; the SQLite implementations live here so the
//! service and its tests share one mapping between rows and the rule sum
//! type.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::authz::rule::{PathMode, Rule, RuleDetail, RuleDraft, RuleKind, RulePath};
use crate::errors::{AppError, AppResult};
use crate::models::role::Role;
use crate::models::user::UserRecord;

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All rules of one kind owned by any of the given roles.
    async fn rules_for_roles(&self, kind: RuleKind, role_ids: &[Uuid]) -> AppResult<Vec<Rule>>;
    /// Site rules with a null site id, across every role (the sub-cache's
    /// backing query).
    async fn global_site_rules(&self) -> AppResult<Vec<Rule>>;
    async fn rule_by_id(&self, id: Uuid) -> AppResult<Option<Rule>>;
    /// Rules owned by one role, or every rule when `role_id` is None.
    async fn list_rules(&self, role_id: Option<Uuid>) -> AppResult<Vec<Rule>>;
    async fn insert_rule(&self, draft: &RuleDraft) -> AppResult<Rule>;
    async fn update_rule(&self, id: Uuid, detail: &RuleDetail) -> AppResult<u64>;
    async fn delete_rule(&self, id: Uuid) -> AppResult<u64>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn user_by_login(&self, login: &str) -> AppResult<Option<UserRecord>>;
    /// Roles held directly or through group membership.
    async fn roles_for_user(&self, user_id: Uuid) -> AppResult<Vec<Role>>;
    async fn groups_for_user(&self, user_id: Uuid) -> AppResult<Vec<String>>;
    async fn role_by_id(&self, id: Uuid) -> AppResult<Option<Role>>;
}

pub struct SqliteRuleStore {
    pool: SqlitePool,
}

impl SqliteRuleStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteRuleStore { pool }
    }
}

const RULE_COLUMNS: &str =
    "id, role_id, kind, site_id, pagetree_id, template_id, path, mode, grants, created_at, updated_at";

fn parse_uuid(raw: &str, column: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| AppError::internal(format!("malformed uuid in rules.{column}: {raw}")))
}

fn opt_uuid(row: &SqliteRow, column: &str) -> AppResult<Option<Uuid>> {
    let raw: Option<String> = row.get(column);
    raw.map(|value| parse_uuid(&value, column)).transpose()
}

fn path_and_mode(row: &SqliteRow) -> AppResult<(RulePath, PathMode)> {
    let path: Option<String> = row.get("path");
    let mode: Option<String> = row.get("mode");
    let path = path.ok_or_else(|| AppError::internal("path-scoped rule row is missing a path"))?;
    let mode = mode
        .ok_or_else(|| AppError::internal("path-scoped rule row is missing a mode"))?
        .parse::<PathMode>()
        .map_err(AppError::internal)?;
    Ok((RulePath::normalize(&path), mode))
}

fn grants_json<T: serde::de::DeserializeOwned>(row: &SqliteRow) -> AppResult<T> {
    let raw: String = row.get("grants");
    serde_json::from_str(&raw)
        .map_err(|err| AppError::internal(format!("malformed grants column: {err}")))
}

fn rule_from_row(row: &SqliteRow) -> AppResult<Rule> {
    let id = parse_uuid(row.get("id"), "id")?;
    let role_id = parse_uuid(row.get("role_id"), "role_id")?;
    let kind: String = row.get("kind");
    let kind = kind.parse::<RuleKind>().map_err(AppError::internal)?;

    let detail = match kind {
        RuleKind::Global => RuleDetail::Global { grants: grants_json(row)? },
        RuleKind::Site => RuleDetail::Site {
            site_id: opt_uuid(row, "site_id")?,
            grants: grants_json(row)?,
        },
        RuleKind::Template => RuleDetail::Template {
            template_id: opt_uuid(row, "template_id")?,
            grants: grants_json(row)?,
        },
        RuleKind::Page => {
            let (path, mode) = path_and_mode(row)?;
            RuleDetail::Page {
                site_id: opt_uuid(row, "site_id")?,
                pagetree_id: opt_uuid(row, "pagetree_id")?,
                path,
                mode,
                grants: grants_json(row)?,
            }
        }
        RuleKind::Asset => {
            let (path, mode) = path_and_mode(row)?;
            RuleDetail::Asset {
                site_id: opt_uuid(row, "site_id")?,
                path,
                mode,
                grants: grants_json(row)?,
            }
        }
        RuleKind::Data => {
            let (path, mode) = path_and_mode(row)?;
            RuleDetail::Data {
                site_id: opt_uuid(row, "site_id")?,
                template_id: opt_uuid(row, "template_id")?,
                path,
                mode,
                grants: grants_json(row)?,
            }
        }
    };

    Ok(Rule { id, role_id, detail })
}

/// Scope columns and grants JSON for persisting one rule payload.
struct RuleColumns {
    site_id: Option<String>,
    pagetree_id: Option<String>,
    template_id: Option<String>,
    path: Option<String>,
    mode: Option<&'static str>,
    grants: String,
}

fn rule_columns(detail: &RuleDetail) -> AppResult<RuleColumns> {
    let (site_id, pagetree_id, template_id, path, mode, grants) = match detail {
        RuleDetail::Global { grants } => (None, None, None, None, None, serde_json::to_string(grants)),
        RuleDetail::Site { site_id, grants } => (
            site_id.map(|u| u.to_string()),
            None,
            None,
            None,
            None,
            serde_json::to_string(grants),
        ),
        RuleDetail::Template { template_id, grants } => (
            None,
            None,
            template_id.map(|u| u.to_string()),
            None,
            None,
            serde_json::to_string(grants),
        ),
        RuleDetail::Page { site_id, pagetree_id, path, mode, grants } => (
            site_id.map(|u| u.to_string()),
            pagetree_id.map(|u| u.to_string()),
            None,
            Some(path.as_str().to_string()),
            Some(mode.as_str()),
            serde_json::to_string(grants),
        ),
        RuleDetail::Asset { site_id, path, mode, grants } => (
            site_id.map(|u| u.to_string()),
            None,
            None,
            Some(path.as_str().to_string()),
            Some(mode.as_str()),
            serde_json::to_string(grants),
        ),
        RuleDetail::Data { site_id, template_id, path, mode, grants } => (
            site_id.map(|u| u.to_string()),
            None,
            template_id.map(|u| u.to_string()),
            Some(path.as_str().to_string()),
            Some(mode.as_str()),
            serde_json::to_string(grants),
        ),
    };
    let grants =
        grants.map_err(|err| AppError::internal(format!("failed to encode grants: {err}")))?;
    Ok(RuleColumns { site_id, pagetree_id, template_id, path, mode, grants })
}

#[async_trait]
impl RuleStore for SqliteRuleStore {
    async fn rules_for_roles(&self, kind: RuleKind, role_ids: &[Uuid]) -> AppResult<Vec<Rule>> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; role_ids.len()].join(", ");
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE kind = ? AND role_id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(kind.as_str());
        for role_id in role_ids {
            query = query.bind(role_id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(rule_from_row).collect()
    }

    async fn global_site_rules(&self) -> AppResult<Vec<Rule>> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE kind = 'site' AND site_id IS NULL"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(rule_from_row).collect()
    }

    async fn rule_by_id(&self, id: Uuid) -> AppResult<Option<Rule>> {
        let row = sqlx::query(&format!("SELECT {RULE_COLUMNS} FROM rules WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(rule_from_row).transpose()
    }

    async fn list_rules(&self, role_id: Option<Uuid>) -> AppResult<Vec<Rule>> {
        let rows = match role_id {
            Some(role_id) => {
                sqlx::query(&format!(
                    "SELECT {RULE_COLUMNS} FROM rules WHERE role_id = ? ORDER BY kind, created_at"
                ))
                .bind(role_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {RULE_COLUMNS} FROM rules ORDER BY kind, created_at"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(rule_from_row).collect()
    }

    async fn insert_rule(&self, draft: &RuleDraft) -> AppResult<Rule> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let columns = rule_columns(&draft.detail)?;

        sqlx::query(
            "INSERT INTO rules (id, role_id, kind, site_id, pagetree_id, template_id, path, mode, grants, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(draft.role_id.to_string())
        .bind(draft.detail.kind().as_str())
        .bind(&columns.site_id)
        .bind(&columns.pagetree_id)
        .bind(&columns.template_id)
        .bind(&columns.path)
        .bind(columns.mode)
        .bind(&columns.grants)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Rule { id, role_id: draft.role_id, detail: draft.detail.clone() })
    }

    async fn update_rule(&self, id: Uuid, detail: &RuleDetail) -> AppResult<u64> {
        let now = Utc::now();
        let columns = rule_columns(detail)?;
        let result = sqlx::query(
            "UPDATE rules SET kind = ?, site_id = ?, pagetree_id = ?, template_id = ?, path = ?, mode = ?, grants = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(detail.kind().as_str())
        .bind(&columns.site_id)
        .bind(&columns.pagetree_id)
        .bind(&columns.template_id)
        .bind(&columns.path)
        .bind(columns.mode)
        .bind(&columns.grants)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_rule(&self, id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM rules WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

pub struct SqliteIdentityStore {
    pool: SqlitePool,
}

impl SqliteIdentityStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteIdentityStore { pool }
    }
}

fn role_from_row(row: &SqliteRow) -> AppResult<Role> {
    Ok(Role {
        id: parse_uuid(row.get("id"), "id")?,
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl IdentityStore for SqliteIdentityStore {
    async fn user_by_login(&self, login: &str) -> AppResult<Option<UserRecord>> {
        let row = sqlx::query(
            "SELECT id, login, name, disabled, created_at, updated_at FROM users WHERE login = ?",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(UserRecord {
                id: parse_uuid(row.get("id"), "id")?,
                login: row.get("login"),
                name: row.get("name"),
                disabled: row.get::<i64, _>("disabled") != 0,
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
        })
        .transpose()
    }

    async fn roles_for_user(&self, user_id: Uuid) -> AppResult<Vec<Role>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.name, r.description, r.created_at, r.updated_at
            FROM roles r
            WHERE r.id IN (
                SELECT role_id FROM user_roles WHERE user_id = ?
                UNION
                SELECT gr.role_id
                FROM group_roles gr
                INNER JOIN user_groups ug ON ug.group_id = gr.group_id
                WHERE ug.user_id = ?
            )
            ORDER BY r.name
            "#,
        )
        .bind(user_id.to_string())
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(role_from_row).collect()
    }

    async fn groups_for_user(&self, user_id: Uuid) -> AppResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT g.name
            FROM groups g
            INNER JOIN user_groups ug ON g.id = ug.group_id
            WHERE ug.user_id = ?
            ORDER BY g.name
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    async fn role_by_id(&self, id: Uuid) -> AppResult<Option<Role>> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at, updated_at FROM roles WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(role_from_row).transpose()
    }
}
