use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;
use warden::create_app;
use warden::jwt::JwtConfig;

pub const SUPERUSER_ROLE_ID: &str = "00000000-0000-0000-0000-000000000001";

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub jwt: JwtConfig,
    // owns the on-disk database for the test's lifetime
    _dir: TempDir,
}

pub async fn spawn_app() -> Result<TestApp> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("warden_test.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;
    let jwt = JwtConfig::from_env()?;

    Ok(TestApp { app, pool, jwt, _dir: dir })
}

impl TestApp {
    pub fn token_for(&self, login: &str) -> Result<String> {
        Ok(self.jwt.encode(login)?)
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        login: Option<&str>,
        body: Option<Value>,
    ) -> Result<Response<Body>> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(login) = login {
            builder = builder.header("authorization", format!("Bearer {}", self.token_for(login)?));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };
        Ok(self.app.clone().oneshot(request).await?)
    }

    pub async fn create_user(&self, login: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (id, login, name, disabled, created_at, updated_at) VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(id.to_string())
        .bind(login)
        .bind(login)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn create_role(&self, name: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO roles (id, name, description, created_at, updated_at) VALUES (?, ?, NULL, ?, ?)",
        )
        .bind(id.to_string())
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn assign_role(&self, user_id: Uuid, role_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO user_roles (user_id, role_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id.to_string())
        .bind(role_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a rule row directly, bypassing the mutation facade, for
    /// seeding principals with a precise ceiling.
    pub async fn insert_rule(
        &self,
        role_id: Uuid,
        kind: &str,
        path: Option<&str>,
        mode: Option<&str>,
        grants: Value,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO rules (id, role_id, kind, site_id, pagetree_id, template_id, path, mode, grants, created_at, updated_at) \
             VALUES (?, ?, ?, NULL, NULL, NULL, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(role_id.to_string())
        .bind(kind)
        .bind(path)
        .bind(mode)
        .bind(grants.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }
}

pub async fn read_json(response: Response<Body>) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode, context: &str) {
    assert_eq!(response.status(), expected, "{context}");
}
