mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{assert_status, read_json, spawn_app, SUPERUSER_ROLE_ID};

#[tokio::test]
async fn rule_lifecycle_through_the_mutation_facade() -> Result<()> {
    let app = spawn_app().await?;

    let admin = app.create_user("admin").await?;
    app.assign_role(admin, SUPERUSER_ROLE_ID).await?;

    // 1. admin creates a role over the API
    let resp = app
        .request(
            "POST",
            "/authz/roles",
            Some("admin"),
            Some(json!({ "name": "editor", "description": "site editors" })),
        )
        .await?;
    assert_status(&resp, StatusCode::CREATED, "superuser should create roles");
    let role = read_json(resp).await?;
    let role_id = role["id"].as_str().expect("role id").to_string();

    // 2. admin grants the editor role a page rule
    let resp = app
        .request(
            "POST",
            "/authz/rules",
            Some("admin"),
            Some(json!({
                "role_id": role_id,
                "kind": "page",
                "site_id": null,
                "pagetree_id": null,
                "path": "/news",
                "mode": "selfandsub",
                "grants": { "viewlatest": true, "update": true }
            })),
        )
        .await?;
    assert_status(&resp, StatusCode::CREATED, "superuser-backed rule should persist");
    let result = read_json(resp).await?;
    assert_eq!(result["success"], true);
    let rule_id = result["rule"]["id"].as_str().expect("rule id").to_string();

    // 3. the new rule is listed for the role
    let resp = app
        .request(
            "GET",
            &format!("/authz/rules?role_id={role_id}"),
            Some("admin"),
            None,
        )
        .await?;
    assert_status(&resp, StatusCode::OK, "rule listing");
    let listed = read_json(resp).await?;
    assert_eq!(listed.as_array().map(|a| a.len()), Some(1));
    assert_eq!(listed[0]["kind"], "page");
    assert_eq!(listed[0]["path"], "/news");

    // 4. updating the rule re-runs the escalation guard and succeeds for
    // the superuser-backed admin
    let resp = app
        .request(
            "PUT",
            &format!("/authz/rules/{rule_id}"),
            Some("admin"),
            Some(json!({
                "kind": "page",
                "site_id": null,
                "pagetree_id": null,
                "path": "/news",
                "mode": "selfandsub",
                "grants": { "viewlatest": true, "update": true, "publish": true }
            })),
        )
        .await?;
    assert_status(&resp, StatusCode::OK, "rule update");
    let result = read_json(resp).await?;
    assert_eq!(result["success"], true);

    // 5. a kind change is rejected as a validation failure, not an error
    let resp = app
        .request(
            "PUT",
            &format!("/authz/rules/{rule_id}"),
            Some("admin"),
            Some(json!({
                "kind": "asset",
                "site_id": null,
                "path": "/news",
                "mode": "selfandsub",
                "grants": { "update": true }
            })),
        )
        .await?;
    assert_status(&resp, StatusCode::OK, "kind change is a structured rejection");
    let result = read_json(resp).await?;
    assert_eq!(result["success"], false);

    // 6. delete, then the rule is gone
    let resp = app
        .request("DELETE", &format!("/authz/rules/{rule_id}"), Some("admin"), None)
        .await?;
    assert_status(&resp, StatusCode::NO_CONTENT, "rule delete");
    let resp = app
        .request("GET", &format!("/authz/rules/{rule_id}"), Some("admin"), None)
        .await?;
    assert_status(&resp, StatusCode::NOT_FOUND, "deleted rule lookup");

    Ok(())
}

#[tokio::test]
async fn escalation_is_rejected_as_a_structured_failure() -> Result<()> {
    let app = spawn_app().await?;

    // the manager can manage access and holds update (not delete) on /news
    let manager_role = app.create_role("news-manager").await?;
    app.insert_rule(manager_role, "global", None, None, json!({ "manage_access": true }))
        .await?;
    app.insert_rule(
        manager_role,
        "page",
        Some("/news"),
        Some("selfandsub"),
        json!({ "update": true }),
    )
    .await?;
    let manager = app.create_user("manager").await?;
    app.assign_role(manager, &manager_role.to_string()).await?;

    let contributor_role = app.create_role("contributor").await?;

    // grant within the ceiling: narrower scope, covered grant
    let resp = app
        .request(
            "POST",
            "/authz/rules",
            Some("manager"),
            Some(json!({
                "role_id": contributor_role,
                "kind": "page",
                "site_id": null,
                "pagetree_id": null,
                "path": "/news/2026",
                "mode": "self",
                "grants": { "update": true }
            })),
        )
        .await?;
    assert_status(&resp, StatusCode::CREATED, "covered grant should persist");

    // delete is not backed by the manager's own rules: structured rejection
    let resp = app
        .request(
            "POST",
            "/authz/rules",
            Some("manager"),
            Some(json!({
                "role_id": contributor_role,
                "kind": "page",
                "site_id": null,
                "pagetree_id": null,
                "path": "/news/2026",
                "mode": "self",
                "grants": { "update": true, "delete": true }
            })),
        )
        .await?;
    assert_status(&resp, StatusCode::OK, "escalation is not an http error");
    let result = read_json(resp).await?;
    assert_eq!(result["success"], false);
    assert!(result["messages"][0].as_str().unwrap_or_default().contains("beyond"));

    // the validate endpoint gives the same verdict without persisting
    let resp = app
        .request(
            "POST",
            "/authz/rules/validate",
            Some("manager"),
            Some(json!({
                "role_id": contributor_role,
                "kind": "page",
                "site_id": null,
                "pagetree_id": null,
                "path": "/news/2026",
                "mode": "self",
                "grants": { "delete": true }
            })),
        )
        .await?;
    assert_status(&resp, StatusCode::OK, "validate endpoint");
    let verdict = read_json(resp).await?;
    assert_eq!(verdict["too_powerful"], true);

    Ok(())
}

#[tokio::test]
async fn mutation_gates_run_before_the_store_is_touched() -> Result<()> {
    let app = spawn_app().await?;

    // a principal without manage_access cannot author rules at all
    let viewer_role = app.create_role("viewer").await?;
    app.insert_rule(
        viewer_role,
        "page",
        Some("/"),
        Some("selfandsub"),
        json!({ "viewlatest": true }),
    )
    .await?;
    let viewer = app.create_user("viewer").await?;
    app.assign_role(viewer, &viewer_role.to_string()).await?;

    let resp = app
        .request(
            "POST",
            "/authz/rules",
            Some("viewer"),
            Some(json!({
                "role_id": viewer_role,
                "kind": "page",
                "site_id": null,
                "pagetree_id": null,
                "path": "/",
                "mode": "selfandsub",
                "grants": { "viewlatest": true }
            })),
        )
        .await?;
    assert_status(&resp, StatusCode::FORBIDDEN, "no manage_access, no rule authoring");

    // manage_access alone is not enough for a role the actor holds
    let self_admin_role = app.create_role("self-admin").await?;
    app.insert_rule(self_admin_role, "global", None, None, json!({ "manage_access": true }))
        .await?;
    let self_admin = app.create_user("self-admin").await?;
    app.assign_role(self_admin, &self_admin_role.to_string()).await?;

    let resp = app
        .request(
            "POST",
            "/authz/rules",
            Some("self-admin"),
            Some(json!({
                "role_id": self_admin_role,
                "kind": "global",
                "grants": { "manage_access": true }
            })),
        )
        .await?;
    assert_status(&resp, StatusCode::FORBIDDEN, "own role needs manage_parent_roles");

    // a dangling role reference is a structured validation failure
    let admin = app.create_user("admin").await?;
    app.assign_role(admin, SUPERUSER_ROLE_ID).await?;
    let resp = app
        .request(
            "POST",
            "/authz/rules",
            Some("admin"),
            Some(json!({
                "role_id": "99999999-9999-9999-9999-999999999999",
                "kind": "global",
                "grants": { "manage_access": true }
            })),
        )
        .await?;
    assert_status(&resp, StatusCode::OK, "dangling role is recoverable input");
    let result = read_json(resp).await?;
    assert_eq!(result["success"], false);

    Ok(())
}

#[tokio::test]
async fn a_mutating_caller_reads_its_own_writes() -> Result<()> {
    let app = spawn_app().await?;

    let admin = app.create_user("admin").await?;
    app.assign_role(admin, SUPERUSER_ROLE_ID).await?;

    let editor_role = app.create_role("editor").await?;
    let editor = app.create_user("editor").await?;
    app.assign_role(editor, &editor_role.to_string()).await?;

    let page_check = json!({
        "login": "editor",
        "kind": "page",
        "action": "update",
        "target": {
            "site_id": "11111111-1111-1111-1111-111111111111",
            "pagetree_id": "22222222-2222-2222-2222-222222222222",
            "path": "/news/today",
            "published": true
        }
    });

    // warm the cache: editor cannot update yet
    let resp = app
        .request("POST", "/authz/check", Some("admin"), Some(page_check.clone()))
        .await?;
    assert_status(&resp, StatusCode::OK, "pre-grant check");
    assert_eq!(read_json(resp).await?["granted"], false);

    // admin grants update on /news; invalidation happens before the
    // mutation result is returned, so the very next check sees it
    let resp = app
        .request(
            "POST",
            "/authz/rules",
            Some("admin"),
            Some(json!({
                "role_id": editor_role,
                "kind": "page",
                "site_id": null,
                "pagetree_id": null,
                "path": "/news",
                "mode": "selfandsub",
                "grants": { "update": true }
            })),
        )
        .await?;
    assert_status(&resp, StatusCode::CREATED, "grant update on /news");

    let resp = app
        .request("POST", "/authz/check", Some("admin"), Some(page_check))
        .await?;
    assert_status(&resp, StatusCode::OK, "post-grant check");
    assert_eq!(read_json(resp).await?["granted"], true);

    Ok(())
}
