mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{assert_status, read_json, spawn_app, SUPERUSER_ROLE_ID};

fn page_check(login: &str, action: &str, path: &str, published: bool) -> serde_json::Value {
    json!({
        "login": login,
        "kind": "page",
        "action": action,
        "target": {
            "site_id": "11111111-1111-1111-1111-111111111111",
            "pagetree_id": "22222222-2222-2222-2222-222222222222",
            "path": path,
            "published": published
        }
    })
}

#[tokio::test]
async fn pseudo_principals_behave_as_specified() -> Result<()> {
    let app = spawn_app().await?;
    let admin = app.create_user("admin").await?;
    app.assign_role(admin, SUPERUSER_ROLE_ID).await?;

    // anonymous: published pages yes, drafts no, assets never
    let resp = app
        .request("POST", "/authz/check", Some("admin"), Some(page_check("anonymous", "view", "/news", true)))
        .await?;
    assert_eq!(read_json(resp).await?["granted"], true);

    let resp = app
        .request("POST", "/authz/check", Some("admin"), Some(page_check("anonymous", "view", "/news", false)))
        .await?;
    assert_eq!(read_json(resp).await?["granted"], false);

    let resp = app
        .request(
            "POST",
            "/authz/check",
            Some("admin"),
            Some(json!({
                "login": "anonymous",
                "kind": "asset",
                "action": "view",
                "target": {
                    "site_id": "11111111-1111-1111-1111-111111111111",
                    "path": "/uploads/logo.png"
                }
            })),
        )
        .await?;
    assert_eq!(read_json(resp).await?["granted"], false);

    // render: sees the latest draft of pages, data and assets
    let resp = app
        .request("POST", "/authz/check", Some("admin"), Some(page_check("render", "view", "/news", false)))
        .await?;
    assert_eq!(read_json(resp).await?["granted"], true);

    let resp = app
        .request(
            "POST",
            "/authz/check",
            Some("admin"),
            Some(json!({
                "login": "render",
                "kind": "asset",
                "action": "view",
                "target": {
                    "site_id": "11111111-1111-1111-1111-111111111111",
                    "path": "/uploads/logo.png"
                }
            })),
        )
        .await?;
    assert_eq!(read_json(resp).await?["granted"], true);

    // ...but render cannot publish
    let resp = app
        .request("POST", "/authz/check", Some("admin"), Some(page_check("render", "publish", "/news", false)))
        .await?;
    assert_eq!(read_json(resp).await?["granted"], false);

    Ok(())
}

#[tokio::test]
async fn checks_default_to_the_caller_and_gate_other_logins() -> Result<()> {
    let app = spawn_app().await?;

    let editor_role = app.create_role("editor").await?;
    app.insert_rule(
        editor_role,
        "page",
        Some("/news"),
        Some("selfandsub"),
        json!({ "viewlatest": true, "update": true }),
    )
    .await?;
    let editor = app.create_user("editor").await?;
    app.assign_role(editor, &editor_role.to_string()).await?;

    // self-check without a login field
    let body = json!({
        "kind": "page",
        "action": "update",
        "target": {
            "site_id": "11111111-1111-1111-1111-111111111111",
            "pagetree_id": "22222222-2222-2222-2222-222222222222",
            "path": "/news/today",
            "published": true
        }
    });
    let resp = app.request("POST", "/authz/check", Some("editor"), Some(body)).await?;
    assert_status(&resp, StatusCode::OK, "self check");
    assert_eq!(read_json(resp).await?["granted"], true);

    // outside the rule's scope: denied by default
    let resp = app
        .request(
            "POST",
            "/authz/check",
            Some("editor"),
            Some(page_check("editor", "update", "/about", true)),
        )
        .await?;
    assert_eq!(read_json(resp).await?["granted"], false);

    // checking someone else requires manage_access
    let resp = app
        .request(
            "POST",
            "/authz/check",
            Some("editor"),
            Some(page_check("anonymous", "view", "/news", true)),
        )
        .await?;
    assert_status(&resp, StatusCode::FORBIDDEN, "editors may not check other principals");

    Ok(())
}

#[tokio::test]
async fn folder_view_check_uses_the_containment_fallback() -> Result<()> {
    let app = spawn_app().await?;

    let curator_role = app.create_role("curator").await?;
    app.insert_rule(
        curator_role,
        "asset",
        Some("/brand/approved"),
        Some("selfandsub"),
        json!({ "update": true }),
    )
    .await?;
    let curator = app.create_user("curator").await?;
    app.assign_role(curator, &curator_role.to_string()).await?;

    // no direct rule on /brand, but a visible asset sits inside it
    let resp = app
        .request(
            "POST",
            "/authz/check",
            Some("curator"),
            Some(json!({
                "kind": "assetfolder",
                "target": {
                    "site_id": "11111111-1111-1111-1111-111111111111",
                    "path": "/brand",
                    "assets": [],
                    "folders": [{
                        "site_id": "11111111-1111-1111-1111-111111111111",
                        "path": "/brand/approved",
                        "assets": [{
                            "site_id": "11111111-1111-1111-1111-111111111111",
                            "path": "/brand/approved/logo.png"
                        }],
                        "folders": []
                    }]
                }
            })),
        )
        .await?;
    assert_status(&resp, StatusCode::OK, "folder fallback check");
    assert_eq!(read_json(resp).await?["granted"], true);

    // an empty subtree stays invisible
    let resp = app
        .request(
            "POST",
            "/authz/check",
            Some("curator"),
            Some(json!({
                "kind": "assetfolder",
                "target": {
                    "site_id": "11111111-1111-1111-1111-111111111111",
                    "path": "/misc",
                    "assets": [],
                    "folders": []
                }
            })),
        )
        .await?;
    assert_eq!(read_json(resp).await?["granted"], false);

    Ok(())
}

#[tokio::test]
async fn principal_introspection_reflects_the_snapshot() -> Result<()> {
    let app = spawn_app().await?;
    let admin = app.create_user("admin").await?;
    app.assign_role(admin, SUPERUSER_ROLE_ID).await?;

    let resp = app.request("GET", "/authz/principals/admin", Some("admin"), None).await?;
    assert_status(&resp, StatusCode::OK, "self introspection");
    let summary = read_json(resp).await?;
    assert_eq!(summary["login"], "admin");
    assert_eq!(summary["roles"][0], "superuser");
    assert_eq!(summary["global"]["manage_access"], true);
    assert_eq!(summary["page_rules"], 1);

    // unknown logins resolve to an empty snapshot rather than an error
    let resp = app.request("GET", "/authz/principals/ghost", Some("admin"), None).await?;
    assert_status(&resp, StatusCode::OK, "unknown login introspection");
    let summary = read_json(resp).await?;
    assert_eq!(summary["roles"].as_array().map(|a| a.len()), Some(0));

    Ok(())
}
