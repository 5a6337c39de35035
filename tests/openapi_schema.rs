use anyhow::Result;
use warden::docs;

#[test]
fn openapi_document_carries_auth_and_servers() -> Result<()> {
    let doc = docs::build_openapi(8123)?;
    let value = serde_json::to_value(&doc)?;

    let scheme = value
        .pointer("/components/securitySchemes/bearerAuth/scheme")
        .and_then(|v| v.as_str());
    assert_eq!(scheme, Some("bearer"));

    let server = value
        .pointer("/servers/0/url")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    assert!(server.ends_with(":8123"));

    // the rule sum type must be part of the published schema
    assert!(value.pointer("/components/schemas/RuleDetail").is_some());

    // per-handler annotations register the API surface
    assert!(value.pointer("/paths/~1authz~1check/post").is_some());
    assert!(value.pointer("/paths/~1authz~1rules/post").is_some());
    Ok(())
}
