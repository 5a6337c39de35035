use serde_json::{json, Value};
use utoipa::OpenApi;

use crate::authz::{
    AssetGrants, DataGrants, GlobalGrants, MutationResult, PageGrants, PathMode, PrincipalSummary,
    Rule, RuleDetail, RuleDraft, RuleKind, SiteGrants, TemplateGrants,
};
use crate::models;
use crate::routes::health::HealthResponse;

#[derive(OpenApi)]
#[openapi(
	paths(
		crate::routes::health::health,
		crate::routes::roles::list_roles,
		crate::routes::roles::create_role,
		crate::routes::roles::get_role,
		crate::routes::roles::delete_role,
		crate::routes::rules::list_rules,
		crate::routes::rules::get_rule,
		crate::routes::rules::create_rule,
		crate::routes::rules::update_rule,
		crate::routes::rules::delete_rule,
		crate::routes::rules::validate_rule,
		crate::routes::checks::check,
		crate::routes::checks::principal_summary
	),
	components(
		schemas(
			HealthResponse,
			Rule,
			RuleDraft,
			RuleDetail,
			RuleKind,
			PathMode,
			GlobalGrants,
			SiteGrants,
			TemplateGrants,
			PageGrants,
			AssetGrants,
			DataGrants,
			MutationResult,
			PrincipalSummary,
			models::role::Role,
			models::role::RoleCreateRequest,
			models::user::UserRecord,
			models::resource::PageTarget,
			models::resource::AssetTarget,
			models::resource::AssetFolderTarget,
			models::resource::DataTarget,
			models::resource::DataFolderTarget,
			models::api::CheckRequest,
			models::api::CheckResponse,
			models::api::ValidateRuleResponse
		)
	),
	tags(
		(name = "Health", description = "Service health"),
		(name = "Roles", description = "Role administration"),
		(name = "Rules", description = "Access rule administration"),
		(name = "Checks", description = "Permission checks and principal introspection")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(&ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	ensure_global_security(&mut doc);
	ensure_openapi_version(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

fn ensure_security_components(doc: &mut Value) {
	let components = doc
		.as_object_mut()
		.map(|obj| obj.entry("components").or_insert_with(|| json!({})));
	if let Some(components) = components.and_then(|c| c.as_object_mut()) {
		let schemes = components.entry("securitySchemes").or_insert_with(|| json!({}));
		if let Some(schemes) = schemes.as_object_mut() {
			schemes.insert(
				"bearerAuth".to_string(),
				json!({
					"type": "http",
					"scheme": "bearer",
					"bearerFormat": "JWT"
				}),
			);
		}
	}
}

fn ensure_global_security(doc: &mut Value) {
	if doc.get("security").is_none() {
		doc["security"] = json!([{ "bearerAuth": [] }]);
	}
}

fn ensure_openapi_version(doc: &mut Value) {
	if let Some(obj) = doc.as_object_mut() {
		obj.entry("openapi").or_insert_with(|| json!("3.1.0"));
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	if doc.get("servers").is_none() {
		doc["servers"] = json!([{ "url": format!("http://localhost:{}", port) }]);
	}
}
