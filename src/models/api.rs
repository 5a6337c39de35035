//! Request/response shapes for the authorization API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::RuleDetail;
use crate::models::resource::{
    AssetFolderTarget, AssetTarget, DataFolderTarget, DataTarget, PageTarget,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RuleUpdateRequest {
    #[serde(flatten)]
    pub detail: RuleDetail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PageAction {
    View,
    #[serde(rename = "viewforedit")]
    ViewForEdit,
    Update,
    Move,
    Create,
    Publish,
    Unpublish,
    Delete,
    Undelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AssetAction {
    View,
    #[serde(rename = "viewforedit")]
    ViewForEdit,
    Create,
    Update,
    Move,
    Delete,
    Undelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DataAction {
    View,
    #[serde(rename = "viewforedit")]
    ViewForEdit,
    Create,
    Update,
    Move,
    Publish,
    Unpublish,
    Delete,
    Undelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SiteAction {
    Launch,
    Rename,
    #[serde(rename = "manageowners")]
    ManageOwners,
    #[serde(rename = "managepagetrees")]
    ManagePagetrees,
    #[serde(rename = "promotepagetree")]
    PromotePagetree,
    Delete,
    Undelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GlobalAction {
    #[serde(rename = "manageaccess")]
    ManageAccess,
    #[serde(rename = "manageparentroles")]
    ManageParentRoles,
    #[serde(rename = "createsites")]
    CreateSites,
    #[serde(rename = "manageglobaldata")]
    ManageGlobalData,
    #[serde(rename = "managetemplates")]
    ManageTemplates,
}

/// One permission question: a kind-tagged target plus the action to test.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CheckTarget {
    Page {
        action: PageAction,
        target: PageTarget,
    },
    Asset {
        action: AssetAction,
        target: AssetTarget,
    },
    #[serde(rename = "assetfolder")]
    AssetFolder {
        target: AssetFolderTarget,
    },
    Data {
        action: DataAction,
        target: DataTarget,
    },
    #[serde(rename = "datafolder")]
    DataFolder {
        target: DataFolderTarget,
    },
    Site {
        action: SiteAction,
        site_id: Uuid,
    },
    Template {
        template_id: Uuid,
    },
    Global {
        action: GlobalAction,
    },
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckRequest {
    /// Check on behalf of another login; requires `manage_access`.
    /// Defaults to the caller's own principal.
    #[serde(default)]
    pub login: Option<String>,
    #[serde(flatten)]
    pub check: CheckTarget,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckResponse {
    pub granted: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateRuleResponse {
    /// True when the candidate grants more than the caller's own access.
    pub too_powerful: bool,
}
