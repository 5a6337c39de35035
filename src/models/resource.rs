//! Concrete resource descriptors handed to the kernel by the resource
//! layer. These carry exactly the scope-relevant fields a rule is matched
//! against; hydration from content storage happens outside this service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::RulePath;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PageTarget {
    pub site_id: Uuid,
    pub pagetree_id: Uuid,
    pub path: RulePath,
    /// Whether the currently requested version is the published one.
    /// Unpublished (latest/draft) content needs `viewlatest` to view.
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssetTarget {
    pub site_id: Uuid,
    pub path: RulePath,
}

/// A folder snapshot for the view fallback: a folder is viewable when any
/// item beneath it is, even without a direct grant. The resource layer
/// hydrates the subtree; the kernel walks it to a bounded depth.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssetFolderTarget {
    pub site_id: Uuid,
    pub path: RulePath,
    #[serde(default)]
    pub assets: Vec<AssetTarget>,
    #[serde(default)]
    pub folders: Vec<AssetFolderTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DataTarget {
    /// None for global data entries that belong to no site.
    pub site_id: Option<Uuid>,
    pub template_id: Uuid,
    pub path: RulePath,
    #[serde(default)]
    pub published: bool,
}

/// Data folders nest at most one level: a folder and its entries.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DataFolderTarget {
    pub site_id: Option<Uuid>,
    pub template_id: Uuid,
    pub path: RulePath,
    #[serde(default)]
    pub entries: Vec<DataTarget>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct SiteTarget {
    pub id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct TemplateTarget {
    pub id: Uuid,
}
