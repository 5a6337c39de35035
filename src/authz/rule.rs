use std::fmt;
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

/// The six rule kinds. Every persisted rule is exactly one of these; the
/// scope and grant payloads live in [`RuleDetail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Global,
    Site,
    Template,
    Page,
    Asset,
    Data,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Global => "global",
            RuleKind::Site => "site",
            RuleKind::Template => "template",
            RuleKind::Page => "page",
            RuleKind::Asset => "asset",
            RuleKind::Data => "data",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(RuleKind::Global),
            "site" => Ok(RuleKind::Site),
            "template" => Ok(RuleKind::Template),
            "page" => Ok(RuleKind::Page),
            "asset" => Ok(RuleKind::Asset),
            "data" => Ok(RuleKind::Data),
            other => Err(format!("unknown rule kind: {other}")),
        }
    }
}

/// Inheritance mode for path-scoped rules: the named resource only, its
/// descendants only, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PathMode {
    #[serde(rename = "self")]
    SelfOnly,
    #[serde(rename = "sub")]
    Sub,
    #[serde(rename = "selfandsub")]
    SelfAndSub,
}

impl PathMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathMode::SelfOnly => "self",
            PathMode::Sub => "sub",
            PathMode::SelfAndSub => "selfandsub",
        }
    }
}

impl FromStr for PathMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self" => Ok(PathMode::SelfOnly),
            "sub" => Ok(PathMode::Sub),
            "selfandsub" => Ok(PathMode::SelfAndSub),
            other => Err(format!("unknown path mode: {other}")),
        }
    }
}

/// A normalized resource path: absolute, no trailing slash except root,
/// no duplicate separators. Rules and targets are always compared through
/// this type so the invariant holds at every comparison site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[schema(value_type = String, example = "/site-a/about")]
pub struct RulePath(String);

impl RulePath {
    pub fn root() -> Self {
        RulePath("/".to_string())
    }

    /// Normalize an incoming path. Accepts anything a caller might hand us
    /// ("about/", "//a//b", "") and produces the canonical absolute form.
    pub fn normalize(raw: &str) -> Self {
        let mut out = String::with_capacity(raw.len() + 1);
        for segment in raw.split('/').filter(|s| !s.is_empty()) {
            out.push('/');
            out.push_str(segment);
        }
        if out.is_empty() {
            out.push('/');
        }
        RulePath(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Segment-aware prefix containment: "/a" contains "/a" and "/a/b" but
    /// not "/ab". Root contains everything.
    pub fn is_or_descends_from(&self, ancestor: &RulePath) -> bool {
        if ancestor.is_root() {
            return true;
        }
        self.0 == ancestor.0
            || (self.0.len() > ancestor.0.len()
                && self.0.starts_with(&ancestor.0)
                && self.0.as_bytes()[ancestor.0.len()] == b'/')
    }

    /// Strict descendant test (excludes the path itself).
    pub fn descends_from(&self, ancestor: &RulePath) -> bool {
        self.0 != ancestor.0 && self.is_or_descends_from(ancestor)
    }
}

impl fmt::Display for RulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RulePath {
    fn from(raw: &str) -> Self {
        RulePath::normalize(raw)
    }
}

impl<'de> Deserialize<'de> for RulePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.trim().is_empty() {
            return Err(D::Error::custom("path must not be empty"));
        }
        Ok(RulePath::normalize(&raw))
    }
}

macro_rules! grant_set {
    ($(#[$doc:meta])* $name:ident { $($field:ident),+ $(,)? }) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
        #[serde(default)]
        pub struct $name {
            $(pub $field: bool,)+
        }

        impl $name {
            /// Every flag on.
            pub fn all() -> Self {
                Self { $($field: true,)+ }
            }

            /// OR-merge `other` into `self`.
            pub fn union(&mut self, other: &Self) {
                $(self.$field |= other.$field;)+
            }

            /// True iff every flag set on `other` is also set on `self`.
            pub fn covers(&self, other: &Self) -> bool {
                $((self.$field || !other.$field))&&+
            }

            /// True iff at least one flag is set.
            pub fn any(&self) -> bool {
                $(self.$field)||+
            }
        }
    };
}

grant_set! {
    /// Grants carried by a global rule. Global rules have no scope.
    GlobalGrants {
        manage_access,
        manage_parent_roles,
        create_sites,
        manage_global_data,
        manage_templates,
    }
}

grant_set! {
    SiteGrants {
        launch,
        rename,
        manage_owners,
        manage_pagetrees,
        promote_pagetree,
        delete,
        undelete,
    }
}

grant_set! {
    TemplateGrants {
        r#use,
    }
}

grant_set! {
    PageGrants {
        viewlatest,
        update,
        r#move,
        create,
        publish,
        unpublish,
        delete,
        undelete,
    }
}

grant_set! {
    /// Asset rules carry no explicit view flag; view is derived (see
    /// `AssetViewDerivation`).
    AssetGrants {
        create,
        update,
        r#move,
        delete,
        undelete,
    }
}

grant_set! {
    DataGrants {
        viewlatest,
        create,
        update,
        r#move,
        publish,
        unpublish,
        delete,
        undelete,
    }
}

/// Kind-specific scope and grants of a rule. The `kind` tag is the
/// discriminant on the wire and in the `rules` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuleDetail {
    Global {
        grants: GlobalGrants,
    },
    Site {
        /// None means the rule applies to every site.
        site_id: Option<Uuid>,
        grants: SiteGrants,
    },
    Template {
        /// None means the rule applies to every template.
        template_id: Option<Uuid>,
        grants: TemplateGrants,
    },
    Page {
        site_id: Option<Uuid>,
        pagetree_id: Option<Uuid>,
        path: RulePath,
        mode: PathMode,
        grants: PageGrants,
    },
    Asset {
        site_id: Option<Uuid>,
        path: RulePath,
        mode: PathMode,
        grants: AssetGrants,
    },
    Data {
        site_id: Option<Uuid>,
        template_id: Option<Uuid>,
        path: RulePath,
        mode: PathMode,
        grants: DataGrants,
    },
}

impl RuleDetail {
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleDetail::Global { .. } => RuleKind::Global,
            RuleDetail::Site { .. } => RuleKind::Site,
            RuleDetail::Template { .. } => RuleKind::Template,
            RuleDetail::Page { .. } => RuleKind::Page,
            RuleDetail::Asset { .. } => RuleKind::Asset,
            RuleDetail::Data { .. } => RuleKind::Data,
        }
    }

    /// True for site rules that apply to every site. These are the rules
    /// the short-TTL sub-cache tracks, and any mutation touching one must
    /// clear that cache proactively.
    pub fn is_global_site_scope(&self) -> bool {
        matches!(self, RuleDetail::Site { site_id: None, .. })
    }
}

/// A persisted rule: identity, owning role, and kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Rule {
    pub id: Uuid,
    pub role_id: Uuid,
    #[serde(flatten)]
    pub detail: RuleDetail,
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        self.detail.kind()
    }
}

impl Loggable for Rule {
    fn entity_type() -> &'static str {
        "rule"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

/// A candidate rule before it has an identity: what the mutation facade
/// validates against the escalation guard and then persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RuleDraft {
    pub role_id: Uuid,
    #[serde(flatten)]
    pub detail: RuleDetail,
}
