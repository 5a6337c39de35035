//! The permission facade: per-kind `may_*` decisions over a resolved
//! [`AuthInfo`] snapshot. Pure OR-aggregation with deny-by-default — no
//! applicable rule means no, multiple applicable rules are a union of
//! grants, and a broader rule never restricts a narrower one.
//!
//! Everything here is synchronous; I/O happened when the snapshot was
//! resolved. Site-scoped checks additionally take the fresh null-site rule
//! overlay maintained by the global-scope sub-cache.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::principal::AuthInfo;
use crate::authz::rule::{AssetGrants, DataGrants, PageGrants, Rule, SiteGrants};
use crate::authz::scope::{
    applies_to_asset, applies_to_data, applies_to_page, applies_to_site, applies_to_template,
};
use crate::models::resource::{
    AssetFolderTarget, AssetTarget, DataFolderTarget, DataTarget, PageTarget,
};

/// Folder-view fallback recursion bound. Content schemas today nest
/// shallowly; the explicit bound keeps the recursion finite if that ever
/// changes.
pub const MAX_FOLDER_DEPTH: usize = 8;

/// How asset `view`/`viewForEdit` derive from the stored grant flags, since
/// asset rules carry no explicit view column. The default treats an
/// applicable rule with any grant as view-capable (`viewForEdit` implied by
/// any grant, `view` implied by `viewForEdit`); `FolderContainment` limits
/// direct asset visibility to the folder fallback path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AssetViewDerivation {
    #[default]
    AnyGrant,
    FolderContainment,
}

impl AssetViewDerivation {
    fn view_for_edit(&self, grants: &AssetGrants) -> bool {
        match self {
            AssetViewDerivation::AnyGrant => grants.any(),
            AssetViewDerivation::FolderContainment => false,
        }
    }
}

impl AuthInfo {
    // ---- pages ----------------------------------------------------------

    fn page_grant(&self, target: &PageTarget, pick: impl Fn(&PageGrants) -> bool) -> bool {
        self.page_rules
            .iter()
            .filter_map(|r| applies_to_page(&r.detail, target))
            .any(|g| pick(g))
    }

    /// Published pages are visible to anyone an applicable rule reaches;
    /// the latest (draft) version additionally needs `viewlatest`.
    pub fn may_view_page(&self, target: &PageTarget) -> bool {
        if target.published {
            self.page_grant(target, |_| true)
        } else {
            self.page_grant(target, |g| g.viewlatest)
        }
    }

    pub fn may_view_page_for_edit(&self, target: &PageTarget) -> bool {
        self.page_grant(target, |g| g.viewlatest || g.update)
    }

    pub fn may_update_page(&self, target: &PageTarget) -> bool {
        self.page_grant(target, |g| g.update)
    }

    pub fn may_move_page(&self, target: &PageTarget) -> bool {
        self.page_grant(target, |g| g.r#move)
    }

    /// `target` is the parent under which the new page would be created.
    pub fn may_create_page(&self, target: &PageTarget) -> bool {
        self.page_grant(target, |g| g.create)
    }

    pub fn may_publish_page(&self, target: &PageTarget) -> bool {
        self.page_grant(target, |g| g.publish)
    }

    pub fn may_unpublish_page(&self, target: &PageTarget) -> bool {
        self.page_grant(target, |g| g.unpublish)
    }

    pub fn may_delete_page(&self, target: &PageTarget) -> bool {
        self.page_grant(target, |g| g.delete)
    }

    pub fn may_undelete_page(&self, target: &PageTarget) -> bool {
        self.page_grant(target, |g| g.undelete)
    }

    // ---- assets ---------------------------------------------------------

    fn asset_grant(&self, target: &AssetTarget, pick: impl Fn(&AssetGrants) -> bool) -> bool {
        self.asset_rules
            .iter()
            .filter_map(|r| applies_to_asset(&r.detail, target))
            .any(|g| pick(g))
    }

    pub fn may_view_asset(&self, target: &AssetTarget, derivation: AssetViewDerivation) -> bool {
        self.may_view_asset_for_edit(target, derivation)
    }

    pub fn may_view_asset_for_edit(
        &self,
        target: &AssetTarget,
        derivation: AssetViewDerivation,
    ) -> bool {
        self.asset_grant(target, |g| derivation.view_for_edit(g))
    }

    pub fn may_create_asset(&self, target: &AssetTarget) -> bool {
        self.asset_grant(target, |g| g.create)
    }

    pub fn may_update_asset(&self, target: &AssetTarget) -> bool {
        self.asset_grant(target, |g| g.update)
    }

    pub fn may_move_asset(&self, target: &AssetTarget) -> bool {
        self.asset_grant(target, |g| g.r#move)
    }

    pub fn may_delete_asset(&self, target: &AssetTarget) -> bool {
        self.asset_grant(target, |g| g.delete)
    }

    pub fn may_undelete_asset(&self, target: &AssetTarget) -> bool {
        self.asset_grant(target, |g| g.undelete)
    }

    /// A folder is viewable with a direct view-capable rule, or when
    /// anything beneath it is viewable — so a principal can navigate down
    /// to the one item they can see without blanket folder visibility.
    pub fn may_view_asset_folder(
        &self,
        folder: &AssetFolderTarget,
        derivation: AssetViewDerivation,
    ) -> bool {
        self.asset_folder_view(folder, derivation, 0)
    }

    fn asset_folder_view(
        &self,
        folder: &AssetFolderTarget,
        derivation: AssetViewDerivation,
        depth: usize,
    ) -> bool {
        if depth > MAX_FOLDER_DEPTH {
            return false;
        }
        let as_target = AssetTarget { site_id: folder.site_id, path: folder.path.clone() };
        if self.asset_grant(&as_target, |g| g.any()) {
            return true;
        }
        folder.assets.iter().any(|a| self.may_view_asset(a, derivation))
            || folder
                .folders
                .iter()
                .any(|f| self.asset_folder_view(f, derivation, depth + 1))
    }

    // ---- data -----------------------------------------------------------

    fn data_grant(&self, target: &DataTarget, pick: impl Fn(&DataGrants) -> bool) -> bool {
        self.data_rules
            .iter()
            .filter_map(|r| applies_to_data(&r.detail, target))
            .any(|g| pick(g))
    }

    pub fn may_view_data(&self, target: &DataTarget) -> bool {
        if target.published {
            self.data_grant(target, |_| true)
        } else {
            self.data_grant(target, |g| g.viewlatest)
        }
    }

    pub fn may_view_data_for_edit(&self, target: &DataTarget) -> bool {
        self.data_grant(target, |g| g.viewlatest || g.update)
    }

    pub fn may_create_data(&self, target: &DataTarget) -> bool {
        self.data_grant(target, |g| g.create)
    }

    pub fn may_update_data(&self, target: &DataTarget) -> bool {
        self.data_grant(target, |g| g.update)
    }

    pub fn may_move_data(&self, target: &DataTarget) -> bool {
        self.data_grant(target, |g| g.r#move)
    }

    pub fn may_publish_data(&self, target: &DataTarget) -> bool {
        self.data_grant(target, |g| g.publish)
    }

    pub fn may_unpublish_data(&self, target: &DataTarget) -> bool {
        self.data_grant(target, |g| g.unpublish)
    }

    pub fn may_delete_data(&self, target: &DataTarget) -> bool {
        self.data_grant(target, |g| g.delete)
    }

    pub fn may_undelete_data(&self, target: &DataTarget) -> bool {
        self.data_grant(target, |g| g.undelete)
    }

    /// Data folders nest one level: the folder, then entries.
    pub fn may_view_data_folder(&self, folder: &DataFolderTarget) -> bool {
        let as_target = DataTarget {
            site_id: folder.site_id,
            template_id: folder.template_id,
            path: folder.path.clone(),
            published: false,
        };
        if self.data_grant(&as_target, |g| g.any()) {
            return true;
        }
        folder.entries.iter().any(|e| self.may_view_data(e))
    }

    // ---- sites ----------------------------------------------------------

    /// Site checks merge the principal's concretely-scoped site rules with
    /// the fresh null-site overlay (filtered to the principal's roles) so
    /// a granted or revoked all-sites rule shows up within the sub-cache
    /// TTL rather than the snapshot freshness window.
    fn site_grant(
        &self,
        overlay: &[Rule],
        site_id: Uuid,
        pick: impl Fn(&SiteGrants) -> bool,
    ) -> bool {
        let own = self
            .site_rules
            .iter()
            .filter(|r| !r.detail.is_global_site_scope());
        let overlaid = overlay.iter().filter(|r| self.holds_role(r.role_id));
        own.chain(overlaid)
            .filter_map(|r| applies_to_site(&r.detail, &site_id))
            .any(|g| pick(g))
    }

    pub fn may_launch_site(&self, overlay: &[Rule], site_id: Uuid) -> bool {
        self.site_grant(overlay, site_id, |g| g.launch)
    }

    pub fn may_rename_site(&self, overlay: &[Rule], site_id: Uuid) -> bool {
        self.site_grant(overlay, site_id, |g| g.rename)
    }

    pub fn may_manage_site_owners(&self, overlay: &[Rule], site_id: Uuid) -> bool {
        self.site_grant(overlay, site_id, |g| g.manage_owners)
    }

    pub fn may_manage_pagetrees(&self, overlay: &[Rule], site_id: Uuid) -> bool {
        self.site_grant(overlay, site_id, |g| g.manage_pagetrees)
    }

    pub fn may_promote_pagetree(&self, overlay: &[Rule], site_id: Uuid) -> bool {
        self.site_grant(overlay, site_id, |g| g.promote_pagetree)
    }

    pub fn may_delete_site(&self, overlay: &[Rule], site_id: Uuid) -> bool {
        self.site_grant(overlay, site_id, |g| g.delete)
    }

    pub fn may_undelete_site(&self, overlay: &[Rule], site_id: Uuid) -> bool {
        self.site_grant(overlay, site_id, |g| g.undelete)
    }

    // ---- templates ------------------------------------------------------

    pub fn may_use_template(&self, template_id: Uuid) -> bool {
        self.template_rules
            .iter()
            .filter_map(|r| applies_to_template(&r.detail, &template_id))
            .any(|g| g.r#use)
    }

    // ---- global ---------------------------------------------------------

    pub fn may_manage_access(&self) -> bool {
        self.global.manage_access
    }

    pub fn may_manage_parent_roles(&self) -> bool {
        self.global.manage_parent_roles
    }

    pub fn may_create_sites(&self) -> bool {
        self.global.create_sites
    }

    pub fn may_manage_global_data(&self) -> bool {
        self.global.manage_global_data
    }

    pub fn may_manage_templates(&self) -> bool {
        self.global.manage_templates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::rule::{PathMode, RuleDetail, RulePath};

    fn page_rule(role_id: Uuid, path: &str, grants: PageGrants) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            role_id,
            detail: RuleDetail::Page {
                site_id: None,
                pagetree_id: None,
                path: RulePath::normalize(path),
                mode: PathMode::SelfAndSub,
                grants,
            },
        }
    }

    fn page(path: &str, published: bool) -> PageTarget {
        PageTarget {
            site_id: Uuid::new_v4(),
            pagetree_id: Uuid::new_v4(),
            path: RulePath::normalize(path),
            published,
        }
    }

    #[test]
    fn aggregation_is_a_pure_or() {
        let mut info = AuthInfo::empty("editor");
        let role = Uuid::new_v4();
        info.page_rules.push(page_rule(role, "/a", PageGrants::default()));
        info.page_rules.push(page_rule(
            role,
            "/a",
            PageGrants { update: true, ..Default::default() },
        ));
        // one matching rule without the grant, one with it: union wins
        assert!(info.may_update_page(&page("/a/b", true)));
        // no matching rule at all: deny by default
        assert!(!info.may_update_page(&page("/elsewhere", true)));
    }

    #[test]
    fn anonymous_views_published_pages_only() {
        let anon = AuthInfo::anonymous();
        assert!(anon.may_view_page(&page("/news/today", true)));
        assert!(!anon.may_view_page(&page("/news/today", false)));
        assert!(!anon.may_update_page(&page("/news/today", true)));
        let asset = AssetTarget {
            site_id: Uuid::new_v4(),
            path: RulePath::normalize("/uploads/logo.png"),
        };
        assert!(!anon.may_view_asset(&asset, AssetViewDerivation::default()));
    }

    #[test]
    fn render_sees_latest_everywhere() {
        let render = AuthInfo::render();
        assert!(render.may_view_page(&page("/draft", false)));
        let asset = AssetTarget {
            site_id: Uuid::new_v4(),
            path: RulePath::normalize("/uploads/logo.png"),
        };
        assert!(render.may_view_asset(&asset, AssetViewDerivation::default()));
        let data = DataTarget {
            site_id: None,
            template_id: Uuid::new_v4(),
            path: RulePath::normalize("/articles/x"),
            published: false,
        };
        assert!(render.may_view_data(&data));
    }

    #[test]
    fn folder_view_falls_back_to_contained_items() {
        let site = Uuid::new_v4();
        let template = Uuid::new_v4();
        let mut info = AuthInfo::empty("viewer");
        info.data_rules.push(Rule {
            id: Uuid::new_v4(),
            role_id: Uuid::new_v4(),
            detail: RuleDetail::Data {
                site_id: Some(site),
                template_id: Some(template),
                path: RulePath::normalize("/articles/launch"),
                mode: PathMode::SelfOnly,
                grants: DataGrants { viewlatest: true, ..Default::default() },
            },
        });

        let visible_entry = DataTarget {
            site_id: Some(site),
            template_id: template,
            path: RulePath::normalize("/articles/launch"),
            published: false,
        };
        let hidden_entry = DataTarget {
            site_id: Some(site),
            template_id: template,
            path: RulePath::normalize("/articles/secret"),
            published: false,
        };

        let folder = DataFolderTarget {
            site_id: Some(site),
            template_id: template,
            path: RulePath::normalize("/articles"),
            entries: vec![hidden_entry.clone(), visible_entry],
        };
        assert!(info.may_view_data_folder(&folder));

        let folder = DataFolderTarget {
            site_id: Some(site),
            template_id: template,
            path: RulePath::normalize("/articles"),
            entries: vec![hidden_entry],
        };
        assert!(!info.may_view_data_folder(&folder));
    }

    #[test]
    fn asset_folder_recursion_is_depth_bounded() {
        let site = Uuid::new_v4();
        let mut info = AuthInfo::empty("viewer");
        info.asset_rules.push(Rule {
            id: Uuid::new_v4(),
            role_id: Uuid::new_v4(),
            detail: RuleDetail::Asset {
                site_id: Some(site),
                path: RulePath::normalize("/deep/leaf.png"),
                mode: PathMode::SelfOnly,
                grants: AssetGrants { update: true, ..Default::default() },
            },
        });

        // the visible asset sits MAX_FOLDER_DEPTH + 2 folders down
        let mut folder = AssetFolderTarget {
            site_id: site,
            path: RulePath::normalize("/deep"),
            assets: vec![AssetTarget { site_id: site, path: RulePath::normalize("/deep/leaf.png") }],
            folders: vec![],
        };
        for _ in 0..(MAX_FOLDER_DEPTH + 1) {
            folder = AssetFolderTarget {
                site_id: site,
                path: RulePath::normalize("/deep"),
                assets: vec![],
                folders: vec![folder],
            };
        }
        assert!(!info.may_view_asset_folder(&folder, AssetViewDerivation::default()));

        // within the bound the fallback finds it
        let shallow = AssetFolderTarget {
            site_id: site,
            path: RulePath::normalize("/deep"),
            assets: vec![AssetTarget { site_id: site, path: RulePath::normalize("/deep/leaf.png") }],
            folders: vec![],
        };
        assert!(info.may_view_asset_folder(&shallow, AssetViewDerivation::default()));
    }

    #[test]
    fn site_checks_use_the_overlay() {
        let site = Uuid::new_v4();
        let role = Uuid::new_v4();
        let mut info = AuthInfo::empty("manager");
        info.roles.push(crate::models::role::Role {
            id: role,
            name: "site-manager".into(),
            description: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        });

        // a stale null-site rule in the snapshot is ignored in favor of the overlay
        info.site_rules.push(Rule {
            id: Uuid::new_v4(),
            role_id: role,
            detail: RuleDetail::Site {
                site_id: None,
                grants: SiteGrants { launch: true, ..Default::default() },
            },
        });
        assert!(!info.may_launch_site(&[], site));

        let overlay = vec![Rule {
            id: Uuid::new_v4(),
            role_id: role,
            detail: RuleDetail::Site {
                site_id: None,
                grants: SiteGrants { launch: true, ..Default::default() },
            },
        }];
        assert!(info.may_launch_site(&overlay, site));

        // overlay rules for roles the principal doesn't hold are invisible
        let foreign = vec![Rule {
            id: Uuid::new_v4(),
            role_id: Uuid::new_v4(),
            detail: RuleDetail::Site {
                site_id: None,
                grants: SiteGrants { launch: true, ..Default::default() },
            },
        }];
        assert!(!info.may_launch_site(&foreign, site));
    }
}
