//! Scope matching: rule-vs-rule subsumption (used at rule creation time by
//! the escalation guard) and rule-vs-resource `applies` (used at decision
//! time by the grant aggregator). The two relations share the same
//! field and path/mode semantics but are deliberately separate functions.

use crate::authz::rule::{
    AssetGrants, DataGrants, PageGrants, PathMode, RuleDetail, RulePath, SiteGrants,
    TemplateGrants,
};
use crate::models::resource::{AssetTarget, DataTarget, PageTarget};

/// Non-path scope dimension subsumption. A null value is unscoped and
/// strictly broader than any concrete value; a concrete value only covers
/// the same concrete value.
fn field_subsumes<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
    match a {
        None => true,
        Some(av) => matches!(b, Some(bv) if av == bv),
    }
}

/// Non-path scope dimension match against a concrete resource field.
fn field_applies<T: PartialEq>(rule: &Option<T>, target: &T) -> bool {
    match rule {
        None => true,
        Some(v) => v == target,
    }
}

/// Does rule A's path+mode cover everything rule B's path+mode covers?
///
/// - `self` only covers an identical `self` scope.
/// - `selfandsub` covers anything rooted at or below its path.
/// - `sub` covers strict descendants, so it covers `self`/`selfandsub`
///   scopes strictly below it, and `sub` scopes at or below it.
pub fn mode_subsumes(
    a_path: &RulePath,
    a_mode: PathMode,
    b_path: &RulePath,
    b_mode: PathMode,
) -> bool {
    match a_mode {
        PathMode::SelfOnly => b_mode == PathMode::SelfOnly && a_path == b_path,
        PathMode::SelfAndSub => b_path.is_or_descends_from(a_path),
        PathMode::Sub => match b_mode {
            PathMode::SelfOnly | PathMode::SelfAndSub => b_path.descends_from(a_path),
            PathMode::Sub => b_path.is_or_descends_from(a_path),
        },
    }
}

/// Does a rule's path+mode cover one concrete resource path?
pub fn path_applies(rule_path: &RulePath, mode: PathMode, target: &RulePath) -> bool {
    match mode {
        PathMode::SelfOnly => rule_path == target,
        PathMode::Sub => target.descends_from(rule_path),
        PathMode::SelfAndSub => target.is_or_descends_from(rule_path),
    }
}

/// Rule-vs-rule subsumption: true iff every resource `b` could apply to is
/// also covered by `a`. Rules of different kinds never subsume each other.
pub fn subsumes(a: &RuleDetail, b: &RuleDetail) -> bool {
    match (a, b) {
        (RuleDetail::Global { .. }, RuleDetail::Global { .. }) => true,
        (
            RuleDetail::Site { site_id: a_site, .. },
            RuleDetail::Site { site_id: b_site, .. },
        ) => field_subsumes(a_site, b_site),
        (
            RuleDetail::Template { template_id: a_tpl, .. },
            RuleDetail::Template { template_id: b_tpl, .. },
        ) => field_subsumes(a_tpl, b_tpl),
        (
            RuleDetail::Page {
                site_id: a_site,
                pagetree_id: a_tree,
                path: a_path,
                mode: a_mode,
                ..
            },
            RuleDetail::Page {
                site_id: b_site,
                pagetree_id: b_tree,
                path: b_path,
                mode: b_mode,
                ..
            },
        ) => {
            field_subsumes(a_site, b_site)
                && field_subsumes(a_tree, b_tree)
                && mode_subsumes(a_path, *a_mode, b_path, *b_mode)
        }
        (
            RuleDetail::Asset { site_id: a_site, path: a_path, mode: a_mode, .. },
            RuleDetail::Asset { site_id: b_site, path: b_path, mode: b_mode, .. },
        ) => field_subsumes(a_site, b_site) && mode_subsumes(a_path, *a_mode, b_path, *b_mode),
        (
            RuleDetail::Data {
                site_id: a_site,
                template_id: a_tpl,
                path: a_path,
                mode: a_mode,
                ..
            },
            RuleDetail::Data {
                site_id: b_site,
                template_id: b_tpl,
                path: b_path,
                mode: b_mode,
                ..
            },
        ) => {
            field_subsumes(a_site, b_site)
                && field_subsumes(a_tpl, b_tpl)
                && mode_subsumes(a_path, *a_mode, b_path, *b_mode)
        }
        _ => false,
    }
}

/// Returns the rule's grants when it applies to the page, None otherwise.
pub fn applies_to_page<'r>(rule: &'r RuleDetail, target: &PageTarget) -> Option<&'r PageGrants> {
    match rule {
        RuleDetail::Page { site_id, pagetree_id, path, mode, grants } => {
            (field_applies(site_id, &target.site_id)
                && field_applies(pagetree_id, &target.pagetree_id)
                && path_applies(path, *mode, &target.path))
            .then_some(grants)
        }
        _ => None,
    }
}

pub fn applies_to_asset<'r>(rule: &'r RuleDetail, target: &AssetTarget) -> Option<&'r AssetGrants> {
    match rule {
        RuleDetail::Asset { site_id, path, mode, grants } => {
            (field_applies(site_id, &target.site_id) && path_applies(path, *mode, &target.path))
                .then_some(grants)
        }
        _ => None,
    }
}

pub fn applies_to_data<'r>(rule: &'r RuleDetail, target: &DataTarget) -> Option<&'r DataGrants> {
    match rule {
        RuleDetail::Data { site_id, template_id, path, mode, grants } => {
            let site_ok = match (site_id, &target.site_id) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(rule_site), Some(target_site)) => rule_site == target_site,
            };
            (site_ok
                && field_applies(template_id, &target.template_id)
                && path_applies(path, *mode, &target.path))
            .then_some(grants)
        }
        _ => None,
    }
}

pub fn applies_to_site<'r>(rule: &'r RuleDetail, site_id: &uuid::Uuid) -> Option<&'r SiteGrants> {
    match rule {
        RuleDetail::Site { site_id: rule_site, grants } => {
            field_applies(rule_site, site_id).then_some(grants)
        }
        _ => None,
    }
}

pub fn applies_to_template<'r>(
    rule: &'r RuleDetail,
    template_id: &uuid::Uuid,
) -> Option<&'r TemplateGrants> {
    match rule {
        RuleDetail::Template { template_id: rule_tpl, grants } => {
            field_applies(rule_tpl, template_id).then_some(grants)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn p(raw: &str) -> RulePath {
        RulePath::normalize(raw)
    }

    #[test]
    fn mode_matrix_self_column() {
        // A=self covers only an identical self scope
        assert!(mode_subsumes(&p("/a"), PathMode::SelfOnly, &p("/a"), PathMode::SelfOnly));
        assert!(!mode_subsumes(&p("/a"), PathMode::SelfOnly, &p("/a/b"), PathMode::SelfOnly));
        assert!(!mode_subsumes(&p("/a"), PathMode::SelfOnly, &p("/a"), PathMode::SelfAndSub));
        assert!(!mode_subsumes(&p("/a"), PathMode::SelfOnly, &p("/a"), PathMode::Sub));
    }

    #[test]
    fn mode_matrix_selfandsub_column() {
        for b_mode in [PathMode::SelfOnly, PathMode::SelfAndSub, PathMode::Sub] {
            assert!(mode_subsumes(&p("/a"), PathMode::SelfAndSub, &p("/a"), b_mode));
            assert!(mode_subsumes(&p("/a"), PathMode::SelfAndSub, &p("/a/b"), b_mode));
            assert!(!mode_subsumes(&p("/a"), PathMode::SelfAndSub, &p("/b"), b_mode));
        }
    }

    #[test]
    fn mode_matrix_sub_column() {
        // sub excludes the rule path itself for self/selfandsub scopes...
        assert!(!mode_subsumes(&p("/a"), PathMode::Sub, &p("/a"), PathMode::SelfOnly));
        assert!(!mode_subsumes(&p("/a"), PathMode::Sub, &p("/a"), PathMode::SelfAndSub));
        assert!(mode_subsumes(&p("/a"), PathMode::Sub, &p("/a/b"), PathMode::SelfOnly));
        assert!(mode_subsumes(&p("/a"), PathMode::Sub, &p("/a/b"), PathMode::SelfAndSub));
        // ...but covers a sub scope at the same path
        assert!(mode_subsumes(&p("/a"), PathMode::Sub, &p("/a"), PathMode::Sub));
        assert!(mode_subsumes(&p("/a"), PathMode::Sub, &p("/a/b"), PathMode::Sub));
        assert!(!mode_subsumes(&p("/a"), PathMode::Sub, &p("/b"), PathMode::Sub));
    }

    #[test]
    fn null_site_is_broader() {
        let broad = RuleDetail::Site { site_id: None, grants: SiteGrants::default() };
        let narrow = RuleDetail::Site { site_id: Some(Uuid::new_v4()), grants: SiteGrants::default() };
        assert!(subsumes(&broad, &narrow));
        assert!(!subsumes(&narrow, &broad));
        assert!(subsumes(&narrow, &narrow));
    }

    #[test]
    fn different_kinds_never_subsume() {
        let site = RuleDetail::Site { site_id: None, grants: SiteGrants::default() };
        let global = RuleDetail::Global { grants: Default::default() };
        assert!(!subsumes(&site, &global));
        assert!(!subsumes(&global, &site));
    }

    #[test]
    fn page_applies_respects_every_dimension() {
        let site = Uuid::new_v4();
        let tree = Uuid::new_v4();
        let rule = RuleDetail::Page {
            site_id: Some(site),
            pagetree_id: None,
            path: p("/news"),
            mode: PathMode::SelfAndSub,
            grants: PageGrants { update: true, ..Default::default() },
        };
        let mut target = PageTarget {
            site_id: site,
            pagetree_id: tree,
            path: p("/news/2026"),
            published: true,
        };
        assert!(applies_to_page(&rule, &target).is_some_and(|g| g.update));

        target.site_id = Uuid::new_v4();
        assert!(applies_to_page(&rule, &target).is_none());

        target.site_id = site;
        target.path = p("/about");
        assert!(applies_to_page(&rule, &target).is_none());
    }

    #[test]
    fn data_rule_with_site_scope_skips_global_data() {
        let rule = RuleDetail::Data {
            site_id: Some(Uuid::new_v4()),
            template_id: None,
            path: p("/"),
            mode: PathMode::SelfAndSub,
            grants: DataGrants { update: true, ..Default::default() },
        };
        let target = DataTarget {
            site_id: None,
            template_id: Uuid::new_v4(),
            path: p("/entries/x"),
            published: false,
        };
        assert!(applies_to_data(&rule, &target).is_none());
    }
}
