//! The "at least as powerful" relation between rules and the escalation
//! guard built on it: a principal may only author rules whose every grant
//! is already backed by an equal-or-broader rule they hold themselves.

use crate::authz::principal::AuthInfo;
use crate::authz::rule::{
    AssetGrants, DataGrants, PageGrants, RuleDetail, SiteGrants, TemplateGrants,
};
use crate::authz::scope;

/// True iff `a`'s scope covers everything `b`'s scope covers. Reflexive by
/// construction. Not a total order: rules differing on several scope
/// dimensions can be mutually incomparable, so callers must only rely on
/// pairwise results. Global rules carry no scope and always compare true
/// against each other.
pub fn as_or_more_powerful(a: &RuleDetail, b: &RuleDetail) -> bool {
    scope::subsumes(a, b)
}

/// Escalation guard. Returns true when `candidate` grants anything not
/// already covered by the OR-merge of the principal's own equal-or-broader
/// rules of the same kind. A true result is an expected validation outcome,
/// not a system error.
pub fn too_powerful(candidate: &RuleDetail, principal: &AuthInfo) -> bool {
    match candidate {
        // Global rules always apply, so the guard reduces to coverage of
        // the principal's pre-merged global grants.
        RuleDetail::Global { grants } => !principal.global.covers(grants),
        RuleDetail::Site { grants, .. } => {
            let mut aggregate = SiteGrants::default();
            for rule in covering(candidate, principal) {
                if let RuleDetail::Site { grants, .. } = &rule.detail {
                    aggregate.union(grants);
                }
            }
            !aggregate.covers(grants)
        }
        RuleDetail::Template { grants, .. } => {
            let mut aggregate = TemplateGrants::default();
            for rule in covering(candidate, principal) {
                if let RuleDetail::Template { grants, .. } = &rule.detail {
                    aggregate.union(grants);
                }
            }
            !aggregate.covers(grants)
        }
        RuleDetail::Page { grants, .. } => {
            let mut aggregate = PageGrants::default();
            for rule in covering(candidate, principal) {
                if let RuleDetail::Page { grants, .. } = &rule.detail {
                    aggregate.union(grants);
                }
            }
            !aggregate.covers(grants)
        }
        RuleDetail::Asset { grants, .. } => {
            let mut aggregate = AssetGrants::default();
            for rule in covering(candidate, principal) {
                if let RuleDetail::Asset { grants, .. } = &rule.detail {
                    aggregate.union(grants);
                }
            }
            !aggregate.covers(grants)
        }
        RuleDetail::Data { grants, .. } => {
            let mut aggregate = DataGrants::default();
            for rule in covering(candidate, principal) {
                if let RuleDetail::Data { grants, .. } = &rule.detail {
                    aggregate.union(grants);
                }
            }
            !aggregate.covers(grants)
        }
    }
}

/// The principal's rules whose scope covers everything the candidate's
/// scope covers.
fn covering<'a>(
    candidate: &'a RuleDetail,
    principal: &'a AuthInfo,
) -> impl Iterator<Item = &'a crate::authz::rule::Rule> {
    principal
        .rules_of_kind(candidate)
        .iter()
        .filter(move |rule| as_or_more_powerful(&rule.detail, candidate))
}
