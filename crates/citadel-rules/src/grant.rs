//! Roles, permission grants and deny-overrides reduction.

use citadel_common::RoleId;
use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;
use crate::filter::FilterNode;

/// A permission attached to a role.
///
/// `not` turns the grant into an explicit denial. `filters` narrows the targets
/// the grant (or denial) applies to and is ignored for global abilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub title: String,
    #[serde(default)]
    pub not: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterNode>,
}

impl PermissionGrant {
    pub fn allow(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            not: false,
            filters: None,
        }
    }

    pub fn deny(title: impl Into<String>) -> Self {
        Self {
            not: true,
            ..Self::allow(title)
        }
    }

    pub fn with_filters(mut self, filters: FilterNode) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn effect(&self) -> Effect {
        if self.not { Effect::Deny } else { Effect::Allow }
    }

    pub fn has_filters(&self) -> bool {
        self.filters.is_some()
    }

    /// Unscoped abilities (`global.*`, `squads.*`, `mail.*`, ...) are global.
    pub fn is_global_scope(&self) -> bool {
        !self.is_character_scope() && !self.is_corporation_scope() && !self.is_alliance_scope()
    }

    pub fn is_character_scope(&self) -> bool {
        self.title.starts_with("character.")
    }

    pub fn is_corporation_scope(&self) -> bool {
        self.title.starts_with("corporation.")
    }

    pub fn is_alliance_scope(&self) -> bool {
        self.title.starts_with("alliance.")
    }
}

/// An access-control role and the permissions it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub title: String,
    #[serde(default)]
    pub permissions: Vec<PermissionGrant>,
}

impl Role {
    pub fn new(id: RoleId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            permissions: Vec::new(),
        }
    }

    pub fn with_permission(mut self, grant: PermissionGrant) -> Self {
        self.permissions.push(grant);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

/// Outcome of reducing the grants that apply to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
    /// No grant applies.
    Abstain,
}

/// Any denial wins, then any allowance; nothing at all abstains. Order is irrelevant.
pub fn deny_overrides(effects: impl IntoIterator<Item = Effect>) -> Verdict {
    let mut verdict = Verdict::Abstain;
    for effect in effects {
        match effect {
            Effect::Deny => return Verdict::Deny,
            Effect::Allow => verdict = Verdict::Allow,
        }
    }
    verdict
}

/// Grants across all roles whose title is exactly `ability`.
pub fn grants_for<'a>(roles: &'a [Role], ability: &'a str) -> impl Iterator<Item = &'a PermissionGrant> {
    roles
        .iter()
        .flat_map(|role| role.permissions.iter())
        .filter(move |grant| grant.title == ability)
}

/// Reduce grants whose filters (if any) accept the target. `accepts` is only
/// consulted for filtered grants.
pub fn reduce<'a, F>(
    grants: impl IntoIterator<Item = &'a PermissionGrant>,
    mut accepts: F,
) -> Result<Verdict, DefinitionError>
where
    F: FnMut(&FilterNode) -> Result<bool, DefinitionError>,
{
    let mut effects = Vec::new();
    for grant in grants {
        let applies = match &grant.filters {
            Some(filters) => accepts(filters)?,
            None => true,
        };
        if applies {
            effects.push(grant.effect());
        }
    }
    Ok(deny_overrides(effects))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Condition;

    #[test]
    fn test_deny_overrides() {
        assert_eq!(deny_overrides(Vec::new()), Verdict::Abstain);
        assert_eq!(deny_overrides([Effect::Allow]), Verdict::Allow);
        assert_eq!(deny_overrides([Effect::Allow, Effect::Deny]), Verdict::Deny);
        assert_eq!(deny_overrides([Effect::Deny, Effect::Allow]), Verdict::Deny);
    }

    #[test]
    fn test_grants_for_collects_across_roles() {
        let roles = vec![
            Role::new(1, "Members").with_permission(PermissionGrant::allow("character.sheet")),
            Role::new(2, "Probation")
                .with_permission(PermissionGrant::deny("character.sheet"))
                .with_permission(PermissionGrant::allow("character.skills")),
        ];

        let effects: Vec<Effect> = grants_for(&roles, "character.sheet")
            .map(PermissionGrant::effect)
            .collect();
        assert_eq!(effects, vec![Effect::Allow, Effect::Deny]);
        assert_eq!(grants_for(&roles, "character.wallet").count(), 0);
    }

    #[test]
    fn test_reduce_skips_grants_whose_filter_rejects() {
        let filtered = PermissionGrant::deny("character.sheet").with_filters(FilterNode::condition(
            Condition::new("affiliation", "corporation_id", "=", 1),
        ));
        let plain = PermissionGrant::allow("character.sheet");
        let grants = [filtered, plain];

        assert_eq!(reduce(&grants, |_| Ok(false)).unwrap(), Verdict::Allow);
        assert_eq!(reduce(&grants, |_| Ok(true)).unwrap(), Verdict::Deny);
        assert_eq!(
            reduce(&grants, |_| Err(DefinitionError::EmptyFilter)).unwrap_err(),
            DefinitionError::EmptyFilter
        );
    }

    #[test]
    fn test_scope_predicates() {
        let grant = PermissionGrant::allow("corporation.wallet");
        assert!(grant.is_corporation_scope());
        assert!(!grant.is_character_scope());
        assert!(!grant.is_global_scope());
        assert!(!grant.is_alliance_scope());
        assert!(!grant.has_filters());
        assert!(PermissionGrant::allow("global.superuser").is_global_scope());
        assert!(PermissionGrant::allow("squads.kick").is_global_scope());
        assert!(PermissionGrant::allow("mail.bodies").is_global_scope());
        assert!(PermissionGrant::deny("alliance.tracking").is_alliance_scope());
    }

    #[test]
    fn test_scope_predicates_agree_with_ability_scope() {
        use crate::ability::{Ability, Scope};

        for title in [
            "character.sheet",
            "corporation.wallet",
            "alliance.tracking",
            "global.superuser",
            "squads.kick",
            "mail.bodies",
        ] {
            let grant = PermissionGrant::allow(title);
            let expected = match Ability::parse(title).unwrap().scope() {
                Scope::Global => [true, false, false, false],
                Scope::Character => [false, true, false, false],
                Scope::Corporation => [false, false, true, false],
                Scope::Alliance => [false, false, false, true],
            };
            assert_eq!(
                [
                    grant.is_global_scope(),
                    grant.is_character_scope(),
                    grant.is_corporation_scope(),
                    grant.is_alliance_scope(),
                ],
                expected,
                "{title}"
            );
        }
    }

    #[test]
    fn test_grant_deserializes_with_filters() {
        let grant: PermissionGrant = serde_json::from_str(
            r#"{"title": "character.sheet", "not": true,
                "filters": {"or": [{"path": "affiliation", "field": "alliance_id",
                                    "operator": "=", "criteria": 99000001}]}}"#,
        )
        .unwrap();

        assert_eq!(grant.effect(), Effect::Deny);
        assert!(grant.has_filters());
    }
}
