//! Built-in authorization policies.
//!
//! Each policy answers whether an actor may exercise an ability on a target. Grants
//! come from the actor's roles and are reduced with deny-overrides; a policy only
//! falls back to ownership or control when no grant applies.

use citadel_common::{AllianceId, CharacterId, CorporationId, FactionId, SquadId, UserId};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::{Affiliation, CharacterSnapshot, DIRECTOR_ROLE, UserSnapshot};
use crate::error::DefinitionError;
use crate::grant::{Role, Verdict, deny_overrides, grants_for, reduce};
use crate::registry::FilterCompiler;

/// Ability granting every other ability.
pub const SUPERUSER: &str = "global.superuser";

/// The user asking for a decision, with the roles assigned to them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub user: UserSnapshot,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn new(user: UserSnapshot, roles: Vec<Role>) -> Self {
        Self { user, roles }
    }

    pub fn user_id(&self) -> UserId {
        self.user.user_id
    }

    /// Administrators and holders of an undenied `global.superuser` grant.
    pub fn is_superuser(&self) -> bool {
        self.user.admin
            || deny_overrides(grants_for(&self.roles, SUPERUSER).map(|g| g.effect()))
                == Verdict::Allow
    }

    /// Whether one of the actor's characters directs the corporation or the actor
    /// owns its CEO.
    pub fn controls_corporation(&self, corporation_id: CorporationId, ceo_id: CharacterId) -> bool {
        self.user.owns(ceo_id)
            || self
                .user
                .characters_in(corporation_id)
                .any(|c| c.has_role(DIRECTOR_ROLE))
    }

    /// Whether one of the actor's characters directs the alliance's executor
    /// corporation.
    pub fn controls_alliance(&self, executor_corporation_id: CorporationId) -> bool {
        self.user
            .characters_in(executor_corporation_id)
            .any(|c| c.has_role(DIRECTOR_ROLE))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorporationTarget {
    pub corporation_id: CorporationId,
    #[serde(default)]
    pub alliance_id: Option<AllianceId>,
    #[serde(default)]
    pub faction_id: Option<FactionId>,
    pub ceo_id: CharacterId,
}

impl CorporationTarget {
    pub fn affiliation(&self) -> Affiliation {
        Affiliation {
            corporation_id: self.corporation_id,
            alliance_id: self.alliance_id,
            faction_id: self.faction_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllianceTarget {
    pub alliance_id: AllianceId,
    pub executor_corporation_id: CorporationId,
    #[serde(default)]
    pub faction_id: Option<FactionId>,
}

impl AllianceTarget {
    pub fn affiliation(&self) -> Affiliation {
        Affiliation {
            corporation_id: self.executor_corporation_id,
            alliance_id: Some(self.alliance_id),
            faction_id: self.faction_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadTarget {
    pub squad_id: SquadId,
    #[serde(default)]
    pub is_classified: bool,
    #[serde(default)]
    pub members: Vec<UserId>,
    #[serde(default)]
    pub moderators: Vec<UserId>,
}

/// The entity an ability is exercised on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "target", rename_all = "snake_case")]
pub enum PolicyTarget {
    #[default]
    None,
    Character(CharacterSnapshot),
    Corporation(CorporationTarget),
    Alliance(AllianceTarget),
    Squad(SquadTarget),
}

impl PolicyTarget {
    fn kind(&self) -> &'static str {
        match self {
            PolicyTarget::None => "none",
            PolicyTarget::Character(_) => "character",
            PolicyTarget::Corporation(_) => "corporation",
            PolicyTarget::Alliance(_) => "alliance",
            PolicyTarget::Squad(_) => "squad",
        }
    }
}

/// Squad abilities with built-in handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SquadAbility {
    Create,
    Edit,
    Delete,
    Kick,
    ManageCandidates,
    ManageMembers,
    ManageModerators,
    ManageRoles,
    ShowMembers,
}

impl SquadAbility {
    pub const ALL: [SquadAbility; 9] = [
        SquadAbility::Create,
        SquadAbility::Edit,
        SquadAbility::Delete,
        SquadAbility::Kick,
        SquadAbility::ManageCandidates,
        SquadAbility::ManageMembers,
        SquadAbility::ManageModerators,
        SquadAbility::ManageRoles,
        SquadAbility::ShowMembers,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            SquadAbility::Create => "squads.create",
            SquadAbility::Edit => "squads.edit",
            SquadAbility::Delete => "squads.delete",
            SquadAbility::Kick => "squads.kick",
            SquadAbility::ManageCandidates => "squads.manage_candidates",
            SquadAbility::ManageMembers => "squads.manage_members",
            SquadAbility::ManageModerators => "squads.manage_moderators",
            SquadAbility::ManageRoles => "squads.manage_roles",
            SquadAbility::ShowMembers => "squads.show_members",
        }
    }

    fn moderated(&self) -> bool {
        matches!(
            self,
            SquadAbility::Kick
                | SquadAbility::ManageCandidates
                | SquadAbility::ManageMembers
                | SquadAbility::ShowMembers
        )
    }
}

/// A built-in policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Global,
    Character,
    Corporation,
    Alliance,
    Squad(SquadAbility),
    Superuser,
}

impl Policy {
    pub fn evaluate(
        &self,
        actor: &Actor,
        ability: &str,
        target: &PolicyTarget,
        compiler: &FilterCompiler,
    ) -> Result<bool, DefinitionError> {
        let grants = grants_for(&actor.roles, ability);

        match (self, target) {
            (Policy::Superuser, _) => Ok(actor.is_superuser()),

            // Global grants carry no target to filter against
            (Policy::Global, _) => {
                Ok(deny_overrides(grants.map(|g| g.effect())) == Verdict::Allow)
            }

            (Policy::Character, PolicyTarget::Character(character)) => {
                match reduce(grants, |filter| compiler.evaluate(character, filter))? {
                    Verdict::Deny => Ok(false),
                    Verdict::Allow => Ok(true),
                    Verdict::Abstain => Ok(actor.user.owns(character.character_id)),
                }
            }

            (Policy::Corporation, PolicyTarget::Corporation(corporation)) => {
                let subject = CharacterSnapshot::from_affiliation(corporation.affiliation());
                match reduce(grants, |filter| compiler.evaluate(&subject, filter))? {
                    Verdict::Deny => Ok(false),
                    Verdict::Allow => Ok(true),
                    Verdict::Abstain => Ok(actor
                        .controls_corporation(corporation.corporation_id, corporation.ceo_id)),
                }
            }

            (Policy::Alliance, PolicyTarget::Alliance(alliance)) => {
                let subject = CharacterSnapshot::from_affiliation(alliance.affiliation());
                match reduce(grants, |filter| compiler.evaluate(&subject, filter))? {
                    Verdict::Deny => Ok(false),
                    Verdict::Allow => Ok(true),
                    Verdict::Abstain => {
                        Ok(actor.controls_alliance(alliance.executor_corporation_id))
                    }
                }
            }

            (Policy::Squad(squad_ability), _) => {
                match deny_overrides(grants.map(|g| g.effect())) {
                    Verdict::Deny => Ok(false),
                    Verdict::Allow => Ok(true),
                    Verdict::Abstain => Ok(squad_fallback(*squad_ability, actor, target)),
                }
            }

            (policy, target) => {
                warn!(
                    ?policy,
                    ability,
                    target = target.kind(),
                    "Ability evaluated against a target of the wrong kind"
                );
                Ok(false)
            }
        }
    }
}

fn squad_fallback(ability: SquadAbility, actor: &Actor, target: &PolicyTarget) -> bool {
    let PolicyTarget::Squad(squad) = target else {
        return false;
    };
    let user_id = actor.user_id();

    if ability.moderated() && squad.moderators.contains(&user_id) {
        return true;
    }
    ability == SquadAbility::ShowMembers && !squad.is_classified && squad.members.contains(&user_id)
}
