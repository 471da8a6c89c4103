//! Change notifications that trigger membership re-evaluation.

use citadel_common::{CharacterId, UserId};
use citadel_rules::resolver::Relation;
use serde::{Deserialize, Serialize};

/// A change to a character or to the user it is linked to.
///
/// Carried as JSON in the `payload` field of a stream entry:
/// `{"event": "skills_changed", "character_id": 90000001}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangeEvent {
    CharacterLinked {
        user_id: UserId,
        character_id: CharacterId,
    },
    CharacterUnlinked {
        user_id: UserId,
        character_id: CharacterId,
    },
    AffiliationChanged { character_id: CharacterId },
    SkillsChanged { character_id: CharacterId },
    AssetsChanged { character_id: CharacterId },
    TitlesChanged { character_id: CharacterId },
    RolesChanged { character_id: CharacterId },
}

impl ChangeEvent {
    /// The relation the change touched. `None` when the set of characters itself
    /// changed, which can affect every squad.
    pub fn relation(&self) -> Option<Relation> {
        match self {
            ChangeEvent::CharacterLinked { .. } | ChangeEvent::CharacterUnlinked { .. } => None,
            ChangeEvent::AffiliationChanged { .. } => Some(Relation::Affiliation),
            ChangeEvent::SkillsChanged { .. } => Some(Relation::Skills),
            ChangeEvent::AssetsChanged { .. } => Some(Relation::Assets),
            ChangeEvent::TitlesChanged { .. } => Some(Relation::Titles),
            ChangeEvent::RolesChanged { .. } => Some(Relation::Roles),
        }
    }

    pub fn character_id(&self) -> CharacterId {
        match *self {
            ChangeEvent::CharacterLinked { character_id, .. }
            | ChangeEvent::CharacterUnlinked { character_id, .. }
            | ChangeEvent::AffiliationChanged { character_id }
            | ChangeEvent::SkillsChanged { character_id }
            | ChangeEvent::AssetsChanged { character_id }
            | ChangeEvent::TitlesChanged { character_id }
            | ChangeEvent::RolesChanged { character_id } => character_id,
        }
    }

    /// The user named by the event itself. An unlinked character no longer has an
    /// owner to look up, so link events carry it.
    pub fn known_user(&self) -> Option<UserId> {
        match *self {
            ChangeEvent::CharacterLinked { user_id, .. }
            | ChangeEvent::CharacterUnlinked { user_id, .. } => Some(user_id),
            _ => None,
        }
    }

    /// Whether a squad reading `relations` can be affected by this change.
    pub fn affects(&self, relations: &std::collections::BTreeSet<Relation>) -> bool {
        self.relation().is_none_or(|r| relations.contains(&r))
    }
}
