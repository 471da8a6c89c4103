//! Entity snapshots that filters and policies are evaluated against.
//!
//! Snapshots are read-only copies of a user and the characters linked to them at
//! evaluation time. The engine never mutates them.

use citadel_common::{AllianceId, CharacterId, CorporationId, FactionId, UserId};
use serde::{Deserialize, Serialize};

/// Corporation role granting full control of a corporation.
pub const DIRECTOR_ROLE: &str = "Director";

/// A user together with every character currently linked to them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub user_id: UserId,
    pub name: String,
    /// Administrators bypass every permission check.
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub characters: Vec<CharacterSnapshot>,
}

impl UserSnapshot {
    pub fn new(user_id: UserId, name: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_character(mut self, character: CharacterSnapshot) -> Self {
        self.characters.push(character);
        self
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    /// Check whether the character is linked to this user.
    pub fn owns(&self, character_id: CharacterId) -> bool {
        self.characters
            .iter()
            .any(|c| c.character_id == character_id)
    }

    /// Characters currently affiliated with the corporation.
    pub fn characters_in(
        &self,
        corporation_id: CorporationId,
    ) -> impl Iterator<Item = &CharacterSnapshot> {
        self.characters
            .iter()
            .filter(move |c| c.corporation_id() == Some(corporation_id))
    }
}

/// A character and its related records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub character_id: CharacterId,
    pub name: String,
    #[serde(default)]
    pub security_status: Option<f64>,
    #[serde(default)]
    pub affiliation: Option<Affiliation>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub titles: Vec<Title>,
    #[serde(default)]
    pub roles: Vec<CorporationRole>,
}

impl CharacterSnapshot {
    pub fn new(character_id: CharacterId, name: impl Into<String>) -> Self {
        Self {
            character_id,
            name: name.into(),
            ..Default::default()
        }
    }

    /// A bare subject carrying only an affiliation, used to match corporation and
    /// alliance grant filters.
    pub fn from_affiliation(affiliation: Affiliation) -> Self {
        Self {
            affiliation: Some(affiliation),
            ..Default::default()
        }
    }

    pub fn with_security_status(mut self, security_status: f64) -> Self {
        self.security_status = Some(security_status);
        self
    }

    pub fn with_affiliation(mut self, affiliation: Affiliation) -> Self {
        self.affiliation = Some(affiliation);
        self
    }

    pub fn with_skill(mut self, skill: Skill) -> Self {
        self.skills.push(skill);
        self
    }

    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.assets.push(asset);
        self
    }

    pub fn with_title(mut self, title: Title) -> Self {
        self.titles.push(title);
        self
    }

    pub fn with_role(mut self, role: CorporationRole) -> Self {
        self.roles.push(role);
        self
    }

    pub fn corporation_id(&self) -> Option<CorporationId> {
        self.affiliation.as_ref().map(|a| a.corporation_id)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.role == role)
    }
}

/// Current corporation, alliance and faction standing of a character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affiliation {
    pub corporation_id: CorporationId,
    #[serde(default)]
    pub alliance_id: Option<AllianceId>,
    #[serde(default)]
    pub faction_id: Option<FactionId>,
}

impl Affiliation {
    pub fn new(corporation_id: CorporationId) -> Self {
        Self {
            corporation_id,
            alliance_id: None,
            faction_id: None,
        }
    }

    pub fn with_alliance(mut self, alliance_id: AllianceId) -> Self {
        self.alliance_id = Some(alliance_id);
        self
    }

    pub fn with_faction(mut self, faction_id: FactionId) -> Self {
        self.faction_id = Some(faction_id);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub skill_id: i64,
    pub trained_skill_level: i32,
    pub active_skill_level: i32,
    pub skillpoints_in_skill: i64,
}

impl Skill {
    /// A skill trained and active at the given level.
    pub fn trained(skill_id: i64, level: i32) -> Self {
        Self {
            skill_id,
            trained_skill_level: level,
            active_skill_level: level,
            skillpoints_in_skill: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub item_id: i64,
    pub type_id: i64,
    pub location_id: i64,
    pub location_flag: String,
    pub quantity: i32,
    /// Market group of the item type; unpublished types have none.
    #[serde(default)]
    pub market_group_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    pub title_id: i64,
    pub name: String,
}

impl Title {
    pub fn new(title_id: i64, name: impl Into<String>) -> Self {
        Self {
            title_id,
            name: name.into(),
        }
    }
}

/// A role granted by the character's corporation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorporationRole {
    pub role: String,
    /// Where the role applies: `roles`, `roles_at_hq`, `roles_at_base` or `roles_at_other`.
    pub scope: String,
}

impl CorporationRole {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            scope: "roles".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_owns_linked_characters_only() {
        let user = UserSnapshot::new(1, "alice")
            .with_character(CharacterSnapshot::new(90000001, "Alice Alt"));

        assert!(user.owns(90000001));
        assert!(!user.owns(90000002));
    }

    #[test]
    fn test_characters_in_corporation() {
        let user = UserSnapshot::new(1, "alice")
            .with_character(
                CharacterSnapshot::new(90000001, "Main").with_affiliation(Affiliation::new(98000001)),
            )
            .with_character(
                CharacterSnapshot::new(90000002, "Alt").with_affiliation(Affiliation::new(98000002)),
            )
            .with_character(CharacterSnapshot::new(90000003, "Fresh"));

        let ids: Vec<_> = user.characters_in(98000001).map(|c| c.character_id).collect();
        assert_eq!(ids, vec![90000001]);
    }

    #[test]
    fn test_snapshot_deserializes_with_defaults() {
        let json = r#"{"user_id": 7, "name": "bob", "characters": [
            {"character_id": 90000010, "name": "Bob",
             "affiliation": {"corporation_id": 98541700}}
        ]}"#;
        let user: UserSnapshot = serde_json::from_str(json).unwrap();

        assert!(!user.admin);
        assert_eq!(user.characters[0].corporation_id(), Some(98541700));
        assert!(user.characters[0].skills.is_empty());
    }
}
