//! Common types used across Citadel crates.

use serde::{Deserialize, Serialize};

/// Application user ID
pub type UserId = i64;

/// EVE Online character ID
pub type CharacterId = i64;

/// EVE Online corporation ID
pub type CorporationId = i64;

/// EVE Online alliance ID
pub type AllianceId = i64;

/// EVE Online NPC faction ID
pub type FactionId = i64;

/// Squad ID
pub type SquadId = i64;

/// Access-control role ID
pub type RoleId = i64;

/// How a squad's membership is maintained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SquadKind {
    /// Membership is computed from the squad's filter
    Auto,
    /// Membership is managed by moderators
    Manual,
}

impl SquadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl std::fmt::Display for SquadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of a squad membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipAction {
    Added,
    Removed,
}

/// A membership mutation produced by re-evaluating a squad filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipChange {
    pub squad_id: SquadId,
    pub user_id: UserId,
    pub action: MembershipAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squad_kind_round_trips_through_text() {
        assert_eq!(SquadKind::parse("auto"), Some(SquadKind::Auto));
        assert_eq!(SquadKind::parse("manual"), Some(SquadKind::Manual));
        assert_eq!(SquadKind::parse("hybrid"), None);
        assert_eq!(SquadKind::Manual.to_string(), "manual");
    }

    #[test]
    fn test_membership_change_serialization() {
        let change = MembershipChange {
            squad_id: 3,
            user_id: 42,
            action: MembershipAction::Removed,
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["action"], "removed");
        assert_eq!(json["squad_id"], 3);
    }
}
