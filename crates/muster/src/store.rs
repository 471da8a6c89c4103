//! Storage seams used by the reconciler.

use async_trait::async_trait;
use citadel_common::{AppResult, CharacterId, MembershipChange, SquadId, UserId};
use citadel_rules::context::UserSnapshot;
use citadel_rules::eligibility::Squad;

/// Read-only access to users and their linked characters.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Load a user with every linked character and its relations.
    async fn load_user(&self, user_id: UserId) -> AppResult<Option<UserSnapshot>>;

    /// The user a character is currently linked to.
    async fn owner_of(&self, character_id: CharacterId) -> AppResult<Option<UserId>>;

    /// Every known user.
    async fn user_ids(&self) -> AppResult<Vec<UserId>>;
}

/// Squad definitions and membership rows.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Squads whose membership is computed from a filter.
    async fn auto_squads(&self) -> AppResult<Vec<Squad>>;

    async fn is_member(&self, squad_id: SquadId, user_id: UserId) -> AppResult<bool>;

    /// Apply a membership change. Adding an existing member or removing a
    /// non-member is a no-op.
    async fn apply(&self, change: &MembershipChange) -> AppResult<()>;
}
