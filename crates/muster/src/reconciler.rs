//! Squad membership reconciliation.
//!
//! Re-evaluates auto squads for a user and brings the stored membership in line
//! with the verdict. Work for the same user is serialized so that two
//! notifications arriving together cannot both add (or both remove) the user.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use citadel_common::{AppResult, MembershipAction, MembershipChange, UserId};
use citadel_rules::DefinitionError;
use citadel_rules::context::UserSnapshot;
use citadel_rules::eligibility::{EligibilityService, Squad};
use citadel_rules::registry::CompiledFilter;
use tracing::{debug, error, info, warn};

use crate::events::ChangeEvent;
use crate::store::{MembershipStore, SnapshotProvider};

/// An auto squad with its filter compiled, or the reason it could not be.
#[derive(Debug, Clone)]
pub struct PreparedSquad {
    pub squad: Squad,
    pub filter: Result<CompiledFilter, DefinitionError>,
}

/// Counts of what a reconciliation run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Squads skipped because their filter is invalid.
    pub failed: usize,
    /// Users skipped because their data could not be loaded or written.
    pub errors: usize,
}

impl ReconcileReport {
    fn merge(&mut self, other: ReconcileReport) {
        self.added += other.added;
        self.removed += other.removed;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
        self.errors += other.errors;
    }
}

type UserLock = Arc<tokio::sync::Mutex<()>>;

pub struct Reconciler<P, M> {
    snapshots: Arc<P>,
    memberships: Arc<M>,
    eligibility: EligibilityService,
    locks: Mutex<HashMap<UserId, UserLock>>,
}

impl<P, M> Reconciler<P, M>
where
    P: SnapshotProvider,
    M: MembershipStore,
{
    pub fn new(snapshots: Arc<P>, memberships: Arc<M>, eligibility: EligibilityService) -> Self {
        Self {
            snapshots,
            memberships,
            eligibility,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Load and compile every auto squad.
    pub async fn prepare(&self) -> AppResult<Vec<PreparedSquad>> {
        let squads = self.memberships.auto_squads().await?;

        Ok(squads
            .into_iter()
            .filter_map(|squad| {
                let filter = match self.eligibility.compile_squad(&squad) {
                    Ok(Some(filter)) => Ok(filter),
                    Ok(None) => return None,
                    Err(e) => Err(e),
                };
                Some(PreparedSquad { squad, filter })
            })
            .collect())
    }

    /// React to a change notification.
    pub async fn handle(&self, event: &ChangeEvent) -> AppResult<ReconcileReport> {
        let user_id = match event.known_user() {
            Some(user_id) => Some(user_id),
            None => self.snapshots.owner_of(event.character_id()).await?,
        };
        let Some(user_id) = user_id else {
            debug!(
                character_id = event.character_id(),
                "Character is not linked to a user, nothing to reconcile"
            );
            return Ok(ReconcileReport::default());
        };

        let squads = self.prepare().await?;
        // Squads that failed to compile stay in so the failure gets reported
        let relevant: Vec<&PreparedSquad> = squads
            .iter()
            .filter(|s| match &s.filter {
                Ok(filter) => event.affects(filter.relations()),
                Err(_) => true,
            })
            .collect();

        debug!(
            ?event,
            user_id,
            relevant = relevant.len(),
            total = squads.len(),
            "Handling change event"
        );

        self.reconcile_user(user_id, &relevant).await
    }

    /// Re-evaluate the given squads for one user.
    pub async fn reconcile_user(
        &self,
        user_id: UserId,
        squads: &[&PreparedSquad],
    ) -> AppResult<ReconcileReport> {
        let lock = self.user_lock(user_id);
        let guard = lock.lock().await;
        let result = self.reconcile_locked(user_id, squads).await;
        drop(guard);
        self.release(user_id, lock);
        result
    }

    /// Re-evaluate every auto squad for every user. A failure for one user is
    /// logged and does not stop the sweep.
    pub async fn sweep(&self) -> AppResult<ReconcileReport> {
        let squads = self.prepare().await?;
        let mut report = ReconcileReport::default();

        let mut valid = Vec::with_capacity(squads.len());
        for prepared in &squads {
            match &prepared.filter {
                Ok(_) => valid.push(prepared),
                Err(e) => {
                    warn!(squad_id = prepared.squad.id, error = %e, "Skipping squad with invalid filter");
                    report.failed += 1;
                }
            }
        }

        let user_ids = self.snapshots.user_ids().await?;
        for user_id in user_ids {
            match self.reconcile_user(user_id, &valid).await {
                Ok(user_report) => report.merge(user_report),
                Err(e) => {
                    error!(user_id, code = e.error_code(), error = %e, "Failed to reconcile user");
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    async fn reconcile_locked(
        &self,
        user_id: UserId,
        squads: &[&PreparedSquad],
    ) -> AppResult<ReconcileReport> {
        // A user that no longer exists is eligible for nothing
        let user = self
            .snapshots
            .load_user(user_id)
            .await?
            .unwrap_or_else(|| UserSnapshot::new(user_id, ""));

        let mut report = ReconcileReport::default();
        for prepared in squads {
            let squad_id = prepared.squad.id;
            let filter = match &prepared.filter {
                Ok(filter) => filter,
                Err(e) => {
                    warn!(squad_id, error = %e, "Skipping squad with invalid filter");
                    report.failed += 1;
                    continue;
                }
            };

            let eligible = filter.matches_user(&user);
            let member = self.memberships.is_member(squad_id, user_id).await?;

            let action = match (eligible, member) {
                (true, false) => MembershipAction::Added,
                (false, true) => MembershipAction::Removed,
                _ => {
                    report.unchanged += 1;
                    continue;
                }
            };

            self.memberships
                .apply(&MembershipChange {
                    squad_id,
                    user_id,
                    action,
                })
                .await?;

            match action {
                MembershipAction::Added => report.added += 1,
                MembershipAction::Removed => report.removed += 1,
            }
            info!(squad_id, user_id, ?action, "Squad membership updated");
        }

        Ok(report)
    }

    fn user_lock(&self, user_id: UserId) -> UserLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(user_id).or_default().clone()
    }

    fn release(&self, user_id: UserId, lock: UserLock) {
        drop(lock);
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&user_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use citadel_common::{CharacterId, SquadId, SquadKind};
    use citadel_rules::context::{Affiliation, CharacterSnapshot, Skill};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CORP_A: i64 = 98541700;

    #[derive(Default)]
    struct FakeStore {
        users: Mutex<HashMap<UserId, UserSnapshot>>,
        squads: Vec<Squad>,
        members: Mutex<HashSet<(SquadId, UserId)>>,
        applied: AtomicUsize,
    }

    impl FakeStore {
        fn with_squads(squads: Vec<Squad>) -> Self {
            Self {
                squads,
                ..Default::default()
            }
        }

        fn put_user(&self, user: UserSnapshot) {
            self.users.lock().unwrap().insert(user.user_id, user);
        }

        fn add_member(&self, squad_id: SquadId, user_id: UserId) {
            self.members.lock().unwrap().insert((squad_id, user_id));
        }

        fn has_member(&self, squad_id: SquadId, user_id: UserId) -> bool {
            self.members.lock().unwrap().contains(&(squad_id, user_id))
        }
    }

    #[async_trait]
    impl SnapshotProvider for FakeStore {
        async fn load_user(&self, user_id: UserId) -> AppResult<Option<UserSnapshot>> {
            Ok(self.users.lock().unwrap().get(&user_id).cloned())
        }

        async fn owner_of(&self, character_id: CharacterId) -> AppResult<Option<UserId>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .values()
                .find(|u| u.owns(character_id))
                .map(|u| u.user_id))
        }

        async fn user_ids(&self) -> AppResult<Vec<UserId>> {
            let mut ids: Vec<_> = self.users.lock().unwrap().keys().copied().collect();
            ids.sort_unstable();
            Ok(ids)
        }
    }

    #[async_trait]
    impl MembershipStore for FakeStore {
        async fn auto_squads(&self) -> AppResult<Vec<Squad>> {
            Ok(self.squads.clone())
        }

        async fn is_member(&self, squad_id: SquadId, user_id: UserId) -> AppResult<bool> {
            Ok(self.has_member(squad_id, user_id))
        }

        async fn apply(&self, change: &MembershipChange) -> AppResult<()> {
            tokio::task::yield_now().await;
            self.applied.fetch_add(1, Ordering::SeqCst);
            let mut members = self.members.lock().unwrap();
            match change.action {
                MembershipAction::Added => members.insert((change.squad_id, change.user_id)),
                MembershipAction::Removed => members.remove(&(change.squad_id, change.user_id)),
            };
            Ok(())
        }
    }

    fn corp_squad(id: SquadId) -> Squad {
        Squad::new(id, "Corp A", SquadKind::Auto).with_filters(
            r#"{"and": [{"path": "affiliation", "field": "corporation_id", "operator": "=", "criteria": 98541700}]}"#,
        )
    }

    fn skill_squad(id: SquadId) -> Squad {
        Squad::new(id, "Logistics", SquadKind::Auto).with_filters(
            r#"{"path": "skills", "field": "skill_id", "operator": "=", "criteria": 3300}"#,
        )
    }

    fn pilot(id: CharacterId, corporation_id: i64) -> CharacterSnapshot {
        CharacterSnapshot::new(id, format!("Pilot {id}"))
            .with_affiliation(Affiliation::new(corporation_id))
    }

    fn reconciler(store: Arc<FakeStore>) -> Reconciler<FakeStore, FakeStore> {
        Reconciler::new(store.clone(), store, EligibilityService::default())
    }

    #[tokio::test]
    async fn test_link_adds_to_matching_squads() {
        let store = Arc::new(FakeStore::with_squads(vec![corp_squad(1), skill_squad(2)]));
        store.put_user(UserSnapshot::new(7, "alice").with_character(pilot(90000001, CORP_A)));
        let reconciler = reconciler(store.clone());

        let report = reconciler
            .handle(&ChangeEvent::CharacterLinked {
                user_id: 7,
                character_id: 90000001,
            })
            .await
            .unwrap();

        assert_eq!(report.added, 1);
        assert_eq!(report.unchanged, 1);
        assert!(store.has_member(1, 7));
        assert!(!store.has_member(2, 7));
    }

    #[tokio::test]
    async fn test_reconciliation_is_idempotent() {
        let store = Arc::new(FakeStore::with_squads(vec![corp_squad(1)]));
        store.put_user(UserSnapshot::new(7, "alice").with_character(pilot(90000001, CORP_A)));
        let reconciler = reconciler(store.clone());
        let event = ChangeEvent::AffiliationChanged {
            character_id: 90000001,
        };

        assert_eq!(reconciler.handle(&event).await.unwrap().added, 1);
        let again = reconciler.handle(&event).await.unwrap();
        assert_eq!(again.added, 0);
        assert_eq!(again.unchanged, 1);
        assert_eq!(store.applied.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unrelated_change_skips_squad() {
        let store = Arc::new(FakeStore::with_squads(vec![corp_squad(1)]));
        // Left the corporation, but the stored membership is stale
        store.put_user(UserSnapshot::new(7, "alice").with_character(pilot(90000001, 12345)));
        store.add_member(1, 7);
        let reconciler = reconciler(store.clone());

        let skills = reconciler
            .handle(&ChangeEvent::SkillsChanged {
                character_id: 90000001,
            })
            .await
            .unwrap();
        assert_eq!(skills, ReconcileReport::default());
        assert!(store.has_member(1, 7));

        let affiliation = reconciler
            .handle(&ChangeEvent::AffiliationChanged {
                character_id: 90000001,
            })
            .await
            .unwrap();
        assert_eq!(affiliation.removed, 1);
        assert!(!store.has_member(1, 7));
    }

    #[tokio::test]
    async fn test_unlink_removes_membership() {
        let store = Arc::new(FakeStore::with_squads(vec![corp_squad(1)]));
        store.put_user(UserSnapshot::new(7, "alice"));
        store.add_member(1, 7);
        let reconciler = reconciler(store.clone());

        let report = reconciler
            .handle(&ChangeEvent::CharacterUnlinked {
                user_id: 7,
                character_id: 90000001,
            })
            .await
            .unwrap();

        assert_eq!(report.removed, 1);
        assert!(!store.has_member(1, 7));
    }

    #[tokio::test]
    async fn test_unknown_character_is_ignored() {
        let store = Arc::new(FakeStore::with_squads(vec![corp_squad(1)]));
        let reconciler = reconciler(store.clone());

        let report = reconciler
            .handle(&ChangeEvent::SkillsChanged {
                character_id: 90000009,
            })
            .await
            .unwrap();
        assert_eq!(report, ReconcileReport::default());
    }

    #[tokio::test]
    async fn test_invalid_squad_does_not_abort_others() {
        let broken = Squad::new(3, "Broken", SquadKind::Auto).with_filters(
            r#"{"path": "affiliation", "field": "nonexistent_field", "operator": "=", "criteria": 1}"#,
        );
        let store = Arc::new(FakeStore::with_squads(vec![broken, corp_squad(1)]));
        store.put_user(UserSnapshot::new(7, "alice").with_character(pilot(90000001, CORP_A)));
        let reconciler = reconciler(store.clone());

        let report = reconciler
            .handle(&ChangeEvent::AffiliationChanged {
                character_id: 90000001,
            })
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.added, 1);
        assert!(store.has_member(1, 7));
    }

    #[tokio::test]
    async fn test_sweep_covers_every_user() {
        let broken = Squad::new(3, "Empty", SquadKind::Auto).with_filters(r#"{"and": []}"#);
        let store = Arc::new(FakeStore::with_squads(vec![
            corp_squad(1),
            skill_squad(2),
            broken,
        ]));
        store.put_user(UserSnapshot::new(1, "a").with_character(pilot(90000001, CORP_A)));
        store.put_user(
            UserSnapshot::new(2, "b")
                .with_character(pilot(90000002, 12345).with_skill(Skill::trained(3300, 1))),
        );
        store.put_user(UserSnapshot::new(3, "c"));
        store.add_member(1, 3);
        let reconciler = reconciler(store.clone());

        let report = reconciler.sweep().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.added, 2);
        assert_eq!(report.removed, 1);
        assert_eq!(report.unchanged, 3);
        assert!(store.has_member(1, 1));
        assert!(store.has_member(2, 2));
        assert!(!store.has_member(1, 3));
    }

    #[tokio::test]
    async fn test_concurrent_events_for_one_user_apply_once() {
        let store = Arc::new(FakeStore::with_squads(vec![corp_squad(1)]));
        store.put_user(UserSnapshot::new(7, "alice").with_character(pilot(90000001, CORP_A)));
        let reconciler = Arc::new(reconciler(store.clone()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let reconciler = reconciler.clone();
                tokio::spawn(async move {
                    reconciler
                        .handle(&ChangeEvent::AffiliationChanged {
                            character_id: 90000001,
                        })
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.applied.load(Ordering::SeqCst), 1);
        assert!(reconciler.locks.lock().unwrap().is_empty());
    }
}
