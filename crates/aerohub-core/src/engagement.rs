//! Optimistic like/save toggles for one livery.
//!
//! A click flips the local state immediately and sends one atomic toggle to
//! the store. The store's answer replaces the local guess; a failure puts back
//! exactly what was there before the click. While a toggle is in flight,
//! further clicks on the same kind are ignored.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use aerohub_gateway::{EngagementKind, Gateway, GatewayError};
use aerohub_types::models::{Livery, LiveryId, UserProfile};

/// What a toggle button shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleView {
    pub active: bool,
    pub count: u64,
}

impl ToggleView {
    /// The state a click should lead to.
    fn flipped(self) -> Self {
        if self.active {
            Self {
                active: false,
                count: self.count.saturating_sub(1),
            }
        } else {
            Self {
                active: true,
                count: self.count.saturating_add(1),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The store accepted the toggle; this is its resulting state.
    Confirmed(ToggleView),
    /// A toggle of the same kind was still in flight. Nothing was sent.
    Ignored,
}

#[derive(Debug, thiserror::Error)]
pub enum EngagementError {
    #[error("Sign in to {0} liveries")]
    SignInRequired(EngagementKind),

    #[error("Failed to {kind} livery: {source}")]
    Reverted {
        kind: EngagementKind,
        #[source]
        source: GatewayError,
    },
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    view: ToggleView,
    pending: bool,
}

impl Slot {
    fn idle(active: bool, count: u64) -> Self {
        Self {
            view: ToggleView { active, count },
            pending: false,
        }
    }
}

struct Slots {
    like: Slot,
    save: Slot,
}

impl Slots {
    fn get_mut(&mut self, kind: EngagementKind) -> &mut Slot {
        match kind {
            EngagementKind::Like => &mut self.like,
            EngagementKind::Save => &mut self.save,
        }
    }

    fn get(&self, kind: EngagementKind) -> &Slot {
        match kind {
            EngagementKind::Like => &self.like,
            EngagementKind::Save => &self.save,
        }
    }
}

/// Like and save state of one livery as seen by one viewer.
pub struct Engagement<G: Gateway + ?Sized> {
    gateway: Arc<G>,
    livery_id: LiveryId,
    slots: Mutex<Slots>,
}

impl<G: Gateway + ?Sized> Engagement<G> {
    /// Derive the initial state from the livery's counters and the viewer's
    /// liked/saved sets. Anonymous viewers start with both toggles off.
    pub fn new(gateway: Arc<G>, livery: &Livery, viewer: Option<&UserProfile>) -> Self {
        let liked = viewer.is_some_and(|v| v.has_liked(livery.id));
        let saved = viewer.is_some_and(|v| v.has_saved(livery.id));

        Self {
            gateway,
            livery_id: livery.id,
            slots: Mutex::new(Slots {
                like: Slot::idle(liked, livery.likes),
                save: Slot::idle(saved, livery.saves),
            }),
        }
    }

    pub fn livery_id(&self) -> LiveryId {
        self.livery_id
    }

    pub async fn view(&self, kind: EngagementKind) -> ToggleView {
        self.slots.lock().await.get(kind).view
    }

    pub async fn is_pending(&self, kind: EngagementKind) -> bool {
        self.slots.lock().await.get(kind).pending
    }

    pub async fn like(&self) -> Result<ToggleOutcome, EngagementError> {
        self.toggle(EngagementKind::Like).await
    }

    pub async fn save(&self) -> Result<ToggleOutcome, EngagementError> {
        self.toggle(EngagementKind::Save).await
    }

    pub async fn toggle(&self, kind: EngagementKind) -> Result<ToggleOutcome, EngagementError> {
        if self.gateway.session().is_none() {
            return Err(EngagementError::SignInRequired(kind));
        }

        let before = {
            let mut slots = self.slots.lock().await;
            let slot = slots.get_mut(kind);
            if slot.pending {
                debug!("Ignoring {} on livery {}: already in flight", kind, self.livery_id);
                return Ok(ToggleOutcome::Ignored);
            }
            let before = *slot;
            slot.view = before.view.flipped();
            slot.pending = true;
            before
        };

        let result = self.gateway.toggle(kind, self.livery_id).await;

        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(kind);
        match result {
            Ok(toggled) => {
                slot.view = ToggleView {
                    active: toggled.active,
                    count: toggled.count,
                };
                slot.pending = false;
                Ok(ToggleOutcome::Confirmed(slot.view))
            }
            Err(e) => {
                warn!("Reverting {} on livery {}: {}", kind, self.livery_id, e);
                *slot = before;
                Err(EngagementError::Reverted { kind, source: e })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::pin::pin;

    use futures_util::poll;

    use aerohub_gateway::memory::{MemoryGateway, Operation};

    use super::*;
    use crate::fixtures::livery;

    const LIVERY: LiveryId = LiveryId(7);

    fn store() -> MemoryGateway {
        let gateway = MemoryGateway::new();
        gateway.seed_livery(livery(7, "Laminar", 10, 0, 0));
        gateway
    }

    fn viewer(likes: &[i64]) -> UserProfile {
        UserProfile {
            id: "viewer".into(),
            username: "viewer".into(),
            image_url: String::new(),
            likes: likes.iter().copied().map(LiveryId).collect(),
            saves: HashSet::new(),
        }
    }

    fn signed_in(store: &MemoryGateway) -> Engagement<MemoryGateway> {
        let livery = store.livery(LIVERY).unwrap();
        Engagement::new(Arc::new(store.signed_in("viewer")), &livery, None)
    }

    #[tokio::test]
    async fn initial_state_comes_from_membership() {
        let store = store();
        let livery = store.livery(LIVERY).unwrap();
        let engagement = Engagement::new(Arc::new(store.signed_in("viewer")), &livery, Some(&viewer(&[7])));

        assert_eq!(
            engagement.view(EngagementKind::Like).await,
            ToggleView { active: true, count: 10 }
        );
        assert_eq!(
            engagement.view(EngagementKind::Save).await,
            ToggleView { active: false, count: 0 }
        );
        assert_eq!(store.calls(Operation::ToggleLike), 0);
    }

    #[tokio::test]
    async fn anonymous_toggle_asks_to_sign_in() {
        let store = store();
        let livery = store.livery(LIVERY).unwrap();
        let engagement = Engagement::new(Arc::new(store.clone()), &livery, None);

        let err = engagement.like().await.unwrap_err();
        assert!(matches!(err, EngagementError::SignInRequired(EngagementKind::Like)));
        assert_eq!(store.calls(Operation::ToggleLike), 0);
        assert_eq!(
            engagement.view(EngagementKind::Like).await,
            ToggleView { active: false, count: 10 }
        );
    }

    #[tokio::test]
    async fn optimistic_then_confirmed() {
        let store = store();
        let engagement = signed_in(&store);
        let release = store.hold_next(Operation::ToggleLike);

        let mut click = pin!(engagement.like());
        assert!(poll!(click.as_mut()).is_pending());
        assert!(engagement.is_pending(EngagementKind::Like).await);
        assert_eq!(
            engagement.view(EngagementKind::Like).await,
            ToggleView { active: true, count: 11 }
        );

        release.send(()).unwrap();
        let outcome = click.await.unwrap();
        assert_eq!(
            outcome,
            ToggleOutcome::Confirmed(ToggleView { active: true, count: 11 })
        );
        assert!(!engagement.is_pending(EngagementKind::Like).await);
    }

    #[tokio::test]
    async fn server_count_replaces_local_guess() {
        let store = store();
        let engagement = signed_in(&store);
        // Others liked it since the page was loaded.
        store.modify_livery(LIVERY, |l| l.likes = 50);

        let outcome = engagement.like().await.unwrap();
        assert_eq!(
            outcome,
            ToggleOutcome::Confirmed(ToggleView { active: true, count: 51 })
        );
        assert_eq!(engagement.view(EngagementKind::Like).await.count, 51);
    }

    #[tokio::test]
    async fn toggling_twice_restores_everything() {
        let store = store();
        let engagement = signed_in(&store);
        let start = engagement.view(EngagementKind::Like).await;

        engagement.like().await.unwrap();
        engagement.like().await.unwrap();

        assert_eq!(engagement.view(EngagementKind::Like).await, start);
        assert_eq!(store.livery(LIVERY).unwrap().likes, 10);
        assert!(!store.user("viewer").unwrap().has_liked(LIVERY));
    }

    #[tokio::test]
    async fn failure_reverts_to_exact_snapshot() {
        let store = store();
        let livery = store.livery(LIVERY).unwrap();
        let engagement =
            Engagement::new(Arc::new(store.signed_in("viewer")), &livery, Some(&viewer(&[7])));
        let before = engagement.view(EngagementKind::Like).await;
        store.fail_next(Operation::ToggleLike, GatewayError::Mutation("rpc failed".into()));

        let err = engagement.like().await.unwrap_err();

        assert!(matches!(
            err,
            EngagementError::Reverted { kind: EngagementKind::Like, source: GatewayError::Mutation(_) }
        ));
        assert_eq!(engagement.view(EngagementKind::Like).await, before);
        assert!(!engagement.is_pending(EngagementKind::Like).await);
        assert_eq!(store.livery(LIVERY).unwrap().likes, 10);
    }

    #[tokio::test]
    async fn clicks_while_pending_are_ignored() {
        let store = store();
        let engagement = signed_in(&store);
        let release = store.hold_next(Operation::ToggleLike);

        let mut first = pin!(engagement.like());
        assert!(poll!(first.as_mut()).is_pending());

        assert_eq!(engagement.like().await.unwrap(), ToggleOutcome::Ignored);
        assert_eq!(engagement.like().await.unwrap(), ToggleOutcome::Ignored);

        release.send(()).unwrap();
        first.await.unwrap();

        assert_eq!(store.calls(Operation::ToggleLike), 1);
        assert_eq!(store.livery(LIVERY).unwrap().likes, 11);
        assert_eq!(
            engagement.view(EngagementKind::Like).await,
            ToggleView { active: true, count: 11 }
        );
    }

    #[tokio::test]
    async fn like_and_save_are_independent() {
        let store = store();
        let engagement = signed_in(&store);
        let release = store.hold_next(Operation::ToggleLike);

        let mut like = pin!(engagement.like());
        assert!(poll!(like.as_mut()).is_pending());

        let saved = engagement.save().await.unwrap();
        assert_eq!(saved, ToggleOutcome::Confirmed(ToggleView { active: true, count: 1 }));
        assert!(engagement.is_pending(EngagementKind::Like).await);

        drop(release);
        like.await.unwrap();
        assert!(!engagement.is_pending(EngagementKind::Like).await);
    }
}
