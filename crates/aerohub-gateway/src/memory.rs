//! In-process gateway with the same contract as the hosted store.
//!
//! Clones and upgraded copies share one store, so a test can act as several
//! users against the same data. Failures can be injected per operation and
//! any call can be held open until the test releases it.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::oneshot;

use aerohub_types::listing::{LiveryFilter, SortField, SortOrder, SortSpec};
use aerohub_types::models::{Livery, LiveryId, LiveryPatch, NewLivery, UserProfile};

use crate::{
    EngagementTotals, Gateway, GatewayError, Result, Session, Toggled, require_session,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CountLiveries,
    FetchLiveries,
    GetLivery,
    InsertLivery,
    UpdateLivery,
    DeleteLivery,
    ToggleLike,
    ToggleSave,
    IncrementView,
    GetUser,
    CountUserLiveries,
    TotalUserLikes,
    TotalUserSaves,
    SumUserEngagement,
    UploadImage,
}

#[derive(Default)]
struct MemoryState {
    liveries: BTreeMap<LiveryId, Livery>,
    users: HashMap<String, UserProfile>,
    objects: HashMap<String, (Bytes, String)>,
    next_id: i64,
    calls: HashMap<Operation, usize>,
    faults: HashMap<Operation, VecDeque<GatewayError>>,
    holds: HashMap<Operation, VecDeque<oneshot::Receiver<()>>>,
}

#[derive(Clone, Default)]
pub struct MemoryGateway {
    state: Arc<Mutex<MemoryState>>,
    session: Option<Session>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this gateway signed in as `user_id`.
    pub fn signed_in(&self, user_id: &str) -> Self {
        Self {
            state: self.state.clone(),
            session: Some(Session::new(user_id, format!("token-{user_id}"))),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = self.lock();
        f(&mut state)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, wait out a hold if one is queued, then surface an
    /// injected fault if one is queued.
    async fn enter(&self, op: Operation) -> Result<()> {
        let hold = self.with_state(|state| {
            *state.calls.entry(op).or_default() += 1;
            state.holds.get_mut(&op).and_then(VecDeque::pop_front)
        });
        if let Some(hold) = hold {
            // A dropped sender releases the call as well.
            let _ = hold.await;
        }

        self.with_state(|state| match state.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        })
    }

    // -- Test controls --

    pub fn seed_livery(&self, livery: Livery) {
        self.with_state(|state| {
            state.next_id = state.next_id.max(livery.id.0);
            state.liveries.insert(livery.id, livery);
        });
    }

    pub fn seed_user(&self, profile: UserProfile) {
        self.with_state(|state| {
            state.users.insert(profile.id.clone(), profile);
        });
    }

    pub fn livery(&self, id: LiveryId) -> Option<Livery> {
        self.with_state(|state| state.liveries.get(&id).cloned())
    }

    pub fn user(&self, user_id: &str) -> Option<UserProfile> {
        self.with_state(|state| state.users.get(user_id).cloned())
    }

    /// Change a stored livery behind every client's back.
    pub fn modify_livery(&self, id: LiveryId, f: impl FnOnce(&mut Livery)) {
        self.with_state(|state| {
            if let Some(livery) = state.liveries.get_mut(&id) {
                f(livery);
            }
        });
    }

    pub fn object(&self, path: &str) -> Option<(Bytes, String)> {
        self.with_state(|state| state.objects.get(path).cloned())
    }

    /// Fail the next call of `op` with `err`. Queued faults fire in order.
    pub fn fail_next(&self, op: Operation, err: GatewayError) {
        self.with_state(|state| state.faults.entry(op).or_default().push_back(err));
    }

    pub fn calls(&self, op: Operation) -> usize {
        self.with_state(|state| state.calls.get(&op).copied().unwrap_or(0))
    }

    /// Hold the next call of `op` until the returned sender fires (or drops).
    /// The call is counted as soon as it starts.
    pub fn hold_next(&self, op: Operation) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.with_state(|state| state.holds.entry(op).or_default().push_back(rx));
        tx
    }

    async fn toggle_membership(&self, kind: Operation, id: LiveryId) -> Result<Toggled> {
        self.enter(kind).await?;
        let session = require_session(self)?.clone();

        self.with_state(|state| {
            let livery = state
                .liveries
                .get_mut(&id)
                .ok_or_else(|| GatewayError::not_found("livery", id))?;
            let user = state
                .users
                .entry(session.user_id.clone())
                .or_insert_with(|| UserProfile {
                    id: session.user_id.clone(),
                    username: session.user_id.clone(),
                    image_url: String::new(),
                    likes: Default::default(),
                    saves: Default::default(),
                });

            let (members, counter) = if kind == Operation::ToggleLike {
                (&mut user.likes, &mut livery.likes)
            } else {
                (&mut user.saves, &mut livery.saves)
            };

            let active = if members.remove(&id) {
                *counter = counter.saturating_sub(1);
                false
            } else {
                members.insert(id);
                *counter += 1;
                true
            };

            Ok(Toggled {
                active,
                count: *counter,
            })
        })
    }

    fn owned_by_session(&self, id: LiveryId) -> Result<()> {
        let session = require_session(self)?;
        self.with_state(|state| {
            let livery = state
                .liveries
                .get(&id)
                .ok_or_else(|| GatewayError::not_found("livery", id))?;
            if livery.user_id != session.user_id {
                return Err(GatewayError::Auth(format!("livery {id} belongs to another user")));
            }
            Ok(())
        })
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn upgrade(&self, session: Session) -> Arc<dyn Gateway> {
        Arc::new(Self {
            state: self.state.clone(),
            session: Some(session),
        })
    }

    async fn count_liveries(&self, filter: &LiveryFilter) -> Result<u64> {
        self.enter(Operation::CountLiveries).await?;
        Ok(self.with_state(|state| {
            state
                .liveries
                .values()
                .filter(|l| filter.matches(&l.title, &l.vehicle_name))
                .count() as u64
        }))
    }

    async fn fetch_liveries(
        &self,
        filter: &LiveryFilter,
        sort: SortSpec,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Livery>> {
        self.enter(Operation::FetchLiveries).await?;
        Ok(self.with_state(|state| {
            let mut rows: Vec<Livery> = state
                .liveries
                .values()
                .filter(|l| filter.matches(&l.title, &l.vehicle_name))
                .cloned()
                .collect();
            rows.sort_by(|a, b| {
                let ordering = match sort.field {
                    SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                    SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                    SortField::Likes => a.likes.cmp(&b.likes),
                    SortField::Views => a.views.cmp(&b.views),
                    SortField::Title => a.title.cmp(&b.title),
                };
                match sort.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
            rows.into_iter()
                .skip(usize::try_from(offset).unwrap_or(usize::MAX))
                .take(limit as usize)
                .collect()
        }))
    }

    async fn get_livery(&self, id: LiveryId) -> Result<Livery> {
        self.enter(Operation::GetLivery).await?;
        self.livery(id)
            .ok_or_else(|| GatewayError::not_found("livery", id))
    }

    async fn insert_livery(&self, livery: &NewLivery) -> Result<Livery> {
        self.enter(Operation::InsertLivery).await?;
        let session = require_session(self)?;
        if livery.user_id != session.user_id {
            return Err(GatewayError::Auth("cannot publish as another user".into()));
        }

        Ok(self.with_state(|state| {
            state.next_id += 1;
            let now = Utc::now();
            let created = Livery {
                id: LiveryId(state.next_id),
                user_id: livery.user_id.clone(),
                title: livery.title.clone(),
                description: livery.description.clone(),
                vehicle_name: livery.vehicle_name.clone(),
                vehicle_type: livery.vehicle_type.clone(),
                images: livery.images.clone(),
                texture_ids: livery.texture_ids.clone(),
                advanced_customization: livery.advanced_customization.clone(),
                likes: 0,
                saves: 0,
                views: 0,
                created_at: now,
                updated_at: now,
            };
            state.liveries.insert(created.id, created.clone());
            created
        }))
    }

    async fn update_livery(&self, id: LiveryId, patch: &LiveryPatch) -> Result<Livery> {
        self.enter(Operation::UpdateLivery).await?;
        self.owned_by_session(id)?;

        self.with_state(|state| {
            let livery = state
                .liveries
                .get_mut(&id)
                .ok_or_else(|| GatewayError::not_found("livery", id))?;
            patch.apply_to(livery);
            livery.updated_at = Utc::now();
            Ok(livery.clone())
        })
    }

    async fn delete_livery(&self, id: LiveryId) -> Result<()> {
        self.enter(Operation::DeleteLivery).await?;
        self.owned_by_session(id)?;

        self.with_state(|state| {
            state
                .liveries
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| GatewayError::not_found("livery", id))
        })
    }

    async fn toggle_like(&self, id: LiveryId) -> Result<Toggled> {
        self.toggle_membership(Operation::ToggleLike, id).await
    }

    async fn toggle_save(&self, id: LiveryId) -> Result<Toggled> {
        self.toggle_membership(Operation::ToggleSave, id).await
    }

    async fn increment_view(&self, id: LiveryId) -> Result<u64> {
        self.enter(Operation::IncrementView).await?;
        self.with_state(|state| {
            let livery = state
                .liveries
                .get_mut(&id)
                .ok_or_else(|| GatewayError::not_found("livery", id))?;
            livery.views += 1;
            Ok(livery.views)
        })
    }

    async fn get_user(&self, user_id: &str) -> Result<UserProfile> {
        self.enter(Operation::GetUser).await?;
        self.user(user_id)
            .ok_or_else(|| GatewayError::not_found("user", user_id))
    }

    async fn count_user_liveries(&self, user_id: &str) -> Result<u64> {
        self.enter(Operation::CountUserLiveries).await?;
        Ok(self.with_state(|state| {
            state
                .liveries
                .values()
                .filter(|l| l.user_id == user_id)
                .count() as u64
        }))
    }

    async fn total_user_likes(&self, user_id: &str) -> Result<u64> {
        self.enter(Operation::TotalUserLikes).await?;
        Ok(self.with_state(|state| {
            state
                .liveries
                .values()
                .filter(|l| l.user_id == user_id)
                .map(|l| l.likes)
                .sum()
        }))
    }

    async fn total_user_saves(&self, user_id: &str) -> Result<u64> {
        self.enter(Operation::TotalUserSaves).await?;
        Ok(self.with_state(|state| {
            state
                .liveries
                .values()
                .filter(|l| l.user_id == user_id)
                .map(|l| l.saves)
                .sum()
        }))
    }

    async fn sum_user_engagement(&self, user_id: &str) -> Result<EngagementTotals> {
        self.enter(Operation::SumUserEngagement).await?;
        Ok(self.with_state(|state| {
            state
                .liveries
                .values()
                .filter(|l| l.user_id == user_id)
                .fold(EngagementTotals::default(), |acc, l| EngagementTotals {
                    likes: acc.likes + l.likes,
                    saves: acc.saves + l.saves,
                })
        }))
    }

    async fn upload_image(
        &self,
        object_path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String> {
        self.enter(Operation::UploadImage).await?;
        require_session(self)?;

        // Upsert, like the hosted bucket: a second upload replaces the object.
        self.with_state(|state| {
            state
                .objects
                .insert(object_path.to_string(), (bytes, content_type.to_string()));
        });
        Ok(format!("memory://livery-images/{object_path}"))
    }
}
