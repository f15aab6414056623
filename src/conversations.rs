//! Conversation list of the active app
//!
//! The store is locally authoritative: provisional conversations are
//! inserted without a network call and only become real once the backend
//! answers the first message. A refresh replaces the list with server
//! data, keeping a provisional entry only while it is the active one.
//!
//! Two guards keep async continuations honest:
//!
//! - the active id lives in a [`LatestValue`], so the auto-select step
//!   after a listing reads the value current at resolution time;
//! - every (re)initialization bumps an epoch, and listings issued under an
//!   older epoch are dropped on arrival.
//!
//! A store gated on the committed app (see [`ConversationStore::gated_by`])
//! clears itself as soon as the committed app stops being the one it was
//! listed for, and refuses mutations until it is initialized again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::api::ConversationApi;
use crate::error::{DifyChatError, Result};
use crate::models::{ConversationId, ConversationSummary, CurrentApp};
use crate::notify::Notifier;
use crate::session::LatestValue;

/// Where the store is in its per-app lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationPhase {
    /// No app has been bound yet
    Uninitialized,
    /// The first listing for the current app is in flight
    Listing,
    /// A provisional conversation is active
    ProvisionalActive,
    /// A persisted conversation is active
    Populated,
}

#[derive(Debug)]
struct StoreState {
    items: Vec<ConversationSummary>,
    phase: ConversationPhase,
    app_id: Option<String>,
}

/// Conversation list and active selection for one app at a time
pub struct ConversationStore {
    api: Arc<dyn ConversationApi>,
    notifier: Notifier,
    default_name: String,
    state: Mutex<StoreState>,
    active: LatestValue<Option<ConversationId>>,
    epoch: AtomicU64,
    committed: Option<watch::Receiver<Option<CurrentApp>>>,
}

impl ConversationStore {
    /// Create an empty store
    pub fn new(api: Arc<dyn ConversationApi>, notifier: Notifier, default_name: impl Into<String>) -> Self {
        Self {
            api,
            notifier,
            default_name: default_name.into(),
            state: Mutex::new(StoreState {
                items: Vec::new(),
                phase: ConversationPhase::Uninitialized,
                app_id: None,
            }),
            active: LatestValue::new(None),
            epoch: AtomicU64::new(0),
            committed: None,
        }
    }

    /// Tie the list to the committed app
    ///
    /// Once the committed app changes (including to nothing, while a switch
    /// is loading or after it failed) the list is cleared and mutations are
    /// rejected until [`initialize`](Self::initialize) runs for the new app.
    pub fn gated_by(mut self, committed: watch::Receiver<Option<CurrentApp>>) -> Self {
        self.committed = Some(committed);
        self
    }

    /// Drop every conversation and the active id
    ///
    /// Listings and mutations still in flight are discarded when they
    /// return.
    pub fn reset(&self) {
        let mut state = self.lock();
        self.clear(&mut state);
    }

    /// Reset for a newly active app and fetch its conversations
    ///
    /// With `open_new` a provisional conversation is added after the first
    /// listing unless one is already active.
    ///
    /// # Errors
    ///
    /// Returns the listing error; it has already been notified.
    pub async fn initialize(&self, open_new: bool) -> Result<()> {
        let epoch = {
            let mut state = self.lock();
            state.items.clear();
            state.phase = ConversationPhase::Listing;
            state.app_id = self.committed_app_id();
            self.active.set(None);
            self.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };
        tracing::debug!(epoch, "Initializing conversation store");

        self.fetch(epoch).await?;

        if open_new && !self.active_is_temporary() && self.epoch.load(Ordering::SeqCst) == epoch {
            self.add_conversation()?;
        }
        Ok(())
    }

    /// Re-list from the server
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::Validation`] while no list is loaded, or
    /// the listing error; local state is left as it was.
    pub async fn refresh(&self) -> Result<()> {
        let epoch = self.bound_epoch()?;
        self.fetch(epoch).await
    }

    /// Insert a provisional conversation at the head and activate it
    ///
    /// Local only; the backend creates the real conversation on the first
    /// message sent in it.
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::Validation`] while no list is loaded
    pub fn add_conversation(&self) -> Result<ConversationId> {
        let mut state = self.lock();
        if state.phase == ConversationPhase::Uninitialized {
            return Err(not_ready());
        }
        Ok(self.push_provisional(&mut state))
    }

    /// Make an existing conversation active
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::ConversationNotFound`] for unknown ids
    pub fn select(&self, id: &ConversationId) -> Result<()> {
        let mut state = self.lock();
        if !state.items.iter().any(|c| &c.id == id) {
            return Err(DifyChatError::ConversationNotFound(id.to_string()).into());
        }
        self.active.set(Some(id.clone()));
        state.phase = phase_for(id);
        Ok(())
    }

    /// Rename a persisted conversation, then re-list
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::Validation`] for blank names, provisional
    /// ids or while no list is loaded (checked before any request), or the
    /// remote error.
    pub async fn rename(&self, id: &ConversationId, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DifyChatError::Validation("Conversation name is empty".into()).into());
        }
        if id.is_temporary() {
            return Err(DifyChatError::Validation(
                "A new conversation cannot be renamed before its first message".into(),
            )
            .into());
        }
        let epoch = self.bound_epoch()?;

        if let Err(e) = self.api.rename_conversation(&id.to_string(), name).await {
            self.notifier.error(format!("Fail to rename conversation: {}", e));
            return Err(e);
        }
        self.notifier.success("Edited");
        self.fetch(epoch).await
    }

    /// Delete a conversation
    ///
    /// Provisional conversations are removed locally without a request.
    /// Persisted ones are deleted remotely and the list is re-fetched. In
    /// both cases the store never ends up empty.
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::Validation`] while no list is loaded,
    /// [`DifyChatError::ConversationNotFound`] for unknown provisional ids,
    /// or the remote error.
    pub async fn delete(&self, id: &ConversationId) -> Result<()> {
        let epoch = self.bound_epoch()?;
        if id.is_temporary() {
            let mut state = self.lock();
            let before = state.items.len();
            state.items.retain(|c| &c.id != id);
            if state.items.len() == before {
                return Err(DifyChatError::ConversationNotFound(id.to_string()).into());
            }
            if self.active.is(&Some(id.clone())) {
                match state.items.first().map(|c| c.id.clone()) {
                    Some(head) => {
                        state.phase = phase_for(&head);
                        self.active.set(Some(head));
                    }
                    None => {
                        self.push_provisional(&mut state);
                    }
                }
            }
            return Ok(());
        }

        if let Err(e) = self.api.delete_conversation(&id.to_string()).await {
            self.notifier.error(format!("Fail to delete conversation: {}", e));
            return Err(e);
        }
        if self.epoch.load(Ordering::SeqCst) == epoch && self.active.is(&Some(id.clone())) {
            self.active.set(None);
        }
        self.fetch(epoch).await
    }

    /// Hand a provisional conversation over to its persisted id
    ///
    /// Called once the first message exchange in `temp_id` returned the
    /// backend id. If the provisional conversation is still active the
    /// persisted one takes its place; the list is then re-fetched, which
    /// drops the provisional record.
    ///
    /// # Errors
    ///
    /// Returns error for an invalid persisted id or a failed listing.
    pub async fn complete_exchange(&self, temp_id: &ConversationId, persisted_id: &str) -> Result<()> {
        let persisted = ConversationId::persisted(persisted_id)?;
        let epoch = self.bound_epoch()?;
        if self.active.is(&Some(temp_id.clone())) {
            self.active.set(Some(persisted));
        }
        self.fetch(epoch).await
    }

    /// Snapshot of the list, newest first
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.lock().items.clone()
    }

    /// Id of the active conversation
    pub fn active_id(&self) -> Option<ConversationId> {
        let _state = self.lock();
        self.active.get()
    }

    /// The active conversation's summary
    pub fn active_conversation(&self) -> Option<ConversationSummary> {
        let state = self.lock();
        let active = self.active.get()?;
        state.items.iter().find(|c| c.id == active).cloned()
    }

    /// Lifecycle phase
    pub fn phase(&self) -> ConversationPhase {
        self.lock().phase
    }

    /// Whether a provisional conversation exists
    pub fn has_temporary(&self) -> bool {
        self.lock().items.iter().any(ConversationSummary::is_temporary)
    }

    async fn fetch(&self, epoch: u64) -> Result<()> {
        let result = self.api.list_conversations().await;

        let mut state = self.lock();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!(epoch, "Discarding conversation list for a previous app");
            return Ok(());
        }

        let items = match result {
            Ok(items) => items,
            Err(e) => {
                drop(state);
                self.notifier.error(format!("Fail to get conversations: {}", e));
                return Err(e);
            }
        };

        let active = self.active.get();
        let kept = active
            .as_ref()
            .filter(|id| id.is_temporary())
            .and_then(|id| state.items.iter().find(|c| &c.id == id).cloned());

        state.items = items;
        if let Some(provisional) = kept {
            state.items.insert(0, provisional);
        }

        match active.filter(|id| state.items.iter().any(|c| &c.id == id)) {
            Some(id) => state.phase = phase_for(&id),
            None => match state.items.first().map(|c| c.id.clone()) {
                Some(head) => {
                    state.phase = phase_for(&head);
                    self.active.set(Some(head));
                }
                None => {
                    self.push_provisional(&mut state);
                }
            },
        }
        tracing::debug!(count = state.items.len(), "Conversation list refreshed");
        Ok(())
    }

    fn push_provisional(&self, state: &mut StoreState) -> ConversationId {
        let summary = ConversationSummary::provisional(self.default_name.clone());
        let id = summary.id.clone();
        state.items.insert(0, summary);
        state.phase = ConversationPhase::ProvisionalActive;
        self.active.set(Some(id.clone()));
        id
    }

    fn active_is_temporary(&self) -> bool {
        self.active.get().map_or(false, |id| id.is_temporary())
    }

    /// Current epoch, provided a list is loaded for the committed app
    fn bound_epoch(&self) -> Result<u64> {
        let state = self.lock();
        if state.phase == ConversationPhase::Uninitialized {
            return Err(not_ready());
        }
        Ok(self.epoch.load(Ordering::SeqCst))
    }

    fn committed_app_id(&self) -> Option<String> {
        self.committed
            .as_ref()
            .and_then(|rx| rx.borrow().as_ref().map(|app| app.id().to_string()))
    }

    fn clear(&self, state: &mut StoreState) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        state.items.clear();
        state.phase = ConversationPhase::Uninitialized;
        state.app_id = None;
        self.active.set(None);
    }

    /// Lock the state, clearing it first if the committed app moved on
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if self.committed.is_some()
            && state.phase != ConversationPhase::Uninitialized
            && self.committed_app_id() != state.app_id
        {
            tracing::debug!(app_id = ?state.app_id, "Committed app changed, clearing conversations");
            self.clear(&mut state);
        }
        state
    }
}

fn not_ready() -> anyhow::Error {
    DifyChatError::Validation("No app is ready".into()).into()
}

fn phase_for(id: &ConversationId) -> ConversationPhase {
    if id.is_temporary() {
        ConversationPhase::ProvisionalActive
    } else {
        ConversationPhase::Populated
    }
}
