// Entity state containers
// In-memory mirror of one server-owned entity, reconciled through load / mutate / remove.

use crate::api::{ApiClient, ApiError};
use crate::feedback::{FeedbackChannel, FeedbackMessage};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt::{Debug, Display};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn required(field: &str) -> Self {
        Self::new(field, "is required")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContainerError {
    #[error("{label} is not ready (currently {phase:?})")]
    NotReady { label: String, phase: Phase },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Result discarded: a newer request was issued")]
    Superseded,

    #[error("Result discarded: container detached")]
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Mutating,
    Error,
}

// A resource the container knows how to fetch
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    type State: Clone + PartialEq + Debug + Send + Sync + 'static;

    // Human-readable name used in feedback ("Footer settings", "Bookings")
    fn label(&self) -> &str;

    async fn fetch(&self, api: &ApiClient) -> Result<Self::State, ApiError>;
}

#[async_trait]
pub trait Mutable: Resource {
    type Draft: Send + Sync;

    // Runs before any network call; a failure blocks the submit
    fn validate(
        &self,
        _current: &Self::State,
        _draft: &Self::Draft,
    ) -> Result<(), ValidationError> {
        Ok(())
    }

    // Sends the whole draft and returns the new state as the server reports it
    async fn submit(
        &self,
        api: &ApiClient,
        current: &Self::State,
        draft: &Self::Draft,
    ) -> Result<Self::State, ApiError>;
}

#[async_trait]
pub trait Removable: Resource {
    type Id: Clone + PartialEq + Display + Send + Sync + 'static;

    async fn delete(&self, api: &ApiClient, id: &Self::Id) -> Result<(), ApiError>;

    // Local state once the server has acknowledged the delete
    fn without(&self, state: &Self::State, id: &Self::Id) -> Self::State;

    // Collections that must never be patched locally
    fn refetch_after_remove(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<S> {
    pub phase: Phase,
    pub data: Option<S>,
    pub error: Option<String>,
    // Bumped every time `data` is replaced
    pub revision: u64,
}

impl<S> Default for Snapshot<S> {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            data: None,
            error: None,
            revision: 0,
        }
    }
}

impl<S> Snapshot<S> {
    fn replace(&mut self, data: S) {
        self.data = Some(data);
        self.phase = Phase::Ready;
        self.error = None;
        self.revision += 1;
    }

    // Data stays in place: stale but still available
    fn fail(&mut self, message: String) {
        self.phase = Phase::Error;
        self.error = Some(message);
    }

    // Loaded data counts as a valid base even after a failure
    fn accepts_mutation(&self) -> bool {
        matches!(self.phase, Phase::Ready | Phase::Error) && self.data.is_some()
    }
}

/// Holds the last known server state of one resource.
///
/// * `load` keeps previously loaded data when it fails (stale but available).
/// * Every `load` takes a ticket; only the latest ticket's response is applied.
/// * `mutate` and `remove` apply nothing until the server has answered, and
///   replace state with the server's version rather than the draft.
/// * After `detach` every late result is dropped.
pub struct EntityContainer<R: Resource> {
    resource: R,
    api: ApiClient,
    feedback: FeedbackChannel,
    state: RwLock<Snapshot<R::State>>,
    latest_ticket: AtomicU64,
    detached: AtomicBool,
    publisher: watch::Sender<Snapshot<R::State>>,
}

impl<R: Resource> EntityContainer<R> {
    pub fn new(resource: R, api: ApiClient, feedback: FeedbackChannel) -> Self {
        let (publisher, _) = watch::channel(Snapshot::default());
        Self {
            resource,
            api,
            feedback,
            state: RwLock::new(Snapshot::default()),
            latest_ticket: AtomicU64::new(0),
            detached: AtomicBool::new(false),
            publisher,
        }
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn label(&self) -> &str {
        self.resource.label()
    }

    pub fn snapshot(&self) -> Snapshot<R::State> {
        self.state.read().clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.read().phase
    }

    pub fn data(&self) -> Option<R::State> {
        self.state.read().data.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.read().error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<R::State>> {
        self.publisher.subscribe()
    }

    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
        tracing::debug!(resource = self.label(), "container detached");
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    fn ensure_attached(&self) -> Result<(), ContainerError> {
        if self.is_detached() {
            return Err(ContainerError::Detached);
        }
        Ok(())
    }

    // Publishes while the write lock is held so subscribers see snapshots in state order
    fn update(&self, apply: impl FnOnce(&mut Snapshot<R::State>)) {
        let mut state = self.state.write();
        apply(&mut state);
        self.publisher.send_replace(state.clone());
    }

    // Same as `update`, but only if `ticket` is still the latest load
    fn update_for_ticket(
        &self,
        ticket: u64,
        apply: impl FnOnce(&mut Snapshot<R::State>),
    ) -> Result<(), ContainerError> {
        let mut state = self.state.write();
        if self.is_detached() {
            return Err(ContainerError::Detached);
        }
        if self.latest_ticket.load(Ordering::SeqCst) != ticket {
            return Err(ContainerError::Superseded);
        }
        apply(&mut state);
        self.publisher.send_replace(state.clone());
        Ok(())
    }

    fn replace_data(&self, data: R::State) {
        self.update(|state| state.replace(data));
    }

    fn record_failure(&self, message: String) {
        self.update(|state| state.fail(message));
    }

    // Invalidates every load still in flight
    fn supersede_loads(&self) {
        self.latest_ticket.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn load(&self) -> Result<R::State, ContainerError> {
        self.ensure_attached()?;

        // ticket and phase change together so only the newest load can leave it Loading
        let ticket = {
            let mut state = self.state.write();
            state.phase = Phase::Loading;
            self.publisher.send_replace(state.clone());
            self.latest_ticket.fetch_add(1, Ordering::SeqCst) + 1
        };
        tracing::debug!(resource = self.label(), ticket, "loading");

        let result = self.resource.fetch(&self.api).await;

        let applied = match &result {
            Ok(data) => {
                let data = data.clone();
                self.update_for_ticket(ticket, |state| state.replace(data))
            }
            Err(e) => {
                let message = e.user_message();
                self.update_for_ticket(ticket, |state| state.fail(message))
            }
        };
        if let Err(dropped) = applied {
            tracing::debug!(
                resource = self.label(),
                ticket,
                reason = %dropped,
                "dropping load result"
            );
            return Err(dropped);
        }

        result.map_err(|e| {
            self.feedback.enqueue(
                FeedbackMessage::error(format!("Failed to load {}", self.label().to_lowercase()))
                    .with_body(e.user_message()),
            );
            e.into()
        })
    }

    // Marks the container busy if it holds a mutable base; returns that base
    fn begin_mutation(&self) -> Result<R::State, ContainerError> {
        let base = {
            let mut state = self.state.write();
            if !state.accepts_mutation() {
                return Err(ContainerError::NotReady {
                    label: self.label().to_string(),
                    phase: state.phase,
                });
            }
            state.phase = Phase::Mutating;
            self.publisher.send_replace(state.clone());
            state.data.clone()
        };

        base.ok_or_else(|| ContainerError::NotReady {
            label: self.label().to_string(),
            phase: Phase::Idle,
        })
    }

    fn fail_mutation(&self, title: String, error: ApiError) -> ContainerError {
        let message = error.user_message();
        self.record_failure(message.clone());
        self.feedback
            .enqueue(FeedbackMessage::error(title).with_body(message));
        error.into()
    }
}

impl<R: Mutable> EntityContainer<R> {
    pub async fn mutate(&self, draft: &R::Draft) -> Result<R::State, ContainerError> {
        self.ensure_attached()?;

        if let Some(current) = self.data() {
            if let Err(invalid) = self.resource.validate(&current, draft) {
                self.feedback.enqueue(
                    FeedbackMessage::warning(format!("Check {}", self.label().to_lowercase()))
                        .with_body(invalid.to_string()),
                );
                return Err(invalid.into());
            }
        }

        let current = self.begin_mutation()?;
        let result = self.resource.submit(&self.api, &current, draft).await;

        if self.is_detached() {
            return Err(ContainerError::Detached);
        }

        match result {
            Ok(confirmed) => {
                self.supersede_loads();
                self.replace_data(confirmed.clone());
                self.feedback.success(format!("{} saved", self.label()));
                Ok(confirmed)
            }
            Err(e) => {
                let title = format!("Failed to save {}", self.label().to_lowercase());
                Err(self.fail_mutation(title, e))
            }
        }
    }
}

impl<R: Removable> EntityContainer<R> {
    pub async fn remove(&self, id: &R::Id) -> Result<(), ContainerError> {
        self.ensure_attached()?;

        let current = self.begin_mutation()?;
        let result = self.resource.delete(&self.api, id).await;

        if self.is_detached() {
            return Err(ContainerError::Detached);
        }

        if let Err(e) = result {
            return Err(self.fail_mutation(format!("Failed to remove item {}", id), e));
        }

        let next = if self.resource.refetch_after_remove() {
            match self.resource.fetch(&self.api).await {
                Ok(fresh) => fresh,
                Err(e) => {
                    // the delete went through; fall back to dropping it locally
                    tracing::warn!(
                        resource = self.label(),
                        error = %e,
                        "refetch after remove failed"
                    );
                    self.resource.without(&current, id)
                }
            }
        } else {
            self.resource.without(&current, id)
        };

        if self.is_detached() {
            return Err(ContainerError::Detached);
        }

        self.supersede_loads();
        self.replace_data(next);
        self.feedback.success(format!("{}: item removed", self.label()));
        Ok(())
    }
}

impl<R: Resource> Debug for EntityContainer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("EntityContainer")
            .field("resource", &self.resource.label())
            .field("phase", &state.phase)
            .field("revision", &state.revision)
            .field("detached", &self.is_detached())
            .finish()
    }
}
