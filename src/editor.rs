// Settings editors
// A local draft over one container; nothing reaches the container until `save`.

use crate::container::{ContainerError, EntityContainer, Mutable, ValidationError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("{0} has not been loaded yet")]
    NotLoaded(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationError),

    #[error("A save is already in progress")]
    SaveInProgress,

    #[error(transparent)]
    Container(ContainerError),
}

impl From<ContainerError> for EditorError {
    fn from(error: ContainerError) -> Self {
        match error {
            ContainerError::Validation(invalid) => EditorError::Validation(invalid),
            other => EditorError::Container(other),
        }
    }
}

// Clears the in-flight flag even if the save future is dropped midway
struct SavingGuard<'a>(&'a AtomicBool);

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SettingsEditor<R: Mutable> {
    container: Arc<EntityContainer<R>>,
    loaded: Mutex<Option<R::State>>,
    draft: Mutex<Option<R::Draft>>,
    saving: AtomicBool,
}

impl<R> SettingsEditor<R>
where
    R: Mutable,
    R::Draft: Clone + PartialEq + From<R::State>,
{
    // Starts from whatever the container already holds
    pub fn new(container: Arc<EntityContainer<R>>) -> Self {
        let editor = Self {
            container,
            loaded: Mutex::new(None),
            draft: Mutex::new(None),
            saving: AtomicBool::new(false),
        };
        if let Some(state) = editor.container.data() {
            editor.rebase(state);
        }
        editor
    }

    pub fn container(&self) -> &Arc<EntityContainer<R>> {
        &self.container
    }

    /// Seeds the draft from the container, loading it first if it is still empty.
    pub async fn open(&self) -> Result<R::Draft, EditorError> {
        let state = match self.container.data() {
            Some(state) => state,
            None => self.container.load().await?,
        };
        self.rebase(state);
        self.draft().ok_or_else(|| self.not_loaded())
    }

    fn rebase(&self, state: R::State) {
        *self.draft.lock() = Some(R::Draft::from(state.clone()));
        *self.loaded.lock() = Some(state);
    }

    fn not_loaded(&self) -> EditorError {
        EditorError::NotLoaded(self.container.label().to_string())
    }

    pub fn draft(&self) -> Option<R::Draft> {
        self.draft.lock().clone()
    }

    pub fn edit(&self, f: impl FnOnce(&mut R::Draft)) -> Result<(), EditorError> {
        let mut draft = self.draft.lock();
        match draft.as_mut() {
            Some(draft) => {
                f(draft);
                Ok(())
            }
            None => Err(self.not_loaded()),
        }
    }

    pub fn is_dirty(&self) -> bool {
        let loaded = self.loaded.lock();
        let draft = self.draft.lock();
        match (loaded.as_ref(), draft.as_ref()) {
            (Some(loaded), Some(draft)) => R::Draft::from(loaded.clone()) != *draft,
            _ => false,
        }
    }

    pub fn reset(&self) {
        let loaded = self.loaded.lock().clone();
        *self.draft.lock() = loaded.map(R::Draft::from);
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    /// Submits the whole draft through the container.
    ///
    /// On success the draft is rebased onto the server's acknowledgement.
    /// A validation failure leaves the draft as typed so it can be fixed;
    /// any other failure reverts it to the last loaded state.
    pub async fn save(&self) -> Result<R::State, EditorError> {
        let draft = self.draft().ok_or_else(|| self.not_loaded())?;

        if self
            .saving
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EditorError::SaveInProgress);
        }
        let _guard = SavingGuard(&self.saving);

        match self.container.mutate(&draft).await {
            Ok(confirmed) => {
                self.rebase(confirmed.clone());
                Ok(confirmed)
            }
            Err(ContainerError::Validation(invalid)) => Err(EditorError::Validation(invalid)),
            Err(e) => {
                tracing::debug!(
                    resource = self.container.label(),
                    error = %e,
                    "save failed, reverting draft"
                );
                self.reset();
                Err(e.into())
            }
        }
    }
}
