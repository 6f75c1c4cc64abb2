// Application context
// Owns the per-session services; views receive it instead of reaching for globals.

use crate::api::{ApiClient, ApiError};
use crate::config::ClientConfig;
use crate::container::{ContainerError, EntityContainer, Resource};
use crate::currency::{CurrencyDisplay, CurrencyPreference, CurrencyResource};
use crate::editor::SettingsEditor;
use crate::feedback::FeedbackChannel;
use crate::modules::{FeatureFlags, FlagWatcher, ModuleSettings};
use crate::notifications::{HttpPushDispatcher, NotificationComposer};
use crate::settings::{Settings, SettingsBlock};
use crate::storage::{FileStore, KeyValueStore, MemoryStore, StorageError, TokenStore};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

pub struct AppContext {
    config: ClientConfig,
    api: ApiClient,
    feedback: FeedbackChannel,
    preference: CurrencyPreference,
    currencies: Arc<EntityContainer<CurrencyResource>>,
    modules: Arc<EntityContainer<Settings<ModuleSettings>>>,
}

impl AppContext {
    pub fn start(config: ClientConfig, store: Arc<dyn KeyValueStore>) -> Result<Self, ApiError> {
        let api = ApiClient::http(config.clone(), TokenStore::new(store.clone()))?;
        Ok(Self::with_client(config, store, api))
    }

    // Same wiring over a caller-supplied client
    pub fn with_client(
        config: ClientConfig,
        store: Arc<dyn KeyValueStore>,
        api: ApiClient,
    ) -> Self {
        let feedback = FeedbackChannel::new(Duration::from_millis(config.feedback.default_ttl_ms));
        let preference = CurrencyPreference::new(store, config.locale.clone());
        let currencies = Arc::new(EntityContainer::new(
            CurrencyResource,
            api.clone(),
            feedback.clone(),
        ));
        let modules = Arc::new(EntityContainer::new(
            Settings::<ModuleSettings>::new(),
            api.clone(),
            feedback.clone(),
        ));

        tracing::info!(base_url = %config.base_url, "application context started");

        Self {
            config,
            api,
            feedback,
            preference,
            currencies,
            modules,
        }
    }

    /// Bootstrap from `config/portal` + `PORTAL__*` env vars. Uses a file-backed
    /// store when `storage_path` is set, an in-memory one otherwise.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = ClientConfig::load().context("failed to load portal configuration")?;
        let store: Arc<dyn KeyValueStore> = match &config.storage_path {
            Some(path) => Arc::new(
                FileStore::open(path)
                    .with_context(|| format!("failed to open client store at {}", path.display()))?,
            ),
            None => Arc::new(MemoryStore::new()),
        };
        Self::start(config, store).context("failed to build API client")
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn tokens(&self) -> &TokenStore {
        self.api.tokens()
    }

    pub fn feedback(&self) -> &FeedbackChannel {
        &self.feedback
    }

    pub fn preference(&self) -> &CurrencyPreference {
        &self.preference
    }

    pub fn currencies(&self) -> &Arc<EntityContainer<CurrencyResource>> {
        &self.currencies
    }

    pub fn modules(&self) -> &Arc<EntityContainer<Settings<ModuleSettings>>> {
        &self.modules
    }

    pub fn sign_in(&self, token: &str) -> Result<(), StorageError> {
        self.tokens().set_token(token)
    }

    pub fn sign_out(&self) -> Result<(), StorageError> {
        self.tokens().clear()
    }

    // A fresh container for a view-scoped resource, sharing client and feedback
    pub fn container<R: Resource>(&self, resource: R) -> EntityContainer<R> {
        EntityContainer::new(resource, self.api.clone(), self.feedback.clone())
    }

    pub fn editor<T: SettingsBlock>(&self) -> SettingsEditor<Settings<T>> {
        SettingsEditor::new(Arc::new(self.container(Settings::<T>::new())))
    }

    // Module toggles are edited through the shared container so flag watchers see the save
    pub fn module_editor(&self) -> SettingsEditor<Settings<ModuleSettings>> {
        SettingsEditor::new(self.modules.clone())
    }

    pub fn feature_flags(&self) -> FlagWatcher {
        FeatureFlags::follow(&self.modules)
    }

    pub fn currency_display(&self) -> CurrencyDisplay {
        let currencies = self.currencies.data().unwrap_or_default();
        CurrencyDisplay::new(&currencies, self.preference.preferred())
    }

    pub fn notification_composer(&self) -> NotificationComposer {
        NotificationComposer::new(
            Arc::new(HttpPushDispatcher::new(self.config.push.clone())),
            self.feedback.clone(),
        )
    }

    /// Loads the session-wide containers side by side. Both loads always run;
    /// the first failure is returned.
    pub async fn refresh_all(&self) -> Result<(), ContainerError> {
        let (currencies, modules) = futures::join!(self.currencies.load(), self.modules.load());
        currencies?;
        modules?;
        Ok(())
    }

    pub fn shutdown(&self) {
        self.currencies.detach();
        self.modules.detach();
        self.feedback.clear();
        tracing::info!("application context shut down");
    }
}
