// Client core for the travel booking portal

// Ambient
pub mod config;
pub mod logging;
pub mod storage;

// Remote access and state
pub mod api;
pub mod container;
pub mod editor;
pub mod feedback;

// Entities
pub mod analytics;
pub mod bookings;
pub mod currency;
pub mod destinations;
pub mod favorites;
pub mod modules;
pub mod settings;

pub mod app;
pub mod notifications;

// Re-export key types for convenience
pub use api::{sanitize, ApiClient, ApiError, ClientStats, HttpTransport, Transport};
pub use app::AppContext;
pub use config::ClientConfig;
pub use container::{
    ContainerError, EntityContainer, Mutable, Phase, Removable, Resource, Snapshot, ValidationError,
};
pub use currency::{convert, format, CurrencyDisplay, CurrencyPreference, RateTable, SymbolTable};
pub use editor::{EditorError, SettingsEditor};
pub use feedback::{FeedbackChannel, FeedbackKind, FeedbackMessage};
pub use modules::{navigation, Feature, FeatureFlags, ModuleSettings};
pub use notifications::{NotificationComposer, PushDispatcher, PushNotification};
pub use settings::{Settings, SettingsBlock};
pub use storage::{FileStore, KeyValueStore, MemoryStore, TokenStore};
