// Module toggles and the feature flags / entry points derived from them

use crate::container::{EntityContainer, Snapshot, ValidationError};
use crate::settings::{Settings, SettingsBlock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tokio::sync::watch;

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSettings {
    #[serde(default = "enabled")]
    pub hotel_booking: bool,
    #[serde(default = "enabled")]
    pub car_rental: bool,
    #[serde(default = "enabled")]
    pub bundles: bool,
    #[serde(default = "enabled")]
    pub online_payments: bool,
    #[serde(default = "enabled")]
    pub bank_transfer: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            hotel_booking: true,
            car_rental: true,
            bundles: true,
            online_payments: true,
            bank_transfer: true,
            extra: Map::new(),
        }
    }
}

impl SettingsBlock for ModuleSettings {
    const PATH: &'static str = "/admin/module-settings";
    const LABEL: &'static str = "Module settings";

    fn validate(&self) -> Result<(), ValidationError> {
        if !self.hotel_booking && !self.car_rental {
            return Err(ValidationError::new(
                "hotel_booking",
                "at least one of hotel booking or car rental must stay enabled",
            ));
        }
        if !self.online_payments && !self.bank_transfer {
            return Err(ValidationError::new(
                "online_payments",
                "at least one payment method must stay enabled",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    HotelBooking,
    CarRental,
    Bundles,
    OnlinePayments,
    BankTransfer,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    enabled: BTreeSet<Feature>,
}

impl FeatureFlags {
    pub fn from_settings(settings: &ModuleSettings) -> Self {
        let enabled = [
            (Feature::HotelBooking, settings.hotel_booking),
            (Feature::CarRental, settings.car_rental),
            (Feature::Bundles, settings.bundles),
            (Feature::OnlinePayments, settings.online_payments),
            (Feature::BankTransfer, settings.bank_transfer),
        ]
        .into_iter()
        .filter_map(|(feature, on)| on.then_some(feature))
        .collect();
        Self { enabled }
    }

    // Nothing is switched on until the module settings have loaded
    pub fn from_snapshot(snapshot: &Snapshot<ModuleSettings>) -> Self {
        snapshot
            .data
            .as_ref()
            .map(Self::from_settings)
            .unwrap_or_default()
    }

    pub fn follow(container: &EntityContainer<Settings<ModuleSettings>>) -> FlagWatcher {
        FlagWatcher::new(container.subscribe())
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.enabled.contains(&feature)
    }

    pub fn all_enabled(&self, features: &[Feature]) -> bool {
        features.iter().all(|f| self.is_enabled(*f))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavEntry {
    pub label: &'static str,
    pub route: &'static str,
    pub requires: &'static [Feature],
}

pub const NAV_ENTRIES: &[NavEntry] = &[
    NavEntry { label: "Home", route: "/", requires: &[] },
    NavEntry { label: "Hotels", route: "/hotels", requires: &[Feature::HotelBooking] },
    NavEntry { label: "Car rentals", route: "/cars", requires: &[Feature::CarRental] },
    NavEntry {
        label: "Bundles",
        route: "/bundles",
        requires: &[Feature::Bundles, Feature::HotelBooking, Feature::CarRental],
    },
    NavEntry { label: "Destinations", route: "/destinations", requires: &[] },
    NavEntry { label: "Favorites", route: "/favorites", requires: &[] },
    NavEntry {
        label: "My hotel bookings",
        route: "/account/bookings/hotels",
        requires: &[Feature::HotelBooking],
    },
    NavEntry {
        label: "My car rentals",
        route: "/account/bookings/cars",
        requires: &[Feature::CarRental],
    },
];

// An entry shows only when every module it depends on is on
pub fn navigation(flags: &FeatureFlags) -> Vec<&'static NavEntry> {
    NAV_ENTRIES
        .iter()
        .filter(|entry| flags.all_enabled(entry.requires))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Card,
    BankTransfer,
}

pub fn payment_methods(flags: &FeatureFlags) -> Vec<PaymentMethod> {
    let mut methods = Vec::new();
    if flags.is_enabled(Feature::OnlinePayments) {
        methods.push(PaymentMethod::Card);
    }
    if flags.is_enabled(Feature::BankTransfer) {
        methods.push(PaymentMethod::BankTransfer);
    }
    methods
}

// Follows the module settings container so dependents react without a page reload
pub struct FlagWatcher {
    updates: watch::Receiver<Snapshot<ModuleSettings>>,
    last: FeatureFlags,
}

impl FlagWatcher {
    pub fn new(updates: watch::Receiver<Snapshot<ModuleSettings>>) -> Self {
        let last = FeatureFlags::from_snapshot(&updates.borrow());
        Self { updates, last }
    }

    pub fn current(&mut self) -> FeatureFlags {
        self.last = FeatureFlags::from_snapshot(&self.updates.borrow_and_update());
        self.last.clone()
    }

    /// Resolves once the derived flags differ from the last value handed out.
    /// Returns None once the container is gone.
    pub async fn changed(&mut self) -> Option<FeatureFlags> {
        loop {
            let now = FeatureFlags::from_snapshot(&self.updates.borrow_and_update());
            if now != self.last {
                self.last = now.clone();
                return Some(now);
            }
            self.updates.changed().await.ok()?;
        }
    }
}
