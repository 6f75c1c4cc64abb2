// Admin settings blocks
// Each block is a flat record fetched with GET and replaced wholesale with PUT on its own path.

use crate::api::{ApiClient, ApiError};
use crate::container::{Mutable, Resource, ValidationError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::marker::PhantomData;

pub trait SettingsBlock:
    Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const PATH: &'static str;
    const LABEL: &'static str;

    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

// Container resource for any settings block
pub struct Settings<T>(PhantomData<fn() -> T>);

impl<T> Settings<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Settings<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: SettingsBlock> Resource for Settings<T> {
    type State = T;

    fn label(&self) -> &str {
        T::LABEL
    }

    async fn fetch(&self, api: &ApiClient) -> Result<T, ApiError> {
        api.get(T::PATH).await
    }
}

#[async_trait]
impl<T: SettingsBlock> Mutable for Settings<T> {
    type Draft = T;

    fn validate(&self, _current: &T, draft: &T) -> Result<(), ValidationError> {
        draft.validate()
    }

    async fn submit(&self, api: &ApiClient, _current: &T, draft: &T) -> Result<T, ApiError> {
        api.put(T::PATH, draft).await
    }
}

fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

fn looks_like_email(value: &str) -> bool {
    let value = value.trim();
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SocialLink {
    pub platform: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FooterSettings {
    pub about_text: String,
    pub copyright: String,
    pub social_links: Vec<SocialLink>,
    pub show_newsletter: bool,
    // keys this client does not know about are carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SettingsBlock for FooterSettings {
    const PATH: &'static str = "/admin/footer-settings";
    const LABEL: &'static str = "Footer settings";

    fn validate(&self) -> Result<(), ValidationError> {
        for link in &self.social_links {
            require("social_links.platform", &link.platform)?;
            if !(link.url.starts_with("https://") || link.url.starts_with("http://")) {
                return Err(ValidationError::new(
                    "social_links.url",
                    format!("{} link must be an http(s) URL", link.platform),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactSettings {
    pub email: String,
    pub phone: String,
    pub address: String,
    pub whatsapp: Option<String>,
    pub support_hours: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SettingsBlock for ContactSettings {
    const PATH: &'static str = "/admin/contact-settings";
    const LABEL: &'static str = "Contact settings";

    fn validate(&self) -> Result<(), ValidationError> {
        require("email", &self.email)?;
        if !looks_like_email(&self.email) {
            return Err(ValidationError::new("email", "is not a valid email address"));
        }
        require("phone", &self.phone)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub site_name: String,
    pub tagline: String,
    pub default_currency: String,
    pub default_language: String,
    pub support_email: String,
    pub maintenance_mode: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SettingsBlock for GeneralSettings {
    const PATH: &'static str = "/settings/general";
    const LABEL: &'static str = "General settings";

    fn validate(&self) -> Result<(), ValidationError> {
        require("site_name", &self.site_name)?;
        if self.default_currency.len() != 3
            || !self.default_currency.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(ValidationError::new(
                "default_currency",
                "must be a three-letter currency code",
            ));
        }
        if !self.support_email.is_empty() && !looks_like_email(&self.support_email) {
            return Err(ValidationError::new("support_email", "is not a valid email address"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub two_factor_required: bool,
    pub session_timeout_minutes: u32,
    pub password_min_length: u32,
    pub max_login_attempts: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            two_factor_required: false,
            session_timeout_minutes: 60,
            password_min_length: 8,
            max_login_attempts: 5,
            extra: Map::new(),
        }
    }
}

impl SettingsBlock for SecuritySettings {
    const PATH: &'static str = "/settings/security";
    const LABEL: &'static str = "Security settings";

    fn validate(&self) -> Result<(), ValidationError> {
        if self.session_timeout_minutes == 0 {
            return Err(ValidationError::new("session_timeout_minutes", "must be at least 1"));
        }
        if self.password_min_length < 8 {
            return Err(ValidationError::new("password_min_length", "must be at least 8"));
        }
        if self.max_login_attempts == 0 {
            return Err(ValidationError::new("max_login_attempts", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BankTransferSettings {
    pub enabled: bool,
    pub bank_name: String,
    pub account_name: String,
    pub account_number: String,
    pub instructions: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SettingsBlock for BankTransferSettings {
    const PATH: &'static str = "/settings/bank-transfer";
    const LABEL: &'static str = "Bank transfer settings";

    // Details only matter once transfers are switched on
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.enabled {
            return Ok(());
        }
        require("bank_name", &self.bank_name)?;
        require("account_name", &self.account_name)?;
        require("account_number", &self.account_number)?;
        if !self.account_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::new("account_number", "must contain digits only"));
        }
        Ok(())
    }
}
