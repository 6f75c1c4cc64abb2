// Push notification dispatch
// Delivery belongs to a third-party service; this side composes, validates and hands off.

use crate::config::PushConfig;
use crate::container::ValidationError;
use crate::feedback::{FeedbackChannel, FeedbackMessage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub const SEND_FAILED: &str = "Failed to send notification";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PushError {
    #[error("Push service not configured: {0}")]
    NotConfigured(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("A notification is already being sent")]
    SendInProgress,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Push service rejected the request: {status_code} - {detail}")]
    Rejected { status_code: u16, detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Audience {
    Users(Vec<String>),
    Segment(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    pub title: String,
    pub message: String,
    pub audience: Audience,
    #[serde(default)]
    pub url: Option<String>,
}

impl PushNotification {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::required("title"));
        }
        if self.message.trim().is_empty() {
            return Err(ValidationError::required("message"));
        }
        match &self.audience {
            Audience::Users(ids) if ids.iter().all(|id| id.trim().is_empty()) => {
                return Err(ValidationError::new("audience", "select at least one user"));
            }
            Audience::Segment(name) if name.trim().is_empty() => {
                return Err(ValidationError::new("audience", "segment name is required"));
            }
            _ => {}
        }
        if let Some(url) = &self.url {
            if !url.is_empty() && !(url.starts_with("https://") || url.starts_with('/')) {
                return Err(ValidationError::new("url", "must be an https URL or an in-app path"));
            }
        }
        Ok(())
    }

    // Request body in the delivery service's format
    fn payload(&self, app_id: &str) -> Value {
        let mut body = json!({
            "app_id": app_id,
            "headings": { "en": self.title },
            "contents": { "en": self.message },
        });
        match &self.audience {
            Audience::Users(ids) => {
                let ids: Vec<&str> = ids
                    .iter()
                    .map(|id| id.trim())
                    .filter(|id| !id.is_empty())
                    .collect();
                body["include_external_user_ids"] = json!(ids);
            }
            Audience::Segment(name) => body["included_segments"] = json!([name]),
        }
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            body["url"] = json!(url);
        }
        body
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct DispatchReceipt {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub recipients: Option<u64>,
}

#[async_trait]
pub trait PushDispatcher: Send + Sync + 'static {
    async fn dispatch(&self, notification: &PushNotification) -> Result<DispatchReceipt, PushError>;
}

pub struct HttpPushDispatcher {
    client: reqwest::Client,
    config: PushConfig,
}

impl HttpPushDispatcher {
    pub fn new(config: PushConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl PushDispatcher for HttpPushDispatcher {
    async fn dispatch(
        &self,
        notification: &PushNotification,
    ) -> Result<DispatchReceipt, PushError> {
        if self.config.endpoint.is_empty() || self.config.app_id.is_empty() {
            return Err(PushError::NotConfigured("endpoint and app_id are required".to_string()));
        }

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&notification.payload(&self.config.app_id));
        if let Some(key) = &self.config.api_key {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Basic {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| PushError::NetworkError(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PushError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            return Err(PushError::Rejected {
                status_code: status.as_u16(),
                detail: body,
            });
        }

        // the receipt is informational; an odd body is not a failed send
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }
}

// Admin-side sender with feedback and a guard against double submits
pub struct NotificationComposer {
    dispatcher: Arc<dyn PushDispatcher>,
    feedback: FeedbackChannel,
    sending: AtomicBool,
}

impl NotificationComposer {
    pub fn new(dispatcher: Arc<dyn PushDispatcher>, feedback: FeedbackChannel) -> Self {
        Self {
            dispatcher,
            feedback,
            sending: AtomicBool::new(false),
        }
    }

    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst)
    }

    pub async fn send(
        &self,
        notification: &PushNotification,
    ) -> Result<DispatchReceipt, PushError> {
        if let Err(invalid) = notification.validate() {
            self.feedback.enqueue(
                FeedbackMessage::warning("Check the notification").with_body(invalid.to_string()),
            );
            return Err(invalid.into());
        }

        if self
            .sending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PushError::SendInProgress);
        }
        let result = self.dispatcher.dispatch(notification).await;
        self.sending.store(false, Ordering::SeqCst);

        match &result {
            Ok(receipt) => {
                tracing::info!(
                    id = ?receipt.id,
                    recipients = ?receipt.recipients,
                    "push notification sent"
                );
                self.feedback.success("Notification sent");
            }
            Err(e) => {
                tracing::warn!(error = %e, "push notification failed");
                self.feedback.enqueue(FeedbackMessage::error(SEND_FAILED));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackKind;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<PushNotification>>,
        fail: AtomicBool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl PushDispatcher for RecordingDispatcher {
        async fn dispatch(
            &self,
            notification: &PushNotification,
        ) -> Result<DispatchReceipt, PushError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(PushError::NetworkError("connection refused".to_string()));
            }
            self.sent.lock().push(notification.clone());
            Ok(DispatchReceipt {
                id: Some("n-1".to_string()),
                recipients: Some(2),
            })
        }
    }

    fn promo() -> PushNotification {
        PushNotification {
            title: "Weekend deals".to_string(),
            message: "20% off Lagos hotels".to_string(),
            audience: Audience::Segment("Subscribed Users".to_string()),
            url: Some("/hotels?city=lagos".to_string()),
        }
    }

    #[test]
    fn test_validation() {
        assert!(promo().validate().is_ok());

        let mut untitled = promo();
        untitled.title = " ".to_string();
        assert_eq!(untitled.validate().unwrap_err().field, "title");

        let mut nobody = promo();
        nobody.audience = Audience::Users(vec!["".to_string()]);
        assert_eq!(nobody.validate().unwrap_err().field, "audience");

        let mut odd_link = promo();
        odd_link.url = Some("ftp://example.com".to_string());
        assert_eq!(odd_link.validate().unwrap_err().field, "url");
    }

    #[test]
    fn test_payload_targets_users_or_segment() {
        let by_segment = promo().payload("app-1");
        assert_eq!(by_segment["included_segments"], json!(["Subscribed Users"]));
        assert_eq!(by_segment["headings"]["en"], "Weekend deals");
        assert!(by_segment.get("include_external_user_ids").is_none());

        let mut direct = promo();
        direct.audience =
            Audience::Users(vec!["u1".to_string(), " ".to_string(), "u2".to_string()]);
        direct.url = None;
        let by_user = direct.payload("app-1");
        assert_eq!(by_user["include_external_user_ids"], json!(["u1", "u2"]));
        assert!(by_user.get("url").is_none());
    }

    #[tokio::test]
    async fn test_send_success_and_failure_feedback() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let feedback = FeedbackChannel::default();
        let composer = NotificationComposer::new(dispatcher.clone(), feedback.clone());

        composer.send(&promo()).await.unwrap();
        assert_eq!(dispatcher.sent.lock().len(), 1);
        assert_eq!(feedback.visible()[0].kind, FeedbackKind::Success);

        dispatcher.fail.store(true, Ordering::SeqCst);
        let err = composer.send(&promo()).await.unwrap_err();
        assert!(matches!(err, PushError::NetworkError(_)));

        let latest = &feedback.visible_newest_first()[0];
        assert_eq!(latest.kind, FeedbackKind::Error);
        assert_eq!(latest.title, SEND_FAILED);
        assert!(!composer.is_sending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_submit_is_rejected() {
        let dispatcher = Arc::new(RecordingDispatcher {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let composer = NotificationComposer::new(dispatcher.clone(), FeedbackChannel::default());

        let note = promo();
        let (first, second) = tokio::join!(composer.send(&note), composer.send(&note));

        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), PushError::SendInProgress);
        assert_eq!(dispatcher.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_http_dispatcher() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notifications")
            .match_header("authorization", "Basic key-123")
            .match_body(mockito::Matcher::PartialJson(json!({
                "app_id": "app-1",
                "included_segments": ["Subscribed Users"]
            })))
            .with_status(200)
            .with_body(r#"{"id": "abc", "recipients": 120}"#)
            .create_async()
            .await;

        let dispatcher = HttpPushDispatcher::new(PushConfig {
            endpoint: format!("{}/notifications", server.url()),
            app_id: "app-1".to_string(),
            api_key: Some("key-123".to_string()),
        });

        let receipt = dispatcher.dispatch(&promo()).await.unwrap();
        assert_eq!(receipt.recipients, Some(120));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_dispatcher_requires_configuration() {
        let dispatcher = HttpPushDispatcher::new(PushConfig::default());
        assert!(matches!(
            dispatcher.dispatch(&promo()).await,
            Err(PushError::NotConfigured(_))
        ));
    }
}
