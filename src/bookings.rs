// Bookings: hotel, car and bundle reservations as the admin / customer views see them

use crate::api::{ApiClient, ApiError};
use crate::container::{Mutable, Removable, Resource, ValidationError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type BookingId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingType {
    Hotel,
    Car,
    Bundle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub reference: String,
    #[serde(rename = "type", alias = "booking_type")]
    pub booking_type: BookingType,
    pub status: BookingStatus,
    pub amount: f64,
    pub currency: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn nights(&self) -> Option<i64> {
        self.end_date
            .map(|end| (end - self.start_date).num_days())
            .filter(|days| *days >= 0)
    }
}

// Status changes go through one of these
#[derive(Debug, Clone, PartialEq)]
pub enum BookingAction {
    SetStatus {
        id: BookingId,
        status: BookingStatus,
    },
    RequestCancellation {
        id: BookingId,
        reason: Option<String>,
    },
}

impl BookingAction {
    pub fn id(&self) -> BookingId {
        match self {
            BookingAction::SetStatus { id, .. }
            | BookingAction::RequestCancellation { id, .. } => *id,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusBody {
    status: BookingStatus,
}

#[derive(Debug, Serialize)]
struct CancellationBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct BookingsResource;

#[async_trait]
impl Resource for BookingsResource {
    type State = Vec<Booking>;

    fn label(&self) -> &str {
        "Bookings"
    }

    async fn fetch(&self, api: &ApiClient) -> Result<Vec<Booking>, ApiError> {
        api.get("/bookings").await
    }
}

#[async_trait]
impl Mutable for BookingsResource {
    type Draft = BookingAction;

    fn validate(
        &self,
        current: &Vec<Booking>,
        draft: &BookingAction,
    ) -> Result<(), ValidationError> {
        let booking = current
            .iter()
            .find(|b| b.id == draft.id())
            .ok_or_else(|| {
                ValidationError::new("id", format!("booking {} is not loaded", draft.id()))
            })?;

        if booking.status == BookingStatus::Cancelled {
            return Err(ValidationError::new(
                "status",
                format!("booking {} is already cancelled", booking.reference),
            ));
        }
        Ok(())
    }

    async fn submit(
        &self,
        api: &ApiClient,
        current: &Vec<Booking>,
        draft: &BookingAction,
    ) -> Result<Vec<Booking>, ApiError> {
        let updated: Booking = match draft {
            BookingAction::SetStatus { id, status } => {
                api.put(&format!("/bookings/{}", id), &StatusBody { status: *status })
                    .await?
            }
            BookingAction::RequestCancellation { id, reason } => {
                api.post(
                    &format!("/bookings/{}/cancel", id),
                    &CancellationBody {
                        reason: reason.as_deref(),
                    },
                )
                .await?
            }
        };

        Ok(current
            .iter()
            .map(|b| if b.id == updated.id { updated.clone() } else { b.clone() })
            .collect())
    }
}

#[async_trait]
impl Removable for BookingsResource {
    type Id = BookingId;

    async fn delete(&self, api: &ApiClient, id: &BookingId) -> Result<(), ApiError> {
        api.delete(&format!("/bookings/{}", id)).await
    }

    fn without(&self, state: &Vec<Booking>, id: &BookingId) -> Vec<Booking> {
        state.iter().filter(|b| b.id != *id).cloned().collect()
    }
}

pub fn filter_bookings<'a>(
    bookings: &'a [Booking],
    status: Option<BookingStatus>,
    booking_type: Option<BookingType>,
) -> Vec<&'a Booking> {
    bookings
        .iter()
        .filter(|b| status.map_or(true, |s| b.status == s))
        .filter(|b| booking_type.map_or(true, |t| b.booking_type == t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_transport::{client_with, ScriptedTransport};
    use crate::api::Method;
    use crate::container::{ContainerError, EntityContainer, Phase};
    use crate::feedback::{FeedbackChannel, FeedbackKind};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn booking_json(id: u64, status: &str) -> Value {
        json!({
            "id": id,
            "reference": format!("TRV-{:04}", id),
            "type": if id % 2 == 0 { "car" } else { "hotel" },
            "status": status,
            "amount": 125000.0,
            "currency": "NGN",
            "start_date": "2025-06-01",
            "end_date": "2025-06-05"
        })
    }

    fn loaded_container(
        transport: &Arc<ScriptedTransport>,
    ) -> (EntityContainer<BookingsResource>, FeedbackChannel) {
        transport.reply(
            Method::Get,
            "/bookings",
            200,
            json!([booking_json(1, "confirmed"), booking_json(2, "pending")]),
        );
        let feedback = FeedbackChannel::default();
        let container =
            EntityContainer::new(
                BookingsResource,
                client_with(transport.clone()),
                feedback.clone(),
            );
        (container, feedback)
    }

    fn ids(container: &EntityContainer<BookingsResource>) -> Vec<BookingId> {
        container.data().unwrap().iter().map(|b| b.id).collect()
    }

    #[test]
    fn test_booking_wire_format() {
        let booking: Booking = serde_json::from_value(booking_json(2, "pending")).unwrap();
        assert_eq!(booking.booking_type, BookingType::Car);
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.nights(), Some(4));

        let back = serde_json::to_value(&booking).unwrap();
        assert_eq!(back["type"], "car");
        assert_eq!(back["status"], "pending");
    }

    #[tokio::test]
    async fn test_remove_applies_only_after_acknowledgement() {
        let transport = ScriptedTransport::new();
        transport.reply(Method::Delete, "/bookings/2", 204, Value::Null);
        let (container, _) = loaded_container(&transport);
        container.load().await.unwrap();

        container.remove(&2).await.unwrap();

        assert_eq!(ids(&container), vec![1]);
        assert_eq!(container.phase(), Phase::Ready);
    }

    #[tokio::test]
    async fn test_failed_remove_keeps_both_bookings() {
        let transport = ScriptedTransport::new();
        transport.reply(
            Method::Delete,
            "/bookings/2",
            409,
            json!({"detail": "Booking has payments"}),
        );
        let (container, feedback) = loaded_container(&transport);
        container.load().await.unwrap();

        let err = container.remove(&2).await.unwrap_err();

        assert!(matches!(err, ContainerError::Api(ApiError::HttpError { status_code: 409, .. })));
        assert_eq!(ids(&container), vec![1, 2]);
        let messages = feedback.visible();
        assert_eq!(messages[0].kind, FeedbackKind::Error);
        assert_eq!(messages[0].body.as_deref(), Some("Booking has payments"));
    }

    #[tokio::test]
    async fn test_status_change_replaces_single_booking() {
        let transport = ScriptedTransport::new();
        transport.reply(Method::Put, "/bookings/2", 200, booking_json(2, "confirmed"));
        let (container, _) = loaded_container(&transport);
        container.load().await.unwrap();

        container
            .mutate(&BookingAction::SetStatus {
                id: 2,
                status: BookingStatus::Confirmed,
            })
            .await
            .unwrap();

        let bookings = container.data().unwrap();
        assert_eq!(bookings.len(), 2);
        assert_eq!(bookings[1].status, BookingStatus::Confirmed);
        assert_eq!(
            transport.requests().last().unwrap().body,
            Some(json!({"status": "confirmed"}))
        );
    }

    #[tokio::test]
    async fn test_cancellation_request() {
        let transport = ScriptedTransport::new();
        transport.reply(Method::Post, "/bookings/1/cancel", 200, booking_json(1, "cancelled"));
        let (container, _) = loaded_container(&transport);
        container.load().await.unwrap();

        container
            .mutate(&BookingAction::RequestCancellation {
                id: 1,
                reason: Some("Flight moved".to_string()),
            })
            .await
            .unwrap();

        let bookings = container.data().unwrap();
        let cancelled = filter_bookings(&bookings, Some(BookingStatus::Cancelled), None)
            .into_iter()
            .map(|b| b.id)
            .collect::<Vec<_>>();
        assert_eq!(cancelled, vec![1]);
    }

    #[tokio::test]
    async fn test_cancelled_booking_cannot_change() {
        let transport = ScriptedTransport::new();
        transport.reply(
            Method::Get,
            "/bookings",
            200,
            json!([booking_json(3, "cancelled")]),
        );
        let container = EntityContainer::new(
            BookingsResource,
            client_with(transport.clone()),
            FeedbackChannel::default(),
        );
        container.load().await.unwrap();

        let err = container
            .mutate(&BookingAction::SetStatus {
                id: 3,
                status: BookingStatus::Confirmed,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ContainerError::Validation(_)));
        assert_eq!(transport.count(Method::Put, "/bookings/3"), 0);
    }

    #[test]
    fn test_filter_by_type_and_status() {
        let bookings: Vec<Booking> = vec![
            serde_json::from_value(booking_json(1, "confirmed")).unwrap(),
            serde_json::from_value(booking_json(2, "confirmed")).unwrap(),
            serde_json::from_value(booking_json(3, "pending")).unwrap(),
        ];

        assert_eq!(filter_bookings(&bookings, None, None).len(), 3);
        assert_eq!(
            filter_bookings(&bookings, Some(BookingStatus::Confirmed), Some(BookingType::Hotel))
                .iter()
                .map(|b| b.id)
                .collect::<Vec<_>>(),
            vec![1]
        );
    }
}
