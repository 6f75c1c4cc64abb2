// Admin analytics dashboard, read-only

use crate::api::{ApiClient, ApiError};
use crate::container::Resource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnalyticsRange {
    Week,
    #[default]
    Month,
    Quarter,
    Year,
}

impl AnalyticsRange {
    pub fn as_query(&self) -> &'static str {
        match self {
            AnalyticsRange::Week => "7d",
            AnalyticsRange::Month => "30d",
            AnalyticsRange::Quarter => "90d",
            AnalyticsRange::Year => "1y",
        }
    }
}

impl fmt::Display for AnalyticsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

impl FromStr for AnalyticsRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(AnalyticsRange::Week),
            "30d" => Ok(AnalyticsRange::Month),
            "90d" => Ok(AnalyticsRange::Quarter),
            "1y" => Ok(AnalyticsRange::Year),
            other => Err(format!("unknown analytics range: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeBreakdown {
    pub hotel: u64,
    pub car: u64,
    pub bundle: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyPoint {
    pub date: String,
    pub bookings: u64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dashboard {
    pub total_bookings: u64,
    pub total_revenue: f64,
    pub currency: String,
    pub new_users: u64,
    pub conversion_rate: f64,
    pub by_type: TypeBreakdown,
    pub daily: Vec<DailyPoint>,
}

impl Dashboard {
    pub fn average_booking_value(&self) -> Option<f64> {
        (self.total_bookings > 0).then(|| self.total_revenue / self.total_bookings as f64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DashboardResource {
    pub range: AnalyticsRange,
}

impl DashboardResource {
    pub fn new(range: AnalyticsRange) -> Self {
        Self { range }
    }

    pub fn path(&self) -> String {
        format!("/analytics/dashboard?range={}", self.range)
    }
}

#[async_trait]
impl Resource for DashboardResource {
    type State = Dashboard;

    fn label(&self) -> &str {
        "Analytics"
    }

    async fn fetch(&self, api: &ApiClient) -> Result<Dashboard, ApiError> {
        api.get(&self.path()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_transport::{client_with, ScriptedTransport};
    use crate::api::Method;
    use crate::container::EntityContainer;
    use crate::feedback::FeedbackChannel;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(AnalyticsRange::Week, "/analytics/dashboard?range=7d")]
    #[test_case(AnalyticsRange::Month, "/analytics/dashboard?range=30d")]
    #[test_case(AnalyticsRange::Year, "/analytics/dashboard?range=1y")]
    fn test_query_path(range: AnalyticsRange, expected: &str) {
        assert_eq!(DashboardResource::new(range).path(), expected);
        assert_eq!(range.to_string().parse::<AnalyticsRange>(), Ok(range));
    }

    #[test]
    fn test_unknown_range_rejected() {
        assert!("2w".parse::<AnalyticsRange>().is_err());
    }

    #[tokio::test]
    async fn test_dashboard_load() {
        let transport = ScriptedTransport::new();
        transport.reply(
            Method::Get,
            "/analytics/dashboard?range=90d",
            200,
            json!({
                "total_bookings": 40,
                "total_revenue": 5000000.0,
                "currency": "NGN",
                "by_type": {"hotel": 25, "car": 15}
            }),
        );
        let container = EntityContainer::new(
            DashboardResource::new(AnalyticsRange::Quarter),
            client_with(transport),
            FeedbackChannel::default(),
        );

        let dashboard = container.load().await.unwrap();
        assert_eq!(dashboard.by_type.bundle, 0);
        assert_eq!(dashboard.average_booking_value(), Some(125000.0));
        assert!(Dashboard::default().average_booking_value().is_none());
    }
}
