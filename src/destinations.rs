// Destinations shown on the landing page; admins can remove them

use crate::api::{ApiClient, ApiError};
use crate::container::{Removable, Resource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub id: u64,
    pub name: String,
    pub country: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub featured: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DestinationsResource;

#[async_trait]
impl Resource for DestinationsResource {
    type State = Vec<Destination>;

    fn label(&self) -> &str {
        "Destinations"
    }

    async fn fetch(&self, api: &ApiClient) -> Result<Vec<Destination>, ApiError> {
        api.get("/destinations").await
    }
}

#[async_trait]
impl Removable for DestinationsResource {
    type Id = u64;

    async fn delete(&self, api: &ApiClient, id: &u64) -> Result<(), ApiError> {
        api.delete(&format!("/destinations/{}", id)).await
    }

    fn without(&self, state: &Vec<Destination>, id: &u64) -> Vec<Destination> {
        state.iter().filter(|d| d.id != *id).cloned().collect()
    }
}

// Featured first, then alphabetical
pub fn featured_first(destinations: &[Destination]) -> Vec<&Destination> {
    let mut sorted: Vec<&Destination> = destinations.iter().collect();
    sorted.sort_by(|a, b| b.featured.cmp(&a.featured).then_with(|| a.name.cmp(&b.name)));
    sorted
}
