// Saved hotels and cars. The list is refetched after a change rather than patched locally,
// except when an add succeeded but the refetch did not.

use crate::api::{ApiClient, ApiError};
use crate::container::{
    ContainerError, EntityContainer, Mutable, Removable, Resource, ValidationError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type FavoriteId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Hotel,
    Car,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: FavoriteId,
    pub item_type: ItemType,
    pub item_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewFavorite {
    pub item_type: ItemType,
    pub item_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct FavoritesResource;

#[async_trait]
impl Resource for FavoritesResource {
    type State = Vec<Favorite>;

    fn label(&self) -> &str {
        "Favorites"
    }

    async fn fetch(&self, api: &ApiClient) -> Result<Vec<Favorite>, ApiError> {
        api.get("/favorites").await
    }
}

#[async_trait]
impl Mutable for FavoritesResource {
    type Draft = NewFavorite;

    fn validate(
        &self,
        current: &Vec<Favorite>,
        draft: &NewFavorite,
    ) -> Result<(), ValidationError> {
        if draft.item_id.trim().is_empty() {
            return Err(ValidationError::required("item_id"));
        }
        if find(current, draft.item_type, &draft.item_id).is_some() {
            return Err(ValidationError::new("item_id", "is already a favorite"));
        }
        Ok(())
    }

    async fn submit(
        &self,
        api: &ApiClient,
        current: &Vec<Favorite>,
        draft: &NewFavorite,
    ) -> Result<Vec<Favorite>, ApiError> {
        let created: Favorite = api.post("/favorites", draft).await?;
        match self.fetch(api).await {
            Ok(fresh) => Ok(fresh),
            Err(e) => {
                // the add is already stored server-side; reporting failure would invite a duplicate
                tracing::warn!(error = %e, id = created.id, "refetch after add failed");
                let mut list = current.clone();
                list.push(created);
                Ok(list)
            }
        }
    }
}

#[async_trait]
impl Removable for FavoritesResource {
    type Id = FavoriteId;

    async fn delete(&self, api: &ApiClient, id: &FavoriteId) -> Result<(), ApiError> {
        api.delete(&format!("/favorites/{}", id)).await
    }

    fn without(&self, state: &Vec<Favorite>, id: &FavoriteId) -> Vec<Favorite> {
        state.iter().filter(|f| f.id != *id).cloned().collect()
    }

    fn refetch_after_remove(&self) -> bool {
        true
    }
}

pub fn find<'a>(
    favorites: &'a [Favorite],
    item_type: ItemType,
    item_id: &str,
) -> Option<&'a Favorite> {
    favorites
        .iter()
        .find(|f| f.item_type == item_type && f.item_id == item_id)
}

impl EntityContainer<FavoritesResource> {
    pub fn is_favorite(&self, item_type: ItemType, item_id: &str) -> bool {
        self.data()
            .map(|favorites| find(&favorites, item_type, item_id).is_some())
            .unwrap_or(false)
    }

    // Adds or removes; returns whether the item is a favorite afterwards
    pub async fn toggle(&self, item: NewFavorite) -> Result<bool, ContainerError> {
        let existing = self
            .data()
            .and_then(|favorites| find(&favorites, item.item_type, &item.item_id).map(|f| f.id));

        match existing {
            Some(id) => {
                self.remove(&id).await?;
                Ok(false)
            }
            None => {
                self.mutate(&item).await?;
                Ok(true)
            }
        }
    }
}
