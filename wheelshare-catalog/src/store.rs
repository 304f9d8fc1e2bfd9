use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::listing::{CatalogError, CatalogResult, Listing};

/// Listing data access. The booking coordinator only ever reads through it.
#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn create_listing(&self, listing: &Listing) -> CatalogResult<()>;

    async fn get_listing(&self, id: Uuid) -> CatalogResult<Option<Listing>>;

    /// Newest first
    async fn listings_by_owner(&self, owner_id: &str) -> CatalogResult<Vec<Listing>>;

    /// Listings whose city contains `query`, newest first. `None` lists everything.
    async fn search_by_city(&self, query: Option<&str>) -> CatalogResult<Vec<Listing>>;
}

/// Process-local listing store
#[derive(Default)]
pub struct InMemoryListingStore {
    listings: RwLock<HashMap<Uuid, Listing>>,
}

impl InMemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut listings: Vec<Listing>) -> Vec<Listing> {
    listings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    listings
}

#[async_trait]
impl ListingRepository for InMemoryListingStore {
    async fn create_listing(&self, listing: &Listing) -> CatalogResult<()> {
        let mut listings = self.listings.write().await;
        if listings.contains_key(&listing.id) {
            return Err(CatalogError::Duplicate(listing.id));
        }
        listings.insert(listing.id, listing.clone());
        tracing::info!("Listing created: {} ({})", listing.id, listing.car_model);
        Ok(())
    }

    async fn get_listing(&self, id: Uuid) -> CatalogResult<Option<Listing>> {
        Ok(self.listings.read().await.get(&id).cloned())
    }

    async fn listings_by_owner(&self, owner_id: &str) -> CatalogResult<Vec<Listing>> {
        let listings = self.listings.read().await;
        Ok(newest_first(
            listings
                .values()
                .filter(|listing| listing.owner_id == owner_id)
                .cloned()
                .collect(),
        ))
    }

    async fn search_by_city(&self, query: Option<&str>) -> CatalogResult<Vec<Listing>> {
        let listings = self.listings.read().await;
        let query = query.unwrap_or_default();
        Ok(newest_first(
            listings
                .values()
                .filter(|listing| listing.matches_city(query))
                .cloned()
                .collect(),
        ))
    }
}
