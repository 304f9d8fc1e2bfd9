pub mod listing;
pub mod map;
pub mod store;

pub use listing::{CatalogError, CatalogResult, Listing, NewListing};
pub use map::{build_map_view, MapPin, MapView};
pub use store::{InMemoryListingStore, ListingRepository};
