use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use wheelshare_catalog::{CatalogError, CatalogResult, Listing, ListingRepository};
use wheelshare_core::Coordinate;
use wheelshare_shared::Masked;

const LISTING_COLUMNS: &str = "id, owner_id, owner_email, car_model, license_plate, photo_url, \
     daily_price_cents, capacity, city, address, latitude, longitude, created_at";

pub struct PgListingRepository {
    pool: PgPool,
}

impl PgListingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ListingRow {
    id: Uuid,
    owner_id: String,
    owner_email: String,
    car_model: String,
    license_plate: String,
    photo_url: String,
    daily_price_cents: i64,
    capacity: i32,
    city: String,
    address: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ListingRow> for Listing {
    type Error = CatalogError;

    fn try_from(row: ListingRow) -> CatalogResult<Self> {
        let capacity = u32::try_from(row.capacity)
            .map_err(|_| CatalogError::Validation(format!("listing {} has capacity {}", row.id, row.capacity)))?;

        let coordinate = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinate { latitude, longitude }),
            _ => None,
        };

        Ok(Listing {
            id: row.id,
            owner_id: row.owner_id,
            owner_email: Masked(row.owner_email),
            car_model: row.car_model,
            license_plate: row.license_plate,
            photo_url: row.photo_url,
            daily_price_cents: row.daily_price_cents,
            capacity,
            city: row.city,
            address: row.address,
            coordinate,
            created_at: row.created_at,
        })
    }
}

fn unavailable(context: &str, e: sqlx::Error) -> CatalogError {
    CatalogError::Unavailable(format!("{}: {}", context, e))
}

fn into_listings(rows: Vec<ListingRow>) -> CatalogResult<Vec<Listing>> {
    rows.into_iter().map(Listing::try_from).collect()
}

#[async_trait]
impl ListingRepository for PgListingRepository {
    async fn create_listing(&self, listing: &Listing) -> CatalogResult<()> {
        let capacity = i32::try_from(listing.capacity)
            .map_err(|_| CatalogError::Validation(format!("capacity {} is too large", listing.capacity)))?;

        sqlx::query(
            r#"
            INSERT INTO listings (id, owner_id, owner_email, car_model, license_plate, photo_url,
                                  daily_price_cents, capacity, city, address, latitude, longitude, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(listing.id)
        .bind(&listing.owner_id)
        .bind(listing.owner_email.expose())
        .bind(&listing.car_model)
        .bind(&listing.license_plate)
        .bind(&listing.photo_url)
        .bind(listing.daily_price_cents)
        .bind(capacity)
        .bind(&listing.city)
        .bind(&listing.address)
        .bind(listing.coordinate.map(|c| c.latitude))
        .bind(listing.coordinate.map(|c| c.longitude))
        .bind(listing.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return CatalogError::Duplicate(listing.id);
                }
            }
            unavailable("create listing", e)
        })?;

        tracing::info!("Listing created: {} ({})", listing.id, listing.car_model);
        Ok(())
    }

    async fn get_listing(&self, id: Uuid) -> CatalogResult<Option<Listing>> {
        let row = sqlx::query_as::<_, ListingRow>(&format!("SELECT {} FROM listings WHERE id = $1", LISTING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable("get listing", e))?;

        row.map(Listing::try_from).transpose()
    }

    async fn listings_by_owner(&self, owner_id: &str) -> CatalogResult<Vec<Listing>> {
        let rows = sqlx::query_as::<_, ListingRow>(&format!(
            "SELECT {} FROM listings WHERE owner_id = $1 ORDER BY created_at DESC, id",
            LISTING_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("list owner listings", e))?;

        into_listings(rows)
    }

    async fn search_by_city(&self, query: Option<&str>) -> CatalogResult<Vec<Listing>> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());

        // strpos keeps `%` and `_` in the query literal.
        let rows = sqlx::query_as::<_, ListingRow>(&format!(
            "SELECT {} FROM listings \
             WHERE $1::TEXT IS NULL OR strpos(LOWER(city), LOWER($1)) > 0 \
             ORDER BY created_at DESC, id",
            LISTING_COLUMNS
        ))
        .bind(query)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("search listings", e))?;

        into_listings(rows)
    }
}
