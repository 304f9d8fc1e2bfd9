use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use wheelshare_booking::ledger::check_change_shape;
use wheelshare_booking::{
    Booking, BookingChange, BookingLedger, BookingStatus, CancelOutcome, Cancellation, CommitOutcome,
    ConfirmationCode, LedgerError, LedgerResult,
};
use wheelshare_core::ContactSnapshot;
use wheelshare_shared::{CancellationCause, Masked};

const BOOKING_COLUMNS: &str = "id, listing_id, renter_id, renter_email, renter_name, confirmation_code, \
     status, cancel_cause, cancelled_at, created_at, updated_at";

const CODE_CONSTRAINT: &str = "bookings_confirmation_code_key";
const ONE_ACTIVE_CONSTRAINT: &str = "bookings_one_active_per_renter";
const PRIMARY_KEY_CONSTRAINT: &str = "bookings_pkey";

/// PostgreSQL booking ledger.
///
/// A commit runs in one transaction holding the listing row lock, so commits
/// on the same listing serialise and others proceed in parallel. The partial
/// unique index on active renter bookings backs up the renter guard.
pub struct PgBookingLedger {
    pool: PgPool,
}

impl PgBookingLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_many(&self, sql: &str, key: BookingKey<'_>) -> LedgerResult<Vec<Booking>> {
        let query = sqlx::query_as::<_, BookingRow>(sql);
        let query = match key {
            BookingKey::Listing(id) => query.bind(id),
            BookingKey::Renter(id) => query.bind(id.to_string()),
        };

        let rows = query.fetch_all(&self.pool).await.map_err(storage_error)?;
        rows.into_iter().map(Booking::try_from).collect()
    }
}

enum BookingKey<'a> {
    Listing(Uuid),
    Renter(&'a str),
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    listing_id: Uuid,
    renter_id: String,
    renter_email: String,
    renter_name: String,
    confirmation_code: String,
    status: String,
    cancel_cause: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = LedgerError;

    fn try_from(row: BookingRow) -> LedgerResult<Self> {
        let status = BookingStatus::parse(&row.status)
            .ok_or_else(|| LedgerError::Corrupted(format!("booking {} has status {}", row.id, row.status)))?;
        let confirmation_code = ConfirmationCode::parse(&row.confirmation_code).ok_or_else(|| {
            LedgerError::Corrupted(format!("booking {} has code {:?}", row.id, row.confirmation_code))
        })?;

        let cancellation = match (status, row.cancel_cause, row.cancelled_at) {
            (BookingStatus::Active, None, None) => None,
            (BookingStatus::Cancelled, Some(cause), Some(cancelled_at)) => {
                let cause = CancellationCause::parse(&cause)
                    .ok_or_else(|| LedgerError::Corrupted(format!("booking {} has cause {}", row.id, cause)))?;
                Some(Cancellation { cause, cancelled_at })
            }
            _ => {
                return Err(LedgerError::Corrupted(format!(
                    "booking {} has inconsistent cancellation columns",
                    row.id
                )))
            }
        };

        Ok(Booking {
            id: row.id,
            listing_id: row.listing_id,
            renter_id: row.renter_id,
            renter_contact: ContactSnapshot {
                email: Masked(row.renter_email),
                display_name: row.renter_name,
            },
            confirmation_code,
            status,
            cancellation,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn storage_error(e: sqlx::Error) -> LedgerError {
    match e {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            LedgerError::Corrupted(e.to_string())
        }
        other => LedgerError::Unavailable(other.to_string()),
    }
}

/// Maps a failed booking insert onto the rule it broke.
fn insert_error(e: sqlx::Error, booking: &Booking) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some(CODE_CONSTRAINT) => LedgerError::DuplicateConfirmationCode(booking.confirmation_code.to_string()),
                Some(ONE_ACTIVE_CONSTRAINT) => LedgerError::StaleRenterState {
                    renter_id: booking.renter_id.clone(),
                },
                Some(PRIMARY_KEY_CONSTRAINT) => LedgerError::AlreadyCommitted(booking.id),
                other => LedgerError::Corrupted(format!("unexpected unique violation on {:?}", other)),
            };
        }
        if db_err.is_foreign_key_violation() {
            return LedgerError::InvalidChange(format!("listing {} does not exist", booking.listing_id));
        }
    }
    storage_error(e)
}

async fn insert_row(tx: &mut Transaction<'_, Postgres>, booking: &Booking) -> LedgerResult<()> {
    let (cause, cancelled_at) = match &booking.cancellation {
        Some(c) => (Some(c.cause.as_str()), Some(c.cancelled_at)),
        None => (None, None),
    };

    sqlx::query(
        r#"
        INSERT INTO bookings (id, listing_id, renter_id, renter_email, renter_name, confirmation_code,
                              status, cancel_cause, cancelled_at, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(booking.id)
    .bind(booking.listing_id)
    .bind(&booking.renter_id)
    .bind(booking.renter_contact.email.expose())
    .bind(&booking.renter_contact.display_name)
    .bind(booking.confirmation_code.as_str())
    .bind(booking.status.as_str())
    .bind(cause)
    .bind(cancelled_at)
    .bind(booking.created_at)
    .bind(booking.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| insert_error(e, booking))?;

    Ok(())
}

/// Cancels `id` if it is still active. `None` when it is not.
async fn retire_row(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    cause: CancellationCause,
) -> LedgerResult<Option<Booking>> {
    let row = sqlx::query_as::<_, BookingRow>(&format!(
        "UPDATE bookings \
         SET status = 'CANCELLED', cancel_cause = $2, cancelled_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status = 'ACTIVE' \
         RETURNING {}",
        BOOKING_COLUMNS
    ))
    .bind(id)
    .bind(cause.as_str())
    .fetch_optional(&mut **tx)
    .await
    .map_err(storage_error)?;

    row.map(Booking::try_from).transpose()
}

#[async_trait]
impl BookingLedger for PgBookingLedger {
    async fn get(&self, id: Uuid) -> LedgerResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn active_booking_for_renter(&self, renter_id: &str) -> LedgerResult<Option<Booking>> {
        let mut active = self
            .fetch_many(
                &format!(
                    "SELECT {} FROM bookings WHERE renter_id = $1 AND status = 'ACTIVE'",
                    BOOKING_COLUMNS
                ),
                BookingKey::Renter(renter_id),
            )
            .await?;

        if active.len() > 1 {
            return Err(LedgerError::Corrupted(format!(
                "renter {} has {} active bookings",
                renter_id,
                active.len()
            )));
        }
        Ok(active.pop())
    }

    async fn active_bookings_for_listing(&self, listing_id: Uuid) -> LedgerResult<Vec<Booking>> {
        self.fetch_many(
            &format!(
                "SELECT {} FROM bookings WHERE listing_id = $1 AND status = 'ACTIVE' ORDER BY created_at, id",
                BOOKING_COLUMNS
            ),
            BookingKey::Listing(listing_id),
        )
        .await
    }

    async fn history_for_listing(&self, listing_id: Uuid) -> LedgerResult<Vec<Booking>> {
        self.fetch_many(
            &format!(
                "SELECT {} FROM bookings WHERE listing_id = $1 ORDER BY created_at, id",
                BOOKING_COLUMNS
            ),
            BookingKey::Listing(listing_id),
        )
        .await
    }

    async fn history_for_renter(&self, renter_id: &str) -> LedgerResult<Vec<Booking>> {
        self.fetch_many(
            &format!(
                "SELECT {} FROM bookings WHERE renter_id = $1 ORDER BY created_at, id",
                BOOKING_COLUMNS
            ),
            BookingKey::Renter(renter_id),
        )
        .await
    }

    async fn insert(&self, booking: Booking) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        insert_row(&mut tx, &booking).await?;
        tx.commit().await.map_err(storage_error)
    }

    async fn cancel(&self, id: Uuid, cause: CancellationCause) -> LedgerResult<CancelOutcome> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        if let Some(booking) = retire_row(&mut tx, id, cause).await? {
            tx.commit().await.map_err(storage_error)?;
            return Ok(CancelOutcome::Cancelled(booking));
        }
        tx.rollback().await.map_err(storage_error)?;

        match self.get(id).await? {
            Some(booking) => Ok(CancelOutcome::AlreadyCancelled(booking)),
            None => Err(LedgerError::NotFound(id)),
        }
    }

    async fn commit(&self, change: BookingChange) -> LedgerResult<CommitOutcome> {
        check_change_shape(&change)?;
        let BookingChange { guard, booking } = change;

        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        // Serialises commits on this listing until the transaction ends.
        let locked: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM listings WHERE id = $1 FOR UPDATE")
            .bind(guard.listing_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error)?;
        if locked.is_none() {
            return Err(LedgerError::InvalidChange(format!("listing {} does not exist", guard.listing_id)));
        }

        let (replayed,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM bookings WHERE id = $1)")
            .bind(booking.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_error)?;
        if replayed {
            return Err(LedgerError::AlreadyCommitted(booking.id));
        }

        let current: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT id, listing_id FROM bookings WHERE renter_id = $1 AND status = 'ACTIVE' FOR UPDATE",
        )
        .bind(&guard.renter_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_error)?;
        if current.len() > 1 {
            return Err(LedgerError::Corrupted(format!(
                "renter {} has {} active bookings",
                guard.renter_id,
                current.len()
            )));
        }
        let current = current.first().copied();
        if current.map(|(id, _)| id) != guard.expected_active {
            return Err(LedgerError::StaleRenterState {
                renter_id: guard.renter_id,
            });
        }

        let (occupied,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE listing_id = $1 AND status = 'ACTIVE'")
                .bind(guard.listing_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(storage_error)?;
        let freed_here = matches!(current, Some((_, listing)) if listing == guard.listing_id);
        let occupied = occupied.saturating_sub(i64::from(freed_here));
        if occupied >= i64::from(guard.capacity) {
            return Err(LedgerError::CapacityExceeded {
                listing_id: guard.listing_id,
                capacity: guard.capacity,
            });
        }

        let superseded = match guard.expected_active {
            Some(previous) => match retire_row(&mut tx, previous, CancellationCause::Superseded).await? {
                Some(b) => Some(b),
                None => {
                    return Err(LedgerError::StaleRenterState {
                        renter_id: guard.renter_id,
                    })
                }
            },
            None => None,
        };

        insert_row(&mut tx, &booking).await?;
        tx.commit().await.map_err(storage_error)?;

        Ok(CommitOutcome { booking, superseded })
    }
}
