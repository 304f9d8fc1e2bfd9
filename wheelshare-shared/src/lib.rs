pub mod models;
pub mod pii;

pub use models::events::{BookingEvent, CancellationCause};
pub use pii::Masked;
