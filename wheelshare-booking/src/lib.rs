pub mod codes;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod models;
pub mod retry;

pub use codes::{CodeGenerator, RandomCodeGenerator};
pub use coordinator::{BookingCoordinator, CoordinatorPolicy};
pub use error::{BookingError, BookingResult, ErrorKind};
pub use ledger::{
    BookingChange, BookingLedger, CancelOutcome, CommitGuard, CommitOutcome, InMemoryLedger, LedgerError,
    LedgerResult,
};
pub use models::{Booking, BookingStatus, Cancellation, ConfirmationCode};
pub use retry::Backoff;
pub use wheelshare_shared::CancellationCause;
