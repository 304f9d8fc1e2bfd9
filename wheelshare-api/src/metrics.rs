use prometheus::{opts, Encoder, IntCounterVec, Registry, TextEncoder};
use wheelshare_booking::{BookingError, BookingResult};

use crate::error::AppError;

/// Booking outcome counters, exposed at `/metrics`
pub struct Metrics {
    registry: Registry,
    booking_requests: IntCounterVec,
    cancellations: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let booking_requests = IntCounterVec::new(
            opts!("wheelshare_booking_requests_total", "Booking requests by outcome"),
            &["outcome"],
        )?;
        let cancellations = IntCounterVec::new(
            opts!("wheelshare_cancellations_total", "Cancellation requests by initiator and outcome"),
            &["initiator", "outcome"],
        )?;

        registry.register(Box::new(booking_requests.clone()))?;
        registry.register(Box::new(cancellations.clone()))?;

        Ok(Self {
            registry,
            booking_requests,
            cancellations,
        })
    }

    pub fn record_booking<T>(&self, result: &BookingResult<T>) {
        self.booking_requests.with_label_values(&[outcome(result)]).inc();
    }

    pub fn record_cancellation<T>(&self, initiator: &str, result: &BookingResult<T>) {
        self.cancellations.with_label_values(&[initiator, outcome(result)]).inc();
    }

    pub fn render(&self) -> Result<String, AppError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| AppError::InternalServerError(format!("metrics encoding failed: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| AppError::InternalServerError(e.to_string()))
    }
}

fn outcome<T>(result: &BookingResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(BookingError::ListingFull(_)) => "listing_full",
        Err(BookingError::AlreadyBooked { .. }) => "already_booked",
        Err(e) => match e.kind() {
            wheelshare_booking::ErrorKind::NotFound => "not_found",
            wheelshare_booking::ErrorKind::Conflict => "conflict",
            wheelshare_booking::ErrorKind::Unauthorized => "unauthorized",
            wheelshare_booking::ErrorKind::Exhausted => "exhausted",
            wheelshare_booking::ErrorKind::Transient => "transient",
            wheelshare_booking::ErrorKind::Invariant => "invariant",
        },
    }
}
