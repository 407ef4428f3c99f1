// Provider adapter contract and the generic carrier wrapper around a concrete backend

use crate::error::{BackendError, ProviderError};
use crate::model::{
    BookingOutcome, BookingStatusSnapshot, Money, Offer, OfferStatus, PassengerDetails,
    SearchCriteria,
};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Uniform contract every integrated carrier implements.
///
/// None of these calls may hang the caller: implementations bound every backend
/// call by a timeout and report failures as values (`Err`, a failed
/// [`BookingOutcome`], `None` or `false`) rather than panicking.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + 'static {
    fn carrier_code(&self) -> &str;

    fn carrier_name(&self) -> &str;

    async fn search_offers(&self, criteria: &SearchCriteria) -> Result<Vec<Offer>, ProviderError>;

    async fn create_booking(
        &self,
        offer_id: &str,
        offer: &Offer,
        passengers: &PassengerDetails,
    ) -> BookingOutcome;

    async fn fetch_booking_status(&self, confirmation_code: &str) -> Option<BookingStatusSnapshot>;

    async fn cancel_booking(&self, confirmation_code: &str) -> bool;

    /// Cheap, side-effect free liveness signal.
    fn is_healthy(&self) -> bool;
}

// A flight as the backend describes it. The adapter turns it into an Offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightQuote {
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate,
    pub departure_time: NaiveTime,
    pub arrival_time: NaiveTime,
    pub duration_minutes: u32,
    pub stops: u8,
    pub price: Money,
    pub available_seats: u32,
    pub aircraft_type: String,
    pub status: OfferStatus,
}

impl FlightQuote {
    pub fn into_offer(self, offer_id: String, carrier_code: &str, carrier_name: &str) -> Offer {
        Offer {
            offer_id,
            carrier_code: carrier_code.to_string(),
            carrier_name: carrier_name.to_string(),
            flight_number: self.flight_number,
            origin: self.origin,
            destination: self.destination,
            date: self.date,
            departure_time: self.departure_time,
            arrival_time: self.arrival_time,
            duration_minutes: self.duration_minutes,
            stops: self.stops,
            price: self.price,
            available_seats: self.available_seats,
            aircraft_type: self.aircraft_type,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierConfirmation {
    pub pnr: String,
    pub booking_id: String,
}

/// The carrier-specific part of an adapter: the raw backend calls.
#[async_trait]
pub trait AirlineBackend: Send + Sync + 'static {
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<FlightQuote>, BackendError>;

    async fn book(
        &self,
        offer: &Offer,
        passengers: &PassengerDetails,
    ) -> Result<CarrierConfirmation, BackendError>;

    async fn booking_status(&self, pnr: &str) -> Result<Option<BookingStatusSnapshot>, BackendError>;

    async fn cancel(&self, pnr: &str) -> Result<bool, BackendError>;

    fn is_healthy(&self) -> bool;
}

// Adapters for different carriers differ only in identity and backend
pub struct CarrierAdapter<B> {
    code: String,
    name: String,
    timeout: Duration,
    backend: B,
}

impl<B: AirlineBackend> CarrierAdapter<B> {
    pub fn new(code: &str, name: &str, timeout: Duration, backend: B) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            timeout,
            backend,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(BackendError::Rejected(message))) => Err(ProviderError::Failure {
                carrier: self.code.clone(),
                message,
            }),
            Ok(Err(BackendError::Transport(message))) => Err(ProviderError::Unreachable {
                carrier: self.code.clone(),
                message,
            }),
            Err(_) => Err(ProviderError::Timeout {
                carrier: self.code.clone(),
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl<B: AirlineBackend> ProviderAdapter for CarrierAdapter<B> {
    fn carrier_code(&self) -> &str {
        &self.code
    }

    fn carrier_name(&self) -> &str {
        &self.name
    }

    async fn search_offers(&self, criteria: &SearchCriteria) -> Result<Vec<Offer>, ProviderError> {
        info!(
            carrier = %self.code,
            origin = %criteria.origin,
            destination = %criteria.destination,
            "Searching flights"
        );

        let quotes = self.bounded(self.backend.search(criteria)).await?;
        let offers: Vec<Offer> = quotes
            .into_iter()
            .map(|quote| quote.into_offer(Uuid::new_v4().to_string(), &self.code, &self.name))
            .collect();

        debug!(carrier = %self.code, count = offers.len(), "Carrier returned offers");
        Ok(offers)
    }

    async fn create_booking(
        &self,
        offer_id: &str,
        offer: &Offer,
        passengers: &PassengerDetails,
    ) -> BookingOutcome {
        info!(
            carrier = %self.code,
            offer_id,
            flight = %offer.flight_number,
            "Creating carrier booking"
        );

        match self.bounded(self.backend.book(offer, passengers)).await {
            Ok(confirmation) => BookingOutcome::confirmed(
                confirmation.pnr,
                confirmation.booking_id,
                format!("Booking confirmed with {}", self.name),
            ),
            Err(err) => {
                warn!(carrier = %self.code, offer_id, error = %err, "Carrier booking failed");
                BookingOutcome::failed(format!("Booking failed: {}", err))
            }
        }
    }

    async fn fetch_booking_status(&self, confirmation_code: &str) -> Option<BookingStatusSnapshot> {
        match self.bounded(self.backend.booking_status(confirmation_code)).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(carrier = %self.code, pnr = confirmation_code, error = %err, "Status fetch failed");
                None
            }
        }
    }

    async fn cancel_booking(&self, confirmation_code: &str) -> bool {
        info!(carrier = %self.code, pnr = confirmation_code, "Cancelling carrier booking");

        match self.bounded(self.backend.cancel(confirmation_code)).await {
            Ok(cancelled) => cancelled,
            Err(err) => {
                warn!(carrier = %self.code, pnr = confirmation_code, error = %err, "Cancellation failed");
                false
            }
        }
    }

    fn is_healthy(&self) -> bool {
        self.backend.is_healthy()
    }
}
