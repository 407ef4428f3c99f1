// Booking: resolve the cached offer, confirm with the carrier, record, notify

use crate::cache::OfferStore;
use crate::config::AggregatorConfig;
use crate::error::BookingError;
use crate::model::{
    BookingOutcome, BookingReference, BookingStatus, BookingStatusSnapshot, Offer, PassengerDetails,
    PaymentStatus,
};
use crate::notify::{BookingEvent, EventKind, EventPublisher};
use crate::persistence::BookingRepository;
use crate::registry::AdapterRegistry;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStage {
    Start,
    OfferResolved,
    ProviderConfirmed,
    RecordBuilt,
    Failed,
}

impl fmt::Display for BookingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BookingStage::Start => "START",
            BookingStage::OfferResolved => "OFFER_RESOLVED",
            BookingStage::ProviderConfirmed => "PROVIDER_CONFIRMED",
            BookingStage::RecordBuilt => "RECORD_BUILT",
            BookingStage::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

// Tracks one attempt through its stages so a failure can say how far it got
struct Attempt<'a> {
    offer_id: &'a str,
    stage: BookingStage,
}

impl<'a> Attempt<'a> {
    fn new(offer_id: &'a str) -> Self {
        Self {
            offer_id,
            stage: BookingStage::Start,
        }
    }

    fn advance(&mut self, next: BookingStage) {
        debug!(offer_id = self.offer_id, from = %self.stage, to = %next, "Booking stage");
        self.stage = next;
    }

    fn fail(&mut self, err: BookingError) -> BookingError {
        error!(offer_id = self.offer_id, stage = %self.stage, error = %err, "Booking failed");
        self.stage = BookingStage::Failed;
        err
    }
}

pub fn generate_booking_reference(prefix: &str, length: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix.to_uppercase())
}

pub struct BookingOrchestrator {
    registry: Arc<AdapterRegistry>,
    cache: Arc<dyn OfferStore>,
    repository: Arc<dyn BookingRepository>,
    publisher: Arc<EventPublisher>,
    provider_timeout: Duration,
    reference_prefix: String,
    reference_length: usize,
    invalidate_on_booking: bool,
}

impl BookingOrchestrator {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        cache: Arc<dyn OfferStore>,
        repository: Arc<dyn BookingRepository>,
        publisher: Arc<EventPublisher>,
        config: &AggregatorConfig,
    ) -> Self {
        Self {
            registry,
            cache,
            repository,
            publisher,
            provider_timeout: config.provider_timeout(),
            reference_prefix: config.booking_reference_prefix.clone(),
            reference_length: config.booking_reference_length,
            invalidate_on_booking: config.invalidate_offer_on_booking,
        }
    }

    /// Books a previously searched offer.
    ///
    /// Nothing is recorded unless the carrier confirmed. A cache miss means the
    /// caller must search again; the offer is never rebuilt from elsewhere.
    pub async fn book(
        &self,
        offer_id: &str,
        passengers: &PassengerDetails,
    ) -> Result<BookingReference, BookingError> {
        let mut attempt = Attempt::new(offer_id);
        info!(offer_id, passengers = passengers.passengers.len(), "Booking requested");

        let offer = match self.cache.get(offer_id).await {
            Ok(Some(offer)) => offer,
            Ok(None) => {
                return Err(attempt.fail(BookingError::OfferExpiredOrUnknown(offer_id.to_string())))
            }
            Err(err) => return Err(attempt.fail(BookingError::CacheUnavailable(err.to_string()))),
        };
        attempt.advance(BookingStage::OfferResolved);

        let adapter = self
            .registry
            .resolve(&offer.carrier_code)
            .map_err(|err| attempt.fail(err))?;

        let outcome = match tokio::time::timeout(
            self.provider_timeout,
            adapter.create_booking(offer_id, &offer, passengers),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(attempt.fail(BookingError::ProviderTimeout {
                    carrier: offer.carrier_code.clone(),
                    after_ms: self.provider_timeout.as_millis() as u64,
                }))
            }
        };

        let (confirmation_code, provider_booking_id) = match outcome {
            BookingOutcome {
                success: true,
                confirmation_code: Some(code),
                provider_booking_id,
                ..
            } => (code, provider_booking_id.unwrap_or_default()),
            outcome => {
                let message = if outcome.success {
                    "carrier confirmed without a PNR".to_string()
                } else {
                    outcome.message
                };
                return Err(attempt.fail(BookingError::ProviderFailure {
                    carrier: offer.carrier_code.clone(),
                    message,
                }));
            }
        };
        attempt.advance(BookingStage::ProviderConfirmed);
        info!(
            offer_id,
            carrier = %offer.carrier_code,
            pnr = %confirmation_code,
            "Carrier confirmed booking"
        );

        let record = self.build_record(&offer, passengers, confirmation_code, provider_booking_id);
        attempt.advance(BookingStage::RecordBuilt);

        let booking_id = match self.repository.save_booking(record.clone()).await {
            Ok(id) => id,
            Err(source) => {
                // The carrier holds a live booking we have no record of
                error!(
                    carrier = %record.carrier_code,
                    pnr = %record.confirmation_code,
                    reference = %record.booking_reference,
                    error = %source,
                    "Carrier booking not recorded, needs reconciliation"
                );
                return Err(BookingError::Persistence {
                    pnr: record.confirmation_code,
                    source,
                });
            }
        };

        self.publisher.publish(BookingEvent::new(
            EventKind::BookingConfirmed,
            &booking_id,
            record.clone(),
        ));

        if self.invalidate_on_booking {
            match self.cache.invalidate(offer_id).await {
                Ok(_) => debug!(offer_id, "Offer invalidated after booking"),
                Err(err) => warn!(offer_id, error = %err, "Failed to invalidate booked offer"),
            }
        }

        info!(
            booking_id = %booking_id,
            reference = %record.booking_reference,
            pnr = %record.confirmation_code,
            "Booking completed"
        );
        Ok(record)
    }

    fn build_record(
        &self,
        offer: &Offer,
        passengers: &PassengerDetails,
        confirmation_code: String,
        provider_booking_id: String,
    ) -> BookingReference {
        BookingReference {
            booking_reference: generate_booking_reference(&self.reference_prefix, self.reference_length),
            carrier_code: offer.carrier_code.clone(),
            carrier_name: offer.carrier_name.clone(),
            confirmation_code,
            provider_booking_id,
            offer_id: offer.offer_id.clone(),
            flight_number: offer.flight_number.clone(),
            origin: offer.origin.clone(),
            destination: offer.destination.clone(),
            departure_date: offer.date,
            departure_time: offer.departure_time,
            total_price: offer.price.clone(),
            passenger_count: passengers.passengers.len(),
            contact_email: passengers.contact_email.clone(),
            status: BookingStatus::Confirmed,
            payment_status: PaymentStatus::Pending,
            created_at: Utc::now(),
        }
    }

    // An unknown carrier or a hung carrier is a failed cancellation, never an error
    pub async fn cancel(&self, carrier_code: &str, confirmation_code: &str) -> bool {
        let adapter = match self.registry.resolve(carrier_code) {
            Ok(adapter) => adapter,
            Err(err) => {
                warn!(carrier = carrier_code, pnr = confirmation_code, error = %err, "Cannot cancel");
                return false;
            }
        };

        match tokio::time::timeout(self.provider_timeout, adapter.cancel_booking(confirmation_code)).await {
            Ok(cancelled) => {
                info!(carrier = carrier_code, pnr = confirmation_code, cancelled, "Cancellation processed");
                cancelled
            }
            Err(_) => {
                warn!(carrier = carrier_code, pnr = confirmation_code, "Cancellation timed out");
                false
            }
        }
    }

    pub async fn booking_status(
        &self,
        carrier_code: &str,
        confirmation_code: &str,
    ) -> Option<BookingStatusSnapshot> {
        let adapter = self.registry.resolve(carrier_code).ok()?;
        match tokio::time::timeout(
            self.provider_timeout,
            adapter.fetch_booking_status(confirmation_code),
        )
        .await
        {
            Ok(snapshot) => snapshot,
            Err(_) => {
                warn!(carrier = carrier_code, pnr = confirmation_code, "Status fetch timed out");
                None
            }
        }
    }
}
