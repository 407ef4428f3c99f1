// Facade wiring carriers, cache, orchestrators and collaborators together

use crate::adapter::ProviderAdapter;
use crate::backend::build_adapter;
use crate::booking::BookingOrchestrator;
use crate::cache::{CacheStatsReport, CorrelationCache};
use crate::config::AggregatorConfig;
use crate::error::{BookingError, ConfigError};
use crate::model::{
    BookingReference, BookingStatus, BookingStatusSnapshot, PassengerDetails, PaymentStatus,
    SearchCriteria, SearchResponse,
};
use crate::notify::{BookingEvent, EventKind, EventPublisher};
use crate::payment::{ChargeResult, PaymentDispatcher, PaymentRequest};
use crate::persistence::{BookingRepository, InMemoryBookingRepository};
use crate::registry::{AdapterRegistry, CarrierStatus};
use crate::search::SearchOrchestrator;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct FlightAggregator {
    config: AggregatorConfig,
    registry: Arc<AdapterRegistry>,
    cache: Arc<CorrelationCache>,
    repository: Arc<dyn BookingRepository>,
    publisher: Arc<EventPublisher>,
    payments: Arc<PaymentDispatcher>,
    search: SearchOrchestrator,
    booking: BookingOrchestrator,
}

impl FlightAggregator {
    /// Wires every enabled carrier from the config with in-memory collaborators.
    pub fn from_config(config: AggregatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = Arc::new(AdapterRegistry::new());
        for carrier in config.carriers.iter().filter(|carrier| carrier.enabled) {
            registry.register(build_adapter(carrier, config.provider_timeout())?);
        }
        if registry.is_empty() {
            warn!("No carriers enabled, searches will return no offers");
        }

        let cache = Arc::new(CorrelationCache::new(
            config.offer_ttl(),
            config.cache.max_entries,
        ));
        let payments = Arc::new(PaymentDispatcher::simulated(config.payment_approval_rate));

        Ok(Self::new(
            config,
            registry,
            cache,
            Arc::new(InMemoryBookingRepository::new()),
            Arc::new(EventPublisher::with_channels()),
            payments,
        ))
    }

    pub fn new(
        config: AggregatorConfig,
        registry: Arc<AdapterRegistry>,
        cache: Arc<CorrelationCache>,
        repository: Arc<dyn BookingRepository>,
        publisher: Arc<EventPublisher>,
        payments: Arc<PaymentDispatcher>,
    ) -> Self {
        let search = SearchOrchestrator::new(
            Arc::clone(&registry),
            cache.clone(),
            config.provider_timeout(),
        );
        let booking = BookingOrchestrator::new(
            Arc::clone(&registry),
            cache.clone(),
            Arc::clone(&repository),
            Arc::clone(&publisher),
            &config,
        );

        info!(
            carriers = registry.len(),
            offer_ttl_seconds = config.offer_ttl_seconds,
            provider_timeout_ms = config.provider_timeout_ms,
            "Flight aggregator ready"
        );

        Self {
            config,
            registry,
            cache,
            repository,
            publisher,
            payments,
            search,
            booking,
        }
    }

    // Needs a running tokio runtime
    pub fn start_cache_janitor(&self) -> JoinHandle<()> {
        self.cache.spawn_janitor(self.config.cleanup_interval())
    }

    pub async fn search(&self, criteria: &SearchCriteria) -> SearchResponse {
        self.search.search(criteria).await
    }

    pub async fn book(
        &self,
        offer_id: &str,
        passengers: &PassengerDetails,
    ) -> Result<BookingReference, BookingError> {
        self.booking.book(offer_id, passengers).await
    }

    pub async fn cancel(&self, carrier_code: &str, confirmation_code: &str) -> bool {
        self.booking.cancel(carrier_code, confirmation_code).await
    }

    pub async fn booking_status(
        &self,
        carrier_code: &str,
        confirmation_code: &str,
    ) -> Option<BookingStatusSnapshot> {
        self.booking.booking_status(carrier_code, confirmation_code).await
    }

    pub async fn find_booking(&self, booking_id: &str) -> Result<BookingReference, BookingError> {
        self.repository
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::BookingNotFound(booking_id.to_string()))
    }

    /// Cancels with the carrier first. The record only changes once the carrier agreed.
    pub async fn cancel_booking(&self, booking_id: &str) -> Result<bool, BookingError> {
        let mut booking = self.find_booking(booking_id).await?;

        if !self
            .booking
            .cancel(&booking.carrier_code, &booking.confirmation_code)
            .await
        {
            warn!(booking_id, pnr = %booking.confirmation_code, "Carrier did not cancel, record unchanged");
            return Ok(false);
        }

        self.repository
            .update_status(booking_id, BookingStatus::Cancelled)
            .await
            .map_err(|source| BookingError::Persistence {
                pnr: booking.confirmation_code.clone(),
                source,
            })?;
        booking.status = BookingStatus::Cancelled;

        info!(booking_id, pnr = %booking.confirmation_code, "Booking cancelled");
        self.publisher
            .publish(BookingEvent::new(EventKind::BookingCancelled, booking_id, booking));
        Ok(true)
    }

    pub async fn confirm_payment(
        &self,
        booking_id: &str,
        request: &PaymentRequest,
    ) -> Result<ChargeResult, BookingError> {
        let mut booking = self.find_booking(booking_id).await?;
        info!(
            booking_id,
            method = ?request.method,
            amount = %request.amount,
            "Processing payment"
        );

        let result = self.payments.dispatch(request);
        let status = if result.success {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        };

        self.repository
            .update_payment_status(booking_id, status)
            .await
            .map_err(|source| BookingError::Persistence {
                pnr: booking.confirmation_code.clone(),
                source,
            })?;
        booking.payment_status = status;

        if result.success {
            self.publisher
                .publish(BookingEvent::new(EventKind::PaymentConfirmed, booking_id, booking));
        }
        Ok(result)
    }

    pub fn register_carrier(&self, adapter: Arc<dyn ProviderAdapter>) {
        self.registry.register(adapter);
    }

    pub fn carrier_statuses(&self) -> Vec<CarrierStatus> {
        self.registry.carrier_statuses()
    }

    pub fn cache_stats(&self) -> CacheStatsReport {
        self.cache.stats()
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    pub fn publisher(&self) -> &Arc<EventPublisher> {
        &self.publisher
    }

    pub fn payments(&self) -> &Arc<PaymentDispatcher> {
        &self.payments
    }
}
