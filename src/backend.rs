// Concrete carrier backends: an in-process simulation and a generic JSON-over-HTTP client

use crate::adapter::{AirlineBackend, CarrierAdapter, CarrierConfirmation, FlightQuote, ProviderAdapter};
use crate::config::CarrierConfig;
use crate::error::{BackendError, ConfigError};
use crate::model::{BookingStatusSnapshot, Money, Offer, OfferStatus, PassengerDetails, SearchCriteria};
use async_trait::async_trait;
use chrono::NaiveTime;
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

// A departure the simulated carrier operates on every date and route
#[derive(Debug, Clone)]
pub struct ScheduledFlight {
    pub flight_number: String,
    pub departure: NaiveTime,
    pub arrival: NaiveTime,
    pub duration_minutes: u32,
    pub price: Money,
}

impl ScheduledFlight {
    pub fn new(flight_number: &str, departure: (u32, u32), arrival: (u32, u32), fare_inr: i64) -> Self {
        Self {
            flight_number: flight_number.to_string(),
            departure: hm(departure),
            arrival: hm(arrival),
            duration_minutes: 135,
            price: Money::from_major(fare_inr, "INR"),
        }
    }
}

fn hm((hour, minute): (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

// Fixed schedules for the carriers integrated out of the box
pub fn builtin_schedule(carrier_code: &str) -> Vec<ScheduledFlight> {
    match carrier_code {
        "6E" => vec![
            ScheduledFlight::new("6E-123", (8, 30), (10, 45), 4500),
            ScheduledFlight::new("6E-456", (14, 15), (16, 30), 5200),
        ],
        "AI" => vec![
            ScheduledFlight::new("AI-789", (9, 45), (12, 0), 4800),
            ScheduledFlight::new("AI-101", (18, 20), (20, 35), 5500),
        ],
        "SG" => vec![ScheduledFlight::new("SG-234", (11, 10), (13, 25), 4200)],
        "UK" => vec![ScheduledFlight::new("UK-567", (16, 40), (18, 55), 6800)],
        _ => Vec::new(),
    }
}

// PNRs look like "6EK3J9QZ": the carrier code followed by six uppercase alphanumerics
pub fn generate_pnr(carrier_code: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("{}{}", carrier_code, suffix.to_uppercase())
}

/// In-process carrier backend with knobs for latency, outages and rejected bookings.
pub struct SimulatedBackend {
    carrier_code: String,
    schedule: Vec<ScheduledFlight>,
    seats_per_flight: u32,
    delay_ms: AtomicU64,
    healthy: AtomicBool,
    fail_searches: AtomicBool,
    fail_bookings: AtomicBool,
    search_count: AtomicUsize,
    bookings: DashMap<String, BookingStatusSnapshot>,
}

impl SimulatedBackend {
    pub fn new(carrier_code: &str, schedule: Vec<ScheduledFlight>) -> Self {
        Self {
            carrier_code: carrier_code.to_string(),
            schedule,
            seats_per_flight: 50,
            delay_ms: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
            fail_searches: AtomicBool::new(false),
            fail_bookings: AtomicBool::new(false),
            search_count: AtomicUsize::new(0),
            bookings: DashMap::new(),
        }
    }

    pub fn for_carrier(carrier_code: &str) -> Self {
        Self::new(carrier_code, builtin_schedule(carrier_code))
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn fail_searches(&self, fail: bool) {
        self.fail_searches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_bookings(&self, fail: bool) {
        self.fail_bookings.store(fail, Ordering::SeqCst);
    }

    pub fn search_count(&self) -> usize {
        self.search_count.load(Ordering::SeqCst)
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    async fn simulate_latency(&self) -> Result<(), BackendError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(BackendError::Transport(format!(
                "{} backend offline",
                self.carrier_code
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AirlineBackend for SimulatedBackend {
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<FlightQuote>, BackendError> {
        self.search_count.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await?;

        if self.fail_searches.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("search service error".to_string()));
        }

        let quotes: Vec<FlightQuote> = self
            .schedule
            .iter()
            .map(|flight| FlightQuote {
                flight_number: flight.flight_number.clone(),
                origin: criteria.origin.clone(),
                destination: criteria.destination.clone(),
                date: criteria.departure_date,
                departure_time: flight.departure,
                arrival_time: flight.arrival,
                duration_minutes: flight.duration_minutes,
                stops: 0,
                price: flight.price.clone(),
                available_seats: self.seats_per_flight,
                aircraft_type: "A320".to_string(),
                status: OfferStatus::Available,
            })
            .collect();

        debug!(carrier = %self.carrier_code, count = quotes.len(), "Simulated flights generated");
        Ok(quotes)
    }

    async fn book(
        &self,
        offer: &Offer,
        _passengers: &PassengerDetails,
    ) -> Result<CarrierConfirmation, BackendError> {
        self.simulate_latency().await?;

        if self.fail_bookings.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected(format!(
                "no inventory on {}",
                offer.flight_number
            )));
        }

        let pnr = generate_pnr(&self.carrier_code);
        self.bookings.insert(
            pnr.clone(),
            BookingStatusSnapshot {
                confirmation_code: pnr.clone(),
                status: "CONFIRMED".to_string(),
                flight_number: offer.flight_number.clone(),
                origin: offer.origin.clone(),
                destination: offer.destination.clone(),
            },
        );

        Ok(CarrierConfirmation {
            pnr,
            booking_id: Uuid::new_v4().to_string(),
        })
    }

    async fn booking_status(&self, pnr: &str) -> Result<Option<BookingStatusSnapshot>, BackendError> {
        self.simulate_latency().await?;
        Ok(self.bookings.get(pnr).map(|entry| entry.value().clone()))
    }

    async fn cancel(&self, pnr: &str) -> Result<bool, BackendError> {
        self.simulate_latency().await?;
        match self.bookings.get_mut(pnr) {
            Some(mut entry) => {
                entry.status = "CANCELLED".to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpBookingRequest<'a> {
    offer_id: &'a str,
    flight_number: &'a str,
    date: chrono::NaiveDate,
    passengers: &'a [crate::model::Passenger],
    contact_email: &'a str,
    contact_phone: &'a str,
}

/// Carrier reached over a small JSON REST contract:
/// `GET /api/flights`, `POST /api/bookings`, `GET|DELETE /api/bookings/{pnr}`.
///
/// Health is the outcome of the last call: a transport error marks the carrier
/// down until a later call gets any response back.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    carrier_code: String,
    healthy: AtomicBool,
}

impl HttpBackend {
    pub fn new(carrier_code: &str, base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            carrier_code: carrier_code.to_string(),
            healthy: AtomicBool::new(true),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(&self, err: reqwest::Error) -> BackendError {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            if self.healthy.swap(false, Ordering::SeqCst) {
                warn!(carrier = %self.carrier_code, error = %err, "Carrier marked unhealthy");
            }
            BackendError::Transport(err.to_string())
        } else {
            BackendError::Rejected(err.to_string())
        }
    }

    fn reachable(&self) {
        if !self.healthy.swap(true, Ordering::SeqCst) {
            info!(carrier = %self.carrier_code, "Carrier reachable again");
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        self.reachable();
        Ok(response)
    }
}

#[async_trait]
impl AirlineBackend for HttpBackend {
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<FlightQuote>, BackendError> {
        let date = criteria.departure_date.to_string();
        let passengers = criteria.passenger_count.to_string();
        let request = self.client.get(self.url("/api/flights")).query(&[
            ("origin", criteria.origin.as_str()),
            ("destination", criteria.destination.as_str()),
            ("date", date.as_str()),
            ("passengers", passengers.as_str()),
            ("cabin", criteria.cabin_class.code()),
        ]);

        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(BackendError::Rejected(format!(
                "search returned {}",
                response.status()
            )));
        }
        response
            .json::<Vec<FlightQuote>>()
            .await
            .map_err(|e| BackendError::Rejected(format!("malformed search response: {}", e)))
    }

    async fn book(
        &self,
        offer: &Offer,
        passengers: &PassengerDetails,
    ) -> Result<CarrierConfirmation, BackendError> {
        let body = HttpBookingRequest {
            offer_id: &offer.offer_id,
            flight_number: &offer.flight_number,
            date: offer.date,
            passengers: &passengers.passengers,
            contact_email: &passengers.contact_email,
            contact_phone: &passengers.contact_phone,
        };

        let response = self
            .send(self.client.post(self.url("/api/bookings")).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::Rejected(format!(
                "booking returned {}",
                response.status()
            )));
        }
        response
            .json::<CarrierConfirmation>()
            .await
            .map_err(|e| BackendError::Rejected(format!("malformed booking response: {}", e)))
    }

    async fn booking_status(&self, pnr: &str) -> Result<Option<BookingStatusSnapshot>, BackendError> {
        let response = self
            .send(self.client.get(self.url(&format!("/api/bookings/{}", pnr))))
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BackendError::Rejected(format!(
                "status lookup returned {}",
                response.status()
            )));
        }
        response
            .json::<BookingStatusSnapshot>()
            .await
            .map(Some)
            .map_err(|e| BackendError::Rejected(format!("malformed status response: {}", e)))
    }

    async fn cancel(&self, pnr: &str) -> Result<bool, BackendError> {
        let response = self
            .send(self.client.delete(self.url(&format!("/api/bookings/{}", pnr))))
            .await?;
        Ok(response.status().is_success())
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

// Builds the adapter for one configured carrier: HTTP when a base URL is set, simulated otherwise
pub fn build_adapter(
    carrier: &CarrierConfig,
    default_timeout: Duration,
) -> Result<Arc<dyn ProviderAdapter>, ConfigError> {
    let timeout = carrier
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(default_timeout);

    let adapter: Arc<dyn ProviderAdapter> = match &carrier.base_url {
        Some(base_url) => {
            let backend = HttpBackend::new(&carrier.code, base_url, timeout)
                .map_err(|e| ConfigError::Invalid(format!("carrier {}: {}", carrier.code, e)))?;
            Arc::new(CarrierAdapter::new(&carrier.code, &carrier.name, timeout, backend))
        }
        None => Arc::new(CarrierAdapter::new(
            &carrier.code,
            &carrier.name,
            timeout,
            SimulatedBackend::for_carrier(&carrier.code),
        )),
    };

    Ok(adapter)
}
