// Value types shared by adapters, orchestrators and external collaborators

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// Amount in minor units (paise, cents) so prices compare exactly
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub minor_units: i64,
    pub currency: String,
}

impl Money {
    pub fn new(minor_units: i64, currency: &str) -> Self {
        Self {
            minor_units,
            currency: currency.to_string(),
        }
    }

    pub fn from_major(amount: i64, currency: &str) -> Self {
        Self::new(amount * 100, currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minor_units < 0 { "-" } else { "" };
        let abs = self.minor_units.abs();
        write!(f, "{} {}{}.{:02}", self.currency, sign, abs / 100, abs % 100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    Available,
    SoldOut,
}

// One bookable flight from one carrier, produced during a single search.
// Never mutated after the adapter builds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub offer_id: String,
    pub carrier_code: String,
    pub carrier_name: String,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CabinClass {
    #[default]
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl CabinClass {
    pub fn code(&self) -> &'static str {
        match self {
            CabinClass::Economy => "ECONOMY",
            CabinClass::PremiumEconomy => "PREMIUM_ECONOMY",
            CabinClass::Business => "BUSINESS",
            CabinClass::First => "FIRST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortKey {
    #[default]
    Price,
    Duration,
    DepartureTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: SortKey,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(key: SortKey, order: SortOrder) -> Self {
        Self { key, order }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferFilter {
    pub max_price: Option<Money>,
    pub max_stops: Option<u8>,
    pub carriers: Option<Vec<String>>,
    // Falls back to the passenger count when unset
    pub min_seats: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    #[serde(default = "default_passenger_count")]
    pub passenger_count: u32,
    #[serde(default)]
    pub cabin_class: CabinClass,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub filter: Option<OfferFilter>,
}

fn default_passenger_count() -> u32 {
    1
}

impl SearchCriteria {
    pub fn new(origin: &str, destination: &str, departure_date: NaiveDate) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_date,
            passenger_count: 1,
            cabin_class: CabinClass::Economy,
            sort: None,
            filter: None,
        }
    }

    pub fn sorted_by(mut self, key: SortKey, order: SortOrder) -> Self {
        self.sort = Some(SortSpec::new(key, order));
        self
    }

    pub fn filtered_by(mut self, filter: OfferFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_passengers(mut self, passenger_count: u32) -> Self {
        self.passenger_count = passenger_count;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    // Traceability only, later lookups go through each offer's own id
    pub search_id: String,
    pub offers: Vec<Offer>,
}

impl SearchResponse {
    pub fn empty(search_id: String) -> Self {
        Self {
            search_id,
            offers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PassengerType {
    Adult,
    Child,
    Infant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passenger {
    pub first_name: String,
    pub last_name: String,
    pub age: u8,
    pub passenger_type: PassengerType,
    #[serde(default)]
    pub passport_number: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub seat_number: Option<String>,
    #[serde(default)]
    pub meal_preference: Option<String>,
}

impl Passenger {
    pub fn adult(first_name: &str, last_name: &str, age: u8) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            age,
            passenger_type: PassengerType::Adult,
            passport_number: None,
            nationality: None,
            seat_number: None,
            meal_preference: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerDetails {
    pub passengers: Vec<Passenger>,
    pub contact_email: String,
    pub contact_phone: String,
    #[serde(default)]
    pub special_requests: Option<String>,
}

// What a carrier says about a booking attempt. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingOutcome {
    pub success: bool,
    pub confirmation_code: Option<String>,
    pub provider_booking_id: Option<String>,
    pub message: String,
}

impl BookingOutcome {
    pub fn confirmed(confirmation_code: String, provider_booking_id: String, message: String) -> Self {
        Self {
            success: true,
            confirmation_code: Some(confirmation_code),
            provider_booking_id: Some(provider_booking_id),
            message,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            confirmation_code: None,
            provider_booking_id: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingStatusSnapshot {
    pub confirmation_code: String,
    pub status: String,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

// The aggregator's own record of a confirmed carrier booking.
// Flight fields are copied from the offer, which expires shortly after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingReference {
    pub booking_reference: String,
    pub carrier_code: String,
    pub carrier_name: String,
    pub confirmation_code: String,
    pub provider_booking_id: String,
    pub offer_id: String,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub total_price: Money,
    pub passenger_count: usize,
    pub contact_email: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}
