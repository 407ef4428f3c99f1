// Error taxonomy for the aggregator core
use thiserror::Error;

// Failures of a single carrier backend. During search these are absorbed and logged,
// during booking they end the attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("{carrier} did not respond within {after_ms}ms")]
    Timeout { carrier: String, after_ms: u64 },

    #[error("{carrier} reported a failure: {message}")]
    Failure { carrier: String, message: String },

    #[error("{carrier} is unreachable: {message}")]
    Unreachable { carrier: String, message: String },
}

impl ProviderError {
    pub fn carrier(&self) -> &str {
        match self {
            ProviderError::Timeout { carrier, .. }
            | ProviderError::Failure { carrier, .. }
            | ProviderError::Unreachable { carrier, .. } => carrier,
        }
    }
}

// Raw failure from a carrier backend before the adapter attaches the carrier identity
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Rejected by backend: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("Offer store unavailable: {0}")]
    Unavailable(String),

    #[error("Offer store is full ({capacity} entries)")]
    CapacityExceeded { capacity: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Booking not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookingError {
    #[error("Offer {0} not found in search results. Please search again.")]
    OfferExpiredOrUnknown(String),

    #[error("Unsupported carrier: {0}")]
    UnsupportedCarrier(String),

    #[error("Carrier booking failed ({carrier}): {message}")]
    ProviderFailure { carrier: String, message: String },

    #[error("Carrier {carrier} did not confirm within {after_ms}ms")]
    ProviderTimeout { carrier: String, after_ms: u64 },

    #[error("Offer lookup failed: {0}")]
    CacheUnavailable(String),

    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Booking store error: {0}")]
    Storage(#[from] PersistenceError),

    #[error("Booking confirmed by carrier (PNR {pnr}) but could not be recorded: {source}")]
    Persistence {
        pnr: String,
        #[source]
        source: PersistenceError,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
