// Flight aggregator core: parallel carrier search, offer correlation and booking

pub mod adapter;
pub mod aggregator;
pub mod backend;
pub mod booking;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod notify;
pub mod payment;
pub mod persistence;
pub mod registry;
pub mod search;

// Re-export key types for convenience
pub use adapter::{AirlineBackend, CarrierAdapter, ProviderAdapter};
pub use aggregator::FlightAggregator;
pub use backend::{HttpBackend, SimulatedBackend};
pub use booking::{BookingOrchestrator, BookingStage};
pub use cache::{CacheStatsReport, CorrelationCache, OfferStore};
pub use config::{AggregatorConfig, CacheConfig, CarrierConfig};
pub use error::{BookingError, CacheError, ConfigError, PersistenceError, ProviderError};
pub use model::{
    BookingReference, Money, Offer, OfferFilter, PassengerDetails, SearchCriteria, SearchResponse,
    SortKey, SortOrder, SortSpec,
};
pub use notify::{EventPublisher, NotificationListener};
pub use payment::{ChargeResult, PaymentDispatcher, PaymentMethod, PaymentRequest};
pub use persistence::{BookingRepository, InMemoryBookingRepository};
pub use registry::AdapterRegistry;
pub use search::SearchOrchestrator;
