use chrono::NaiveDate;
use flight_aggregator::config::CarrierConfig;
use flight_aggregator::model::{Passenger, SortKey, SortOrder};
use flight_aggregator::notify::EventPublisher;
use flight_aggregator::{
    AdapterRegistry, AggregatorConfig, BookingError, CarrierAdapter, CorrelationCache,
    FlightAggregator, InMemoryBookingRepository, PassengerDetails, PaymentDispatcher,
    SearchCriteria, SimulatedBackend,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

struct Harness {
    aggregator: FlightAggregator,
    carriers: Vec<Arc<CarrierAdapter<SimulatedBackend>>>,
    cache: Arc<CorrelationCache>,
    repository: Arc<InMemoryBookingRepository>,
}

fn harness(config: AggregatorConfig) -> Harness {
    let registry = Arc::new(AdapterRegistry::new());
    let carriers: Vec<_> = [("6E", "IndiGo"), ("AI", "Air India"), ("SG", "SpiceJet"), ("UK", "Vistara")]
        .iter()
        .map(|(code, name)| {
            Arc::new(CarrierAdapter::new(
                code,
                name,
                config.provider_timeout(),
                SimulatedBackend::for_carrier(code),
            ))
        })
        .collect();
    for carrier in &carriers {
        registry.register(carrier.clone());
    }

    let cache = Arc::new(CorrelationCache::new(config.offer_ttl(), config.cache.max_entries));
    let repository = Arc::new(InMemoryBookingRepository::new());
    let aggregator = FlightAggregator::new(
        config,
        registry,
        cache.clone(),
        repository.clone(),
        Arc::new(EventPublisher::new()),
        Arc::new(PaymentDispatcher::simulated(1.0)),
    );

    Harness {
        aggregator,
        carriers,
        cache,
        repository,
    }
}

fn del_bom() -> SearchCriteria {
    SearchCriteria::new("DEL", "BOM", NaiveDate::from_ymd_opt(2025, 12, 20).unwrap())
}

fn passengers() -> PassengerDetails {
    PassengerDetails {
        passengers: vec![Passenger::adult("Asha", "Rao", 31)],
        contact_email: "asha@example.com".to_string(),
        contact_phone: "+91-9800000000".to_string(),
        special_requests: None,
    }
}

#[tokio::test]
async fn search_merges_all_carriers_and_caches_every_offer() {
    let h = harness(AggregatorConfig::default());

    let first = h.aggregator.search(&del_bom()).await;
    assert_eq!(first.offers.len(), 6);
    assert_eq!(h.cache.len(), 6);
    for offer in &first.offers {
        assert!(h.cache.lookup(&offer.offer_id).is_some());
    }

    let second = h.aggregator.search(&del_bom()).await;
    assert_ne!(first.search_id, second.search_id);
    let ids: HashSet<_> = first
        .offers
        .iter()
        .chain(&second.offers)
        .map(|o| o.offer_id.clone())
        .collect();
    assert_eq!(ids.len(), 12);
}

#[tokio::test]
async fn one_failing_carrier_only_removes_its_own_offers() {
    let h = harness(AggregatorConfig::default());
    h.carriers[0].backend().fail_searches(true);

    let response = h.aggregator.search(&del_bom()).await;

    assert_eq!(response.offers.len(), 4);
    assert!(response.offers.iter().all(|o| o.carrier_code != "6E"));
}

#[tokio::test(start_paused = true)]
async fn slow_carrier_is_excluded_after_timeout() {
    let h = harness(AggregatorConfig {
        provider_timeout_ms: 200,
        ..Default::default()
    });
    h.carriers[3].backend().set_delay(Duration::from_secs(10));

    let response = h.aggregator.search(&del_bom()).await;

    assert_eq!(response.offers.len(), 5);
    assert!(response.offers.iter().all(|o| o.carrier_code != "UK"));
}

#[tokio::test]
async fn sorting_is_applied_to_merged_results() {
    let h = harness(AggregatorConfig::default());

    let response = h
        .aggregator
        .search(&del_bom().sorted_by(SortKey::DepartureTime, SortOrder::Desc))
        .await;

    let flights: Vec<&str> = response.offers.iter().map(|o| o.flight_number.as_str()).collect();
    assert_eq!(flights, vec!["AI-101", "UK-567", "6E-456", "SG-234", "AI-789", "6E-123"]);
}

#[tokio::test(start_paused = true)]
async fn offer_cached_31_minutes_ago_cannot_be_booked() {
    let h = harness(AggregatorConfig::default());
    let response = h.aggregator.search(&del_bom()).await;
    let offer_id = response.offers[0].offer_id.clone();

    tokio::time::advance(Duration::from_secs(31 * 60)).await;

    let err = assert_err!(h.aggregator.book(&offer_id, &passengers()).await);
    assert_eq!(err, BookingError::OfferExpiredOrUnknown(offer_id));
    assert!(err.to_string().contains("Please search again"));
    assert!(h.repository.is_empty());
}

#[tokio::test]
async fn unknown_offer_id_never_fabricates_a_booking() {
    let h = harness(AggregatorConfig::default());

    let err = assert_err!(h.aggregator.book("not-an-offer", &passengers()).await);

    assert!(matches!(err, BookingError::OfferExpiredOrUnknown(_)));
    assert!(h.carriers.iter().all(|c| c.backend().booking_count() == 0));
}

#[tokio::test]
async fn offer_from_unregistered_carrier_creates_no_record() {
    let h = harness(AggregatorConfig::default());
    let response = h.aggregator.search(&del_bom()).await;
    let offer = response
        .offers
        .iter()
        .find(|o| o.carrier_code == "SG")
        .unwrap()
        .clone();
    h.aggregator.registry().deregister("SG");

    let err = assert_err!(h.aggregator.book(&offer.offer_id, &passengers()).await);

    assert_eq!(err, BookingError::UnsupportedCarrier("SG".to_string()));
    assert!(h.repository.is_empty());
}

#[tokio::test]
async fn same_offer_can_be_booked_twice_by_default() {
    let h = harness(AggregatorConfig::default());
    let response = h.aggregator.search(&del_bom()).await;
    let offer_id = &response.offers[0].offer_id;

    let first = assert_ok!(h.aggregator.book(offer_id, &passengers()).await);
    let second = assert_ok!(h.aggregator.book(offer_id, &passengers()).await);

    assert_ne!(first.booking_reference, second.booking_reference);
    assert_eq!(h.repository.len(), 2);
}

#[tokio::test]
async fn invalidation_makes_offers_single_use() {
    let h = harness(AggregatorConfig {
        invalidate_offer_on_booking: true,
        ..Default::default()
    });
    let response = h.aggregator.search(&del_bom()).await;
    let offer_id = response.offers[0].offer_id.clone();

    assert_ok!(h.aggregator.book(&offer_id, &passengers()).await);
    let err = assert_err!(h.aggregator.book(&offer_id, &passengers()).await);

    assert_eq!(err, BookingError::OfferExpiredOrUnknown(offer_id));
    assert_eq!(h.cache.len(), 5);
}

#[tokio::test]
async fn cancel_with_unknown_carrier_reports_false() {
    let h = harness(AggregatorConfig::default());

    assert!(!h.aggregator.cancel("ZZ", "ZZ123456").await);
}

#[tokio::test]
async fn unreachable_http_carrier_contributes_nothing() {
    let config = AggregatorConfig {
        provider_timeout_ms: 2000,
        carriers: vec![
            CarrierConfig::new("6E", "IndiGo"),
            CarrierConfig {
                base_url: Some("http://127.0.0.1:9".to_string()),
                ..CarrierConfig::new("XH", "Remote Air")
            },
        ],
        ..Default::default()
    };
    let aggregator = assert_ok!(FlightAggregator::from_config(config));

    let response = aggregator.search(&del_bom()).await;

    assert_eq!(response.offers.len(), 2);
    assert!(response.offers.iter().all(|o| o.carrier_code == "6E"));
}
