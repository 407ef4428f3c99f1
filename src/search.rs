// Parallel search: fan out to every healthy carrier, merge, cache, filter, sort

use crate::cache::OfferStore;
use crate::model::{Offer, OfferFilter, SearchCriteria, SearchResponse, SortKey, SortOrder, SortSpec};
use crate::registry::AdapterRegistry;
use futures::future::join_all;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct SearchOrchestrator {
    registry: Arc<AdapterRegistry>,
    cache: Arc<dyn OfferStore>,
    provider_timeout: Duration,
}

impl SearchOrchestrator {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        cache: Arc<dyn OfferStore>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            cache,
            provider_timeout,
        }
    }

    /// Searches all healthy carriers concurrently.
    ///
    /// Never fails: a carrier that errors, times out or panics contributes no
    /// offers, and an empty registry yields an empty response. Every returned
    /// offer has been offered to the correlation cache before it is filtered out
    /// or sorted. Dropping the returned future aborts any carrier calls still in
    /// flight.
    pub async fn search(&self, criteria: &SearchCriteria) -> SearchResponse {
        let search_id = Uuid::new_v4().to_string();
        let start = Instant::now();

        let adapters = self.registry.healthy_adapters();
        if adapters.is_empty() {
            warn!(search_id = %search_id, "No healthy carriers available");
            return SearchResponse::empty(search_id);
        }

        info!(
            search_id = %search_id,
            origin = %criteria.origin,
            destination = %criteria.destination,
            date = %criteria.departure_date,
            carriers = adapters.len(),
            "Fanning out search"
        );

        let mut contributions: Vec<Vec<Offer>> = vec![Vec::new(); adapters.len()];
        let mut tasks = JoinSet::new();
        for (index, adapter) in adapters.into_iter().enumerate() {
            let criteria = criteria.clone();
            let timeout = self.provider_timeout;
            tasks.spawn(async move {
                let carrier = adapter.carrier_code().to_string();
                let result = tokio::time::timeout(timeout, adapter.search_offers(&criteria)).await;
                (index, carrier, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, carrier, Ok(Ok(offers)))) => {
                    debug!(search_id = %search_id, carrier = %carrier, count = offers.len(), "Carrier responded");
                    contributions[index] = offers;
                }
                Ok((_, carrier, Ok(Err(err)))) => {
                    warn!(search_id = %search_id, carrier = %carrier, error = %err, "Carrier search failed, skipping");
                }
                Ok((_, carrier, Err(_))) => {
                    warn!(
                        search_id = %search_id,
                        carrier = %carrier,
                        timeout_ms = self.provider_timeout.as_millis() as u64,
                        "Carrier search timed out, skipping"
                    );
                }
                Err(err) => {
                    warn!(search_id = %search_id, error = %err, "Carrier search task aborted, skipping");
                }
            }
        }

        // Concatenated in registry order so equal sort keys keep a stable provider order
        let mut offers: Vec<Offer> = contributions.into_iter().flatten().collect();

        self.cache_offers(&search_id, &offers).await;

        if let Some(filter) = &criteria.filter {
            offers = filter_offers(offers, filter, criteria.passenger_count);
        }
        sort_offers(&mut offers, criteria.sort.unwrap_or_default());

        info!(
            search_id = %search_id,
            offers = offers.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search completed"
        );

        SearchResponse { search_id, offers }
    }

    // Best effort: a failed write is logged and the offer stays in the response
    async fn cache_offers(&self, search_id: &str, offers: &[Offer]) {
        let writes = offers.iter().map(|offer| async move {
            match self.cache.put(&offer.offer_id, offer).await {
                Ok(()) => {
                    debug!(search_id, offer_id = %offer.offer_id, "Cached offer");
                    true
                }
                Err(err) => {
                    warn!(search_id, offer_id = %offer.offer_id, error = %err, "Failed to cache offer");
                    false
                }
            }
        });

        let cached = join_all(writes).await.into_iter().filter(|ok| *ok).count();
        if cached < offers.len() {
            warn!(search_id, cached, total = offers.len(), "Some offers were not cached");
        }
    }
}

fn compare(a: &Offer, b: &Offer, key: SortKey) -> Ordering {
    match key {
        SortKey::Price => a.price.minor_units.cmp(&b.price.minor_units),
        SortKey::Duration => a.duration_minutes.cmp(&b.duration_minutes),
        SortKey::DepartureTime => a.departure_time.cmp(&b.departure_time),
    }
}

/// Stable sort: offers with equal keys keep their incoming order in both directions.
pub fn sort_offers(offers: &mut [Offer], spec: SortSpec) {
    match spec.order {
        SortOrder::Asc => offers.sort_by(|a, b| compare(a, b, spec.key)),
        SortOrder::Desc => offers.sort_by(|a, b| compare(b, a, spec.key)),
    }
}

pub fn filter_offers(offers: Vec<Offer>, filter: &OfferFilter, passenger_count: u32) -> Vec<Offer> {
    let min_seats = filter.min_seats.unwrap_or(passenger_count);

    offers
        .into_iter()
        .filter(|offer| {
            filter
                .max_price
                .as_ref()
                .map_or(true, |max| offer.price.minor_units <= max.minor_units)
        })
        .filter(|offer| filter.max_stops.map_or(true, |max| offer.stops <= max))
        .filter(|offer| {
            filter
                .carriers
                .as_ref()
                .map_or(true, |allowed| allowed.iter().any(|code| code == &offer.carrier_code))
        })
        .filter(|offer| offer.available_seats >= min_seats)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{CarrierAdapter, ProviderAdapter};
    use crate::backend::{ScheduledFlight, SimulatedBackend};
    use crate::cache::CorrelationCache;
    use crate::error::{CacheError, ProviderError};
    use crate::model::{BookingOutcome, BookingStatusSnapshot, Money, OfferStatus, PassengerDetails};
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use test_case::test_case;

    fn criteria() -> SearchCriteria {
        SearchCriteria::new("DEL", "BOM", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
    }

    fn offer(id: &str, price: i64, departure: (u32, u32), duration: u32) -> Offer {
        Offer {
            offer_id: id.to_string(),
            carrier_code: "6E".to_string(),
            carrier_name: "IndiGo".to_string(),
            flight_number: format!("6E-{}", id),
            origin: "DEL".to_string(),
            destination: "BOM".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            departure_time: NaiveTime::from_hms_opt(departure.0, departure.1, 0).unwrap(),
            arrival_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            duration_minutes: duration,
            stops: 0,
            price: Money::from_major(price, "INR"),
            available_seats: 50,
            aircraft_type: "A320".to_string(),
            status: OfferStatus::Available,
        }
    }

    fn carrier(code: &str, name: &str) -> Arc<CarrierAdapter<SimulatedBackend>> {
        Arc::new(CarrierAdapter::new(
            code,
            name,
            Duration::from_secs(1),
            SimulatedBackend::for_carrier(code),
        ))
    }

    fn builtin_registry() -> (Arc<AdapterRegistry>, Vec<Arc<CarrierAdapter<SimulatedBackend>>>) {
        let registry = Arc::new(AdapterRegistry::new());
        let carriers = vec![
            carrier("6E", "IndiGo"),
            carrier("AI", "Air India"),
            carrier("SG", "SpiceJet"),
            carrier("UK", "Vistara"),
        ];
        for adapter in &carriers {
            registry.register(adapter.clone());
        }
        (registry, carriers)
    }

    fn orchestrator(registry: Arc<AdapterRegistry>, cache: Arc<dyn OfferStore>) -> SearchOrchestrator {
        SearchOrchestrator::new(registry, cache, Duration::from_secs(2))
    }

    struct BrokenStore;

    #[async_trait]
    impl OfferStore for BrokenStore {
        async fn put(&self, _: &str, _: &Offer) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection reset".to_string()))
        }

        async fn get(&self, _: &str) -> Result<Option<Offer>, CacheError> {
            Err(CacheError::Unavailable("connection reset".to_string()))
        }

        async fn invalidate(&self, _: &str) -> Result<bool, CacheError> {
            Ok(false)
        }
    }

    // Ignores its own timeout discipline, so only the orchestrator bound saves the search
    struct StuckAdapter;

    #[async_trait]
    impl ProviderAdapter for StuckAdapter {
        fn carrier_code(&self) -> &str {
            "ZZ"
        }

        fn carrier_name(&self) -> &str {
            "Stuck Air"
        }

        async fn search_offers(&self, _: &SearchCriteria) -> Result<Vec<Offer>, ProviderError> {
            std::future::pending().await
        }

        async fn create_booking(&self, _: &str, _: &Offer, _: &PassengerDetails) -> BookingOutcome {
            std::future::pending().await
        }

        async fn fetch_booking_status(&self, _: &str) -> Option<BookingStatusSnapshot> {
            None
        }

        async fn cancel_booking(&self, _: &str) -> bool {
            false
        }

        fn is_healthy(&self) -> bool {
            true
        }
    }

    // Records whether its search ran to completion or was dropped mid-flight
    #[derive(Default)]
    struct SlowAdapter {
        started: Arc<AtomicBool>,
        finished: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, AtomicOrdering::SeqCst);
        }
    }

    #[async_trait]
    impl ProviderAdapter for SlowAdapter {
        fn carrier_code(&self) -> &str {
            "SL"
        }

        fn carrier_name(&self) -> &str {
            "Slow Air"
        }

        async fn search_offers(&self, _: &SearchCriteria) -> Result<Vec<Offer>, ProviderError> {
            self.started.store(true, AtomicOrdering::SeqCst);
            let _guard = DropFlag(self.dropped.clone());
            tokio::time::sleep(Duration::from_secs(600)).await;
            self.finished.store(true, AtomicOrdering::SeqCst);
            Ok(Vec::new())
        }

        async fn create_booking(&self, _: &str, _: &Offer, _: &PassengerDetails) -> BookingOutcome {
            BookingOutcome::failed("not bookable")
        }

        async fn fetch_booking_status(&self, _: &str) -> Option<BookingStatusSnapshot> {
            None
        }

        async fn cancel_booking(&self, _: &str) -> bool {
            false
        }

        fn is_healthy(&self) -> bool {
            true
        }
    }

    struct PanickingAdapter;

    #[async_trait]
    impl ProviderAdapter for PanickingAdapter {
        fn carrier_code(&self) -> &str {
            "PX"
        }

        fn carrier_name(&self) -> &str {
            "Panic Air"
        }

        async fn search_offers(&self, _: &SearchCriteria) -> Result<Vec<Offer>, ProviderError> {
            panic!("malformed carrier payload")
        }

        async fn create_booking(&self, _: &str, _: &Offer, _: &PassengerDetails) -> BookingOutcome {
            BookingOutcome::failed("unused")
        }

        async fn fetch_booking_status(&self, _: &str) -> Option<BookingStatusSnapshot> {
            None
        }

        async fn cancel_booking(&self, _: &str) -> bool {
            false
        }

        fn is_healthy(&self) -> bool {
            true
        }
    }

    #[test_case(SortOrder::Asc, &[4800, 5500, 6500, 7200] ; "price ascending")]
    #[test_case(SortOrder::Desc, &[7200, 6500, 5500, 4800] ; "price descending")]
    fn test_sort_by_price(order: SortOrder, expected: &[i64]) {
        let mut offers = vec![
            offer("a", 6500, (8, 0), 120),
            offer("b", 4800, (9, 0), 120),
            offer("c", 7200, (10, 0), 120),
            offer("d", 5500, (11, 0), 120),
        ];
        sort_offers(&mut offers, SortSpec::new(SortKey::Price, order));

        let prices: Vec<i64> = offers.iter().map(|o| o.price.minor_units / 100).collect();
        assert_eq!(prices, expected);
    }

    #[test_case(SortOrder::Asc, &["08:15", "10:30", "12:00", "14:00"] ; "departure ascending")]
    #[test_case(SortOrder::Desc, &["14:00", "12:00", "10:30", "08:15"] ; "departure descending")]
    fn test_sort_by_departure(order: SortOrder, expected: &[&str]) {
        let mut offers = vec![
            offer("a", 5000, (12, 0), 120),
            offer("b", 5000, (8, 15), 120),
            offer("c", 5000, (14, 0), 120),
            offer("d", 5000, (10, 30), 120),
        ];
        sort_offers(&mut offers, SortSpec::new(SortKey::DepartureTime, order));

        let times: Vec<String> = offers
            .iter()
            .map(|o| o.departure_time.format("%H:%M").to_string())
            .collect();
        assert_eq!(times, expected);
    }

    #[test_case(SortOrder::Asc, &["short", "tie-1", "tie-2", "long"] ; "duration ascending")]
    #[test_case(SortOrder::Desc, &["long", "tie-1", "tie-2", "short"] ; "duration descending keeps tie order")]
    fn test_sort_by_duration_is_stable(order: SortOrder, expected: &[&str]) {
        let mut offers = vec![
            offer("tie-1", 5000, (8, 0), 150),
            offer("long", 5000, (9, 0), 240),
            offer("tie-2", 5000, (10, 0), 150),
            offer("short", 5000, (11, 0), 90),
        ];
        sort_offers(&mut offers, SortSpec::new(SortKey::Duration, order));

        let ids: Vec<&str> = offers.iter().map(|o| o.offer_id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_default_sort_is_price_ascending() {
        assert_eq!(SortSpec::default(), SortSpec::new(SortKey::Price, SortOrder::Asc));
    }

    #[test_case(OfferFilter { max_price: Some(Money::from_major(5000, "INR")), ..Default::default() }, &["cheap"] ; "max price")]
    #[test_case(OfferFilter { max_stops: Some(0), min_seats: Some(1), ..Default::default() }, &["cheap", "pricey"] ; "non-stop only")]
    #[test_case(OfferFilter { carriers: Some(vec!["AI".to_string()]), ..Default::default() }, &["connecting"] ; "carrier allow-list")]
    #[test_case(OfferFilter { min_seats: Some(10), ..Default::default() }, &["cheap", "connecting"] ; "explicit seat minimum")]
    #[test_case(OfferFilter::default(), &["cheap", "connecting"] ; "seat minimum falls back to passengers")]
    fn test_filters(filter: OfferFilter, expected: &[&str]) {
        let cheap = offer("cheap", 4200, (8, 0), 120);
        let mut pricey = offer("pricey", 9000, (9, 0), 120);
        pricey.available_seats = 2;
        let mut connecting = offer("connecting", 6100, (10, 0), 300);
        connecting.stops = 1;
        connecting.carrier_code = "AI".to_string();

        let kept = filter_offers(vec![cheap, pricey, connecting], &filter, 3);
        let ids: Vec<&str> = kept.iter().map(|o| o.offer_id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_fan_out_merges_every_carrier() {
        let (registry, carriers) = builtin_registry();
        let cache = Arc::new(CorrelationCache::new(Duration::from_secs(1800), 1000));
        let search = orchestrator(registry, cache.clone());

        let response = search.search(&criteria()).await;

        assert_eq!(response.offers.len(), 6);
        assert_eq!(cache.len(), 6);
        for offer in &response.offers {
            assert_eq!(cache.lookup(&offer.offer_id).as_ref(), Some(offer));
        }
        assert!(carriers.iter().all(|c| c.backend().search_count() == 1));

        let prices: Vec<i64> = response.offers.iter().map(|o| o.price.minor_units / 100).collect();
        assert_eq!(prices, vec![4200, 4500, 4800, 5200, 5500, 6800]);
    }

    #[tokio::test]
    async fn test_identical_searches_get_distinct_ids() {
        let (registry, _) = builtin_registry();
        let cache = Arc::new(CorrelationCache::new(Duration::from_secs(1800), 1000));
        let search = orchestrator(registry, cache.clone());

        let first = search.search(&criteria()).await;
        let second = search.search(&criteria()).await;

        assert_ne!(first.search_id, second.search_id);
        let ids: HashSet<&str> = first
            .offers
            .iter()
            .chain(second.offers.iter())
            .map(|o| o.offer_id.as_str())
            .collect();
        assert_eq!(ids.len(), 12);
        assert_eq!(cache.len(), 12);
    }

    #[tokio::test]
    async fn test_failing_carrier_is_isolated() {
        let (registry, carriers) = builtin_registry();
        carriers[1].backend().fail_searches(true);
        let search = orchestrator(
            registry,
            Arc::new(CorrelationCache::new(Duration::from_secs(1800), 1000)),
        );

        let response = search.search(&criteria()).await;

        assert_eq!(response.offers.len(), 4);
        assert!(response.offers.iter().all(|o| o.carrier_code != "AI"));
    }

    #[tokio::test]
    async fn test_unhealthy_carrier_is_not_called() {
        let (registry, carriers) = builtin_registry();
        carriers[0].backend().set_healthy(false);
        let search = orchestrator(
            registry,
            Arc::new(CorrelationCache::new(Duration::from_secs(1800), 1000)),
        );

        let response = search.search(&criteria()).await;

        assert_eq!(response.offers.len(), 4);
        assert_eq!(carriers[0].backend().search_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_carrier_is_cut_off_by_orchestrator_timeout() {
        let (registry, _) = builtin_registry();
        registry.register(Arc::new(StuckAdapter));
        let search = orchestrator(
            registry,
            Arc::new(CorrelationCache::new(Duration::from_secs(1800), 1000)),
        );

        let response = search.search(&criteria()).await;

        assert_eq!(response.offers.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_search_aborts_carriers_still_in_flight() {
        let (registry, carriers) = builtin_registry();
        let slow = Arc::new(SlowAdapter::default());
        registry.register(slow.clone());
        let cache = Arc::new(CorrelationCache::new(Duration::from_secs(1800), 1000));
        let search = SearchOrchestrator::new(registry, cache.clone(), Duration::from_secs(3600));

        let abandoned = tokio::time::timeout(Duration::from_secs(1), search.search(&criteria())).await;
        assert!(abandoned.is_err());

        // Give the runtime a chance to drop the aborted task
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(slow.started.load(AtomicOrdering::SeqCst));
        assert!(slow.dropped.load(AtomicOrdering::SeqCst));

        tokio::time::sleep(Duration::from_secs(900)).await;
        assert!(!slow.finished.load(AtomicOrdering::SeqCst));

        // Carriers that answered before the caller gave up were called exactly once
        for carrier in &carriers {
            assert_eq!(carrier.backend().search_count(), 1);
        }
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_carrier_contributes_nothing() {
        let (registry, _) = builtin_registry();
        registry.register(Arc::new(PanickingAdapter));
        let search = orchestrator(
            registry,
            Arc::new(CorrelationCache::new(Duration::from_secs(1800), 1000)),
        );

        let response = search.search(&criteria()).await;

        assert_eq!(response.offers.len(), 6);
    }

    #[tokio::test]
    async fn test_cache_failure_does_not_drop_offers() {
        let (registry, _) = builtin_registry();
        let search = orchestrator(registry, Arc::new(BrokenStore));

        let response = search.search(&criteria()).await;

        assert_eq!(response.offers.len(), 6);
    }

    #[tokio::test]
    async fn test_no_carriers_is_an_empty_success() {
        let search = orchestrator(
            Arc::new(AdapterRegistry::new()),
            Arc::new(CorrelationCache::new(Duration::from_secs(1800), 1000)),
        );

        let response = search.search(&criteria()).await;

        assert!(response.offers.is_empty());
        assert!(!response.search_id.is_empty());
    }

    #[tokio::test]
    async fn test_filtered_offers_are_still_cached() {
        let registry = Arc::new(AdapterRegistry::new());
        registry.register(Arc::new(CarrierAdapter::new(
            "6E",
            "IndiGo",
            Duration::from_secs(1),
            SimulatedBackend::new(
                "6E",
                vec![
                    ScheduledFlight::new("6E-1", (6, 0), (8, 15), 3900),
                    ScheduledFlight::new("6E-2", (7, 0), (9, 15), 8900),
                ],
            ),
        )));
        let cache = Arc::new(CorrelationCache::new(Duration::from_secs(1800), 1000));
        let search = orchestrator(registry, cache.clone());

        let request = criteria().filtered_by(OfferFilter {
            max_price: Some(Money::from_major(5000, "INR")),
            ..Default::default()
        });
        let response = search.search(&request).await;

        assert_eq!(response.offers.len(), 1);
        assert_eq!(response.offers[0].flight_number, "6E-1");
        assert_eq!(cache.len(), 2);
    }
}
