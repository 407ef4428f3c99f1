// Carrier code -> adapter mapping shared by search and booking

use crate::adapter::ProviderAdapter;
use crate::error::BookingError;
use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct AdapterRecord {
    pub carrier_code: String,
    pub carrier_name: String,
    pub adapter: Arc<dyn ProviderAdapter>,
    // Registration order, used to give fan-out a stable provider order
    sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierStatus {
    pub carrier_code: String,
    pub carrier_name: String,
    pub available: bool,
}

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: DashMap<String, AdapterRecord>,
    next_sequence: AtomicU64,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Inserts or atomically replaces the adapter registered under the same carrier code
    pub fn register(&self, adapter: Arc<dyn ProviderAdapter>) {
        let record = AdapterRecord {
            carrier_code: adapter.carrier_code().to_string(),
            carrier_name: adapter.carrier_name().to_string(),
            adapter,
            sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
        };
        let code = record.carrier_code.clone();
        let name = record.carrier_name.clone();

        match self.adapters.insert(code.clone(), record) {
            Some(previous) => info!(
                carrier = %code,
                name = %name,
                replaced = %previous.carrier_name,
                "Replaced carrier adapter"
            ),
            None => info!(carrier = %code, name = %name, "Registered carrier adapter"),
        }
    }

    pub fn deregister(&self, carrier_code: &str) -> bool {
        self.adapters.remove(carrier_code).is_some()
    }

    pub fn resolve(&self, carrier_code: &str) -> Result<Arc<dyn ProviderAdapter>, BookingError> {
        match self.adapters.get(carrier_code) {
            Some(record) => {
                debug!(carrier = carrier_code, name = %record.carrier_name, "Resolved adapter");
                Ok(Arc::clone(&record.adapter))
            }
            None => {
                error!(carrier = carrier_code, "No adapter registered for carrier");
                Err(BookingError::UnsupportedCarrier(carrier_code.to_string()))
            }
        }
    }

    pub fn is_supported(&self, carrier_code: &str) -> bool {
        self.adapters.contains_key(carrier_code)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    fn ordered_records(&self) -> Vec<AdapterRecord> {
        let mut records: Vec<AdapterRecord> = self
            .adapters
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| record.sequence);
        records
    }

    pub fn all_adapters(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.ordered_records()
            .into_iter()
            .map(|record| record.adapter)
            .collect()
    }

    // Evaluated fresh on every call. A health probe that panics counts as unhealthy.
    pub fn healthy_adapters(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.ordered_records()
            .into_iter()
            .filter(|record| probe(record))
            .map(|record| record.adapter)
            .collect()
    }

    pub fn carrier_statuses(&self) -> Vec<CarrierStatus> {
        self.ordered_records()
            .iter()
            .map(|record| CarrierStatus {
                carrier_code: record.carrier_code.clone(),
                carrier_name: record.carrier_name.clone(),
                available: probe(record),
            })
            .collect()
    }
}

fn probe(record: &AdapterRecord) -> bool {
    match catch_unwind(AssertUnwindSafe(|| record.adapter.is_healthy())) {
        Ok(healthy) => {
            if !healthy {
                debug!(carrier = %record.carrier_code, "Carrier unhealthy, skipping");
            }
            healthy
        }
        Err(_) => {
            warn!(carrier = %record.carrier_code, "Health probe panicked, treating carrier as unavailable");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CarrierAdapter;
    use crate::backend::SimulatedBackend;
    use crate::error::ProviderError;
    use crate::model::{BookingOutcome, BookingStatusSnapshot, Offer, PassengerDetails, SearchCriteria};
    use async_trait::async_trait;
    use std::time::Duration;

    fn simulated(code: &str, name: &str) -> Arc<CarrierAdapter<SimulatedBackend>> {
        Arc::new(CarrierAdapter::new(
            code,
            name,
            Duration::from_secs(1),
            SimulatedBackend::for_carrier(code),
        ))
    }

    struct PanickingProbe;

    #[async_trait]
    impl ProviderAdapter for PanickingProbe {
        fn carrier_code(&self) -> &str {
            "XX"
        }

        fn carrier_name(&self) -> &str {
            "Broken Air"
        }

        async fn search_offers(&self, _: &SearchCriteria) -> Result<Vec<Offer>, ProviderError> {
            Ok(Vec::new())
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
            panic!("health endpoint exploded")
        }
    }

    #[test]
    fn test_resolve_registered_and_unknown() {
        let registry = AdapterRegistry::new();
        registry.register(simulated("6E", "IndiGo"));

        assert_eq!(registry.resolve("6E").unwrap().carrier_name(), "IndiGo");
        assert!(registry.is_supported("6E"));
        assert_eq!(
            registry.resolve("ZZ").err(),
            Some(BookingError::UnsupportedCarrier("ZZ".to_string()))
        );
    }

    #[test]
    fn test_reregistration_replaces_adapter() {
        let registry = AdapterRegistry::new();
        registry.register(simulated("AI", "Air India"));
        registry.register(simulated("AI", "Air India Express"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("AI").unwrap().carrier_name(), "Air India Express");
    }

    #[test]
    fn test_healthy_view_is_fresh_and_ordered() {
        let registry = AdapterRegistry::new();
        let indigo = simulated("6E", "IndiGo");
        let spicejet = simulated("SG", "SpiceJet");
        registry.register(indigo.clone());
        registry.register(simulated("AI", "Air India"));
        registry.register(spicejet.clone());

        let codes: Vec<String> = registry
            .healthy_adapters()
            .iter()
            .map(|a| a.carrier_code().to_string())
            .collect();
        assert_eq!(codes, vec!["6E", "AI", "SG"]);

        spicejet.backend().set_healthy(false);
        assert_eq!(registry.healthy_adapters().len(), 2);
        assert_eq!(registry.all_adapters().len(), 3);

        spicejet.backend().set_healthy(true);
        indigo.backend().set_healthy(false);
        let codes: Vec<String> = registry
            .healthy_adapters()
            .iter()
            .map(|a| a.carrier_code().to_string())
            .collect();
        assert_eq!(codes, vec!["AI", "SG"]);
    }

    #[test]
    fn test_panicking_health_probe_is_excluded() {
        let registry = AdapterRegistry::new();
        registry.register(simulated("UK", "Vistara"));
        registry.register(Arc::new(PanickingProbe));

        let healthy = registry.healthy_adapters();
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].carrier_code(), "UK");

        let statuses = registry.carrier_statuses();
        assert_eq!(statuses.len(), 2);
        assert!(!statuses[1].available);
    }

    #[test]
    fn test_concurrent_register_and_resolve() {
        let registry = Arc::new(AdapterRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.register(simulated("6E", &format!("IndiGo {}", i)));
                        assert!(registry.resolve("6E").is_ok());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 1);
    }
}
