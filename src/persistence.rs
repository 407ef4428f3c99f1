// Booking records: the aggregator's own store, outside the booking failure domain

use crate::error::PersistenceError;
use crate::model::{BookingReference, BookingStatus, PaymentStatus};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

#[async_trait]
pub trait BookingRepository: Send + Sync + 'static {
    /// Stores a new record and returns the id it is filed under.
    async fn save_booking(&self, booking: BookingReference) -> Result<String, PersistenceError>;

    async fn find_booking(&self, booking_id: &str) -> Result<Option<BookingReference>, PersistenceError>;

    async fn update_status(&self, booking_id: &str, status: BookingStatus) -> Result<(), PersistenceError>;

    async fn update_payment_status(
        &self,
        booking_id: &str,
        status: PaymentStatus,
    ) -> Result<(), PersistenceError>;
}

#[derive(Default)]
pub struct InMemoryBookingRepository {
    // Keyed by the aggregator booking reference
    bookings: DashMap<String, BookingReference>,
    unavailable: AtomicBool,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // Simulates a storage outage: every call fails until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    fn check_available(&self) -> Result<(), PersistenceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PersistenceError::Storage("booking store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn save_booking(&self, booking: BookingReference) -> Result<String, PersistenceError> {
        self.check_available()?;

        let id = booking.booking_reference.clone();
        match self.bookings.entry(id.clone()) {
            Entry::Occupied(_) => Err(PersistenceError::Storage(format!(
                "duplicate booking reference {}",
                id
            ))),
            Entry::Vacant(slot) => {
                info!(booking_id = %id, pnr = %booking.confirmation_code, "Booking saved");
                slot.insert(booking);
                Ok(id)
            }
        }
    }

    async fn find_booking(&self, booking_id: &str) -> Result<Option<BookingReference>, PersistenceError> {
        self.check_available()?;
        Ok(self.bookings.get(booking_id).map(|entry| entry.value().clone()))
    }

    async fn update_status(&self, booking_id: &str, status: BookingStatus) -> Result<(), PersistenceError> {
        self.check_available()?;
        let mut entry = self
            .bookings
            .get_mut(booking_id)
            .ok_or_else(|| PersistenceError::NotFound(booking_id.to_string()))?;
        entry.status = status;
        debug!(booking_id, ?status, "Booking status updated");
        Ok(())
    }

    async fn update_payment_status(
        &self,
        booking_id: &str,
        status: PaymentStatus,
    ) -> Result<(), PersistenceError> {
        self.check_available()?;
        let mut entry = self
            .bookings
            .get_mut(booking_id)
            .ok_or_else(|| PersistenceError::NotFound(booking_id.to_string()))?;
        entry.payment_status = status;
        debug!(booking_id, ?status, "Payment status updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Money;
    use chrono::{NaiveDate, NaiveTime, Utc};

    fn booking(reference: &str) -> BookingReference {
        BookingReference {
            booking_reference: reference.to_string(),
            carrier_code: "AI".to_string(),
            carrier_name: "Air India".to_string(),
            confirmation_code: "AIQ7X2M9".to_string(),
            provider_booking_id: "prov-1".to_string(),
            offer_id: "offer-1".to_string(),
            flight_number: "AI-789".to_string(),
            origin: "DEL".to_string(),
            destination: "BOM".to_string(),
            departure_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            departure_time: NaiveTime::from_hms_opt(9, 45, 0).unwrap(),
            total_price: Money::from_major(4800, "INR"),
            passenger_count: 1,
            contact_email: "asha@example.com".to_string(),
            status: BookingStatus::Confirmed,
            payment_status: PaymentStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_find_update() {
        let repo = InMemoryBookingRepository::new();
        let id = repo.save_booking(booking("MMTAAAA1111")).await.unwrap();
        assert_eq!(id, "MMTAAAA1111");

        repo.update_payment_status(&id, PaymentStatus::Completed).await.unwrap();
        repo.update_status(&id, BookingStatus::Cancelled).await.unwrap();

        let stored = repo.find_booking(&id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Completed);
        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert_eq!(stored.flight_number, "AI-789");
    }

    #[tokio::test]
    async fn test_duplicate_reference_rejected() {
        let repo = InMemoryBookingRepository::new();
        repo.save_booking(booking("MMTDUP00001")).await.unwrap();

        let err = repo.save_booking(booking("MMTDUP00001")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Storage(_)));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_booking() {
        let repo = InMemoryBookingRepository::new();
        assert_eq!(repo.find_booking("BK999999").await, Ok(None));
        assert_eq!(
            repo.update_status("BK999999", BookingStatus::Cancelled).await,
            Err(PersistenceError::NotFound("BK999999".to_string()))
        );
    }

    #[tokio::test]
    async fn test_outage_fails_every_call() {
        let repo = InMemoryBookingRepository::new();
        repo.set_unavailable(true);

        assert!(repo.save_booking(booking("MMTOUT00001")).await.is_err());
        assert!(repo.is_empty());

        repo.set_unavailable(false);
        assert!(repo.save_booking(booking("MMTOUT00001")).await.is_ok());
    }
}
