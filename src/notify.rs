// Booking event fan-out to notification channels

use crate::model::BookingReference;
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    BookingConfirmed,
    PaymentConfirmed,
    BookingCancelled,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventKind::BookingConfirmed => "booking_confirmed",
            EventKind::PaymentConfirmed => "payment_confirmed",
            EventKind::BookingCancelled => "booking_cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingEvent {
    pub kind: EventKind,
    pub booking_id: String,
    pub booking: BookingReference,
}

impl BookingEvent {
    pub fn new(kind: EventKind, booking_id: &str, booking: BookingReference) -> Self {
        Self {
            kind,
            booking_id: booking_id.to_string(),
            booking,
        }
    }
}

#[async_trait]
pub trait NotificationListener: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    async fn on_event(&self, event: &BookingEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    Sms,
    Push,
}

/// Renders one message per event for a delivery channel and keeps it in an outbox.
pub struct ChannelListener {
    channel: Channel,
    name: String,
    enabled: AtomicBool,
    outbox: Mutex<Vec<String>>,
}

impl ChannelListener {
    pub fn new(channel: Channel) -> Self {
        let name = match channel {
            Channel::Email => "EmailNotification",
            Channel::Sms => "SmsNotification",
            Channel::Push => "PushNotification",
        };
        Self {
            channel,
            name: name.to_string(),
            enabled: AtomicBool::new(true),
            outbox: Mutex::new(Vec::new()),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.outbox.lock().clone()
    }

    fn render(&self, event: &BookingEvent) -> String {
        let booking = &event.booking;
        match (self.channel, event.kind) {
            (Channel::Email, EventKind::BookingConfirmed) => format!(
                "To {}: Booking {} confirmed. {} {} {} -> {} on {} at {}. Airline PNR {}. Total {}.",
                booking.contact_email,
                booking.booking_reference,
                booking.carrier_name,
                booking.flight_number,
                booking.origin,
                booking.destination,
                booking.departure_date,
                booking.departure_time.format("%H:%M"),
                booking.confirmation_code,
                booking.total_price
            ),
            (Channel::Email, EventKind::PaymentConfirmed) => format!(
                "To {}: Payment of {} received for booking {}.",
                booking.contact_email, booking.total_price, booking.booking_reference
            ),
            (Channel::Email, EventKind::BookingCancelled) => format!(
                "To {}: Booking {} ({} {}) has been cancelled.",
                booking.contact_email,
                booking.booking_reference,
                booking.flight_number,
                booking.departure_date
            ),
            (Channel::Sms, EventKind::BookingConfirmed) => format!(
                "Booking {} confirmed. {} {}-{} {}. PNR {}",
                booking.booking_reference,
                booking.flight_number,
                booking.origin,
                booking.destination,
                booking.departure_date,
                booking.confirmation_code
            ),
            (Channel::Sms, EventKind::PaymentConfirmed) => format!(
                "Payment of {} received for {}",
                booking.total_price, booking.booking_reference
            ),
            (Channel::Sms, EventKind::BookingCancelled) => {
                format!("Booking {} cancelled", booking.booking_reference)
            }
            (Channel::Push, kind) => format!(
                "[{}] {} {} {}",
                kind, booking.booking_reference, booking.flight_number, booking.departure_date
            ),
        }
    }
}

#[async_trait]
impl NotificationListener for ChannelListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn on_event(&self, event: &BookingEvent) -> anyhow::Result<()> {
        let message = self.render(event);
        info!(
            listener = %self.name,
            event = %event.kind,
            reference = %event.booking.booking_reference,
            "{}",
            message
        );
        self.outbox.lock().push(message);
        Ok(())
    }
}

/// Delivers booking events to every enabled listener.
///
/// Each listener runs in its own task. A listener that fails or panics is
/// logged and never affects the others or the publisher.
#[derive(Default)]
pub struct EventPublisher {
    listeners: RwLock<Vec<Arc<dyn NotificationListener>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels() -> Self {
        let publisher = Self::new();
        publisher.add_listener(Arc::new(ChannelListener::new(Channel::Email)));
        publisher.add_listener(Arc::new(ChannelListener::new(Channel::Sms)));
        publisher.add_listener(Arc::new(ChannelListener::new(Channel::Push)));
        publisher
    }

    pub fn add_listener(&self, listener: Arc<dyn NotificationListener>) {
        info!(listener = %listener.name(), "Added notification listener");
        self.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, name: &str) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|listener| listener.name() != name);
        let removed = listeners.len() < before;
        if removed {
            info!(listener = name, "Removed notification listener");
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Fire-and-forget delivery. The handles can be awaited but need not be.
    pub fn publish(&self, event: BookingEvent) -> Vec<JoinHandle<bool>> {
        let listeners: Vec<Arc<dyn NotificationListener>> = self
            .listeners
            .read()
            .iter()
            .filter(|listener| listener.is_enabled())
            .cloned()
            .collect();

        info!(
            event = %event.kind,
            booking_id = %event.booking_id,
            reference = %event.booking.booking_reference,
            listeners = listeners.len(),
            "Publishing booking event"
        );

        let event = Arc::new(event);
        listeners
            .into_iter()
            .map(|listener| {
                let event = Arc::clone(&event);
                tokio::spawn(async move {
                    debug!(listener = %listener.name(), event = %event.kind, "Notifying listener");
                    match listener.on_event(&event).await {
                        Ok(()) => true,
                        Err(err) => {
                            error!(
                                listener = %listener.name(),
                                event = %event.kind,
                                reference = %event.booking.booking_reference,
                                error = %err,
                                "Listener failed"
                            );
                            false
                        }
                    }
                })
            })
            .collect()
    }

    // Publishes and waits for every listener. Returns how many delivered successfully.
    pub async fn publish_and_wait(&self, event: BookingEvent) -> usize {
        join_all(self.publish(event))
            .await
            .into_iter()
            .filter(|outcome| match outcome {
                Ok(delivered) => *delivered,
                Err(err) => {
                    error!(error = %err, "Listener task panicked");
                    false
                }
            })
            .count()
    }
}
