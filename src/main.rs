use anyhow::Context;
use chrono::{Duration as DateDuration, Utc};
use flight_aggregator::model::{Passenger, PassengerDetails, SearchCriteria, SortKey, SortOrder};
use flight_aggregator::{AggregatorConfig, FlightAggregator, PaymentRequest};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flight_aggregator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AggregatorConfig::load().context("loading aggregator configuration")?;
    let aggregator = FlightAggregator::from_config(config).context("building aggregator")?;
    let _janitor = aggregator.start_cache_janitor();

    let departure = Utc::now().date_naive() + DateDuration::days(14);
    let criteria = SearchCriteria::new("DEL", "BOM", departure).sorted_by(SortKey::Price, SortOrder::Asc);
    let response = aggregator.search(&criteria).await;

    info!(search_id = %response.search_id, offers = response.offers.len(), "Search finished");
    for offer in &response.offers {
        info!(
            "{} {} {} -> {} dep {} arr {} {}",
            offer.carrier_name,
            offer.flight_number,
            offer.origin,
            offer.destination,
            offer.departure_time.format("%H:%M"),
            offer.arrival_time.format("%H:%M"),
            offer.price
        );
    }

    let Some(cheapest) = response.offers.first() else {
        warn!("No flights found");
        return Ok(());
    };

    let passengers = PassengerDetails {
        passengers: vec![Passenger::adult("Asha", "Rao", 31)],
        contact_email: "asha.rao@example.com".to_string(),
        contact_phone: "+91-9800000000".to_string(),
        special_requests: None,
    };
    let booking = aggregator
        .book(&cheapest.offer_id, &passengers)
        .await
        .context("booking cheapest offer")?;
    info!(
        reference = %booking.booking_reference,
        pnr = %booking.confirmation_code,
        carrier = %booking.carrier_name,
        "Booked"
    );

    let payment = aggregator
        .confirm_payment(
            &booking.booking_reference,
            &PaymentRequest::upi(booking.total_price.clone(), "asha.rao@okbank"),
        )
        .await
        .context("confirming payment")?;
    info!(success = payment.success, transaction = ?payment.transaction_id, "{}", payment.message);

    if let Some(status) = aggregator
        .booking_status(&booking.carrier_code, &booking.confirmation_code)
        .await
    {
        info!(pnr = %status.confirmation_code, status = %status.status, "Carrier status");
    }

    // Let detached notification tasks flush before exit
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    info!(stats = ?aggregator.cache_stats(), "Done");
    Ok(())
}
