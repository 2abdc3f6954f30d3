//! Example: planning a trip against scripted services.
//!
//! Run with: `RUST_LOG=trip_pipeline=debug cargo run --example mock_trip`

use std::sync::Arc;
use std::time::Duration;

use trip_pipeline::backend::{ImageCheck, MockGeocoder, MockImageService, MockReply, MockTextBackend};
use trip_pipeline::events::{Event, FnEventHandler};
use trip_pipeline::{GetRouteRequest, PipelineCoordinator, TripService, TripType};
use tracing_subscriber::EnvFilter;

const ITINERARY: &str = "\
Day 1:
From Lisbon to Evora
Total Distance: 135 km
Estimated Duration: 1.5 hours
Praca do Giraldo
Roman Temple
Chapel of Bones

Day 2:
From Evora to Lagos
Total Distance: 250 km
Estimated Duration: 3 hours
Ponta da Piedade
Meia Praia

Day 3:
From Lagos to Sagres
Total Distance: 35 km
Estimated Duration: 30 minutes
Cape St Vincent
Fortaleza de Sagres
";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let geocoder = MockGeocoder::new()
        .with_place("Lisbon", 38.7223, -9.1393)
        .with_place("Evora", 38.5714, -7.9135)
        .with_place("Lagos", 37.1028, -8.6730);
    // Sagres is left out: its coordinates come back as (0, 0).

    // One rate limit on submission, a couple of polls, then a finished image.
    let images = MockImageService::new(
        vec![
            MockReply::RateLimited(Some(Duration::from_secs(1))),
            MockReply::Ok("demo-job".to_string()),
        ],
        vec![
            MockReply::Ok(ImageCheck::waiting(2, 40)),
            MockReply::Ok(ImageCheck::processing(10)),
            MockReply::Ok(ImageCheck::finished(["https://example.invalid/portugal.webp"])),
        ],
    );

    let events = Arc::new(FnEventHandler(|event: Event| match event {
        Event::JobTransition { from, to, .. } => println!("[image] {} -> {}", from, to),
        Event::Geocoded { index, place, resolved } => {
            println!("[geo]   day {} {} resolved={}", index, place, resolved)
        }
        _ => {}
    }));

    let mut config = trip_pipeline::TripConfig::default();
    // Keep the demo short; real Stable Horde jobs need the default cadence.
    config.image.initial_poll_interval_secs = 1;
    config.image.max_poll_interval_secs = 2;

    let coordinator = PipelineCoordinator::builder(Arc::new(MockTextBackend::fixed(ITINERARY)))
        .geocoder(Arc::new(geocoder))
        .image_service(Arc::new(images))
        .event_handler(events)
        .config(config)
        .build()?;
    let service = TripService::new(Arc::new(coordinator));

    let response = service
        .get_route(&GetRouteRequest {
            country: "Portugal".to_string(),
            trip_type: TripType::Car,
        })
        .await;

    println!("\nHTTP {}", response.status_code());
    if let Some(plan) = response.plan() {
        for route in &plan.routes {
            println!(
                "Day {}: {} -> {} ({} km, {})",
                route.index,
                route.start_place,
                route.end_place,
                route.distance_km,
                route.duration.as_deref().unwrap_or("?")
            );
        }
        println!("Image: {:?} {}", plan.image.status, plan.image.url.as_deref().unwrap_or("-"));
    }
    println!("\n{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
