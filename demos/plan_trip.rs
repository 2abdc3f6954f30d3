//! Example: planning a trip against the live services.
//!
//! Reads `TRIP_TEXT_API_KEY` (a Groq key by default) and the other `TRIP_*`
//! variables from the environment.
//!
//! Run with: `cargo run --example plan_trip -- Italy bicycle`

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use trip_pipeline::{GetRouteRequest, GetRouteResponse, PipelineCoordinator, TripConfig, TripService, TripType};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trip_pipeline=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let country = args.next().unwrap_or_else(|| "France".to_string());
    let trip_type: TripType = args
        .next()
        .as_deref()
        .unwrap_or("car")
        .parse()
        .context("trip type must be 'car' or 'bicycle'")?;

    let coordinator = PipelineCoordinator::from_config(TripConfig::from_env())
        .context("failed to build the pipeline")?;
    let service = TripService::new(Arc::new(coordinator));

    // Ctrl-C abandons the image job instead of waiting out its polls.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let request = GetRouteRequest { country, trip_type };
    let response = service.get_route_with_cancel(&request, &cancel).await;

    match &response {
        GetRouteResponse::Success(plan) => {
            println!("{} routes, {} km total", plan.routes.len(), plan.total_distance_km());
            for route in plan.unresolved_routes() {
                println!("warning: day {} has unresolved places", route.index);
            }
            if let Some(id) = &plan.image.job_id {
                let status = service.check_image_status(id).await;
                println!("image {}: {:?}", id, status.status);
            }
        }
        GetRouteResponse::Failure(failure) => eprintln!("{}: {}", failure.error, failure.details),
    }
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
