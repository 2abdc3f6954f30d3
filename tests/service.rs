//! End-to-end `TripService` behaviour with scripted collaborators.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;
use trip_pipeline::backend::{ImageCheck, MockGeocoder, MockImageService, MockReply, MockTextBackend};
use trip_pipeline::events::{Event, FnEventHandler, JobPhase};
use trip_pipeline::{
    Coordinate, GeocodeCache, GetRouteRequest, GetRouteResponse, ImageStatus, JobState,
    PipelineCoordinator, TripConfig, TripService, TripType,
};

const FRANCE: &str = "Sure! Here's a 3-day road trip.\n\n\
**Day 1:**\n\
From Paris to Lyon\n\
Total Distance: 450 km\n\
Estimated Duration: 5 hours\n\
Eiffel Tower\n\
Basilica of Fourviere\n\n\
**Day 2:**\n\
From Lyon to Annecy\n\
Total Distance: 140 km\n\
Estimated Duration: 2 hours\n\
Lake Annecy\n\
Palais de l'Isle\n\n\
**Day 3:**\n\
From Annecy to Chamonix\n\
Total Distance: 100 km\n\
Estimated Duration: 1.5 hours\n\
Aiguille du Midi\n";

fn geocoder() -> MockGeocoder {
    MockGeocoder::new()
        .with_place("Paris", 48.8566, 2.3522)
        .with_place("Lyon", 45.7640, 4.8357)
        .with_place("Annecy", 45.8992, 6.1294)
        .with_place("Chamonix", 45.9237, 6.8694)
}

fn request(country: &str, trip_type: TripType) -> GetRouteRequest {
    GetRouteRequest {
        country: country.to_string(),
        trip_type,
    }
}

fn service_with(text: &str, geo: MockGeocoder, image: Option<Arc<MockImageService>>) -> TripService {
    let builder = PipelineCoordinator::builder(Arc::new(MockTextBackend::fixed(text)))
        .geocoder(Arc::new(geo));
    let builder = match image {
        Some(image) => builder.image_service(image),
        None => builder.image_enabled(false),
    };
    TripService::new(Arc::new(assert_ok!(builder.build())))
}

#[tokio::test(start_paused = true)]
async fn car_trip_is_clamped_and_continuous() {
    let image = Arc::new(MockImageService::completing("job-1", "https://img/france.webp"));
    let service = service_with(FRANCE, geocoder(), Some(image));

    let response = service.get_route(&request("France", TripType::Car)).await;
    assert_eq!(response.status_code(), 200);
    let plan = response.plan().unwrap();

    assert_eq!(plan.routes.len(), 3);
    let day1 = &plan.routes[0];
    assert_eq!(day1.distance_km, 300);
    assert_eq!(day1.start_place, "Paris");
    assert_eq!(day1.end_place, "Lyon");
    assert_eq!(day1.start_coord, Coordinate::new(48.8566, 2.3522));

    for pair in plan.routes.windows(2) {
        assert_eq!(pair[0].end_place, pair[1].start_place);
    }
    assert!(plan.routes.iter().all(|r| (80..=300).contains(&r.distance_km)));
    assert_eq!(plan.image.status, ImageStatus::Completed);
}

#[tokio::test]
async fn bicycle_trip_caps_distances() {
    let service = service_with(FRANCE, geocoder(), None);
    let response = service.get_route(&request("France", TripType::Bicycle)).await;
    let plan = response.plan().unwrap();

    let distances: Vec<u32> = plan.routes.iter().map(|r| r.distance_km).collect();
    assert_eq!(distances, vec![80, 80, 80]);
    assert_eq!(plan.image.status, ImageStatus::Skipped);
}

#[tokio::test]
async fn geocoding_miss_degrades_route() {
    let geo = MockGeocoder::new()
        .with_place("Paris", 48.8566, 2.3522)
        .with_failure("Annecy", "connection reset");
    let service = service_with(FRANCE, geo, None);

    let response = service.get_route(&request("France", TripType::Car)).await;
    assert_eq!(response.status_code(), 200);
    let plan = response.plan().unwrap();

    let day1 = &plan.routes[0];
    assert!(day1.start_resolved);
    assert!(!day1.end_resolved);
    assert_eq!(day1.end_coord, Coordinate::UNRESOLVED);
    assert_eq!(plan.unresolved_routes().count(), 3);
}

#[tokio::test(start_paused = true)]
async fn submission_rate_limits_are_waited_out() {
    let image = Arc::new(MockImageService::new(
        vec![
            MockReply::RateLimited(Some(Duration::from_secs(5))),
            MockReply::RateLimited(Some(Duration::from_secs(5))),
            MockReply::Ok("job-2".to_string()),
        ],
        vec![MockReply::Ok(ImageCheck::finished(["https://img/2.webp"]))],
    ));

    let started = tokio::time::Instant::now();
    let queued_after = Arc::new(Mutex::new(None));
    let rate_limits = Arc::new(Mutex::new(Vec::new()));
    let (queued_sink, rl_sink) = (queued_after.clone(), rate_limits.clone());
    let handler = Arc::new(FnEventHandler(move |event: Event| match event {
        Event::JobTransition { to: JobState::Queued, .. } => {
            *queued_sink.lock().unwrap() = Some(started.elapsed());
        }
        Event::RateLimited { phase, delay_ms } => rl_sink.lock().unwrap().push((phase, delay_ms)),
        _ => {}
    }));

    let coordinator = PipelineCoordinator::builder(Arc::new(MockTextBackend::fixed(FRANCE)))
        .geocoder(Arc::new(geocoder()))
        .image_service(image.clone())
        .event_handler(handler)
        .build()
        .unwrap();
    let service = TripService::new(Arc::new(coordinator));

    let response = service.get_route(&request("France", TripType::Car)).await;
    let plan = response.plan().unwrap();

    assert_eq!(plan.image.status, ImageStatus::Completed);
    assert_eq!(*queued_after.lock().unwrap(), Some(Duration::from_secs(10)));
    assert_eq!(
        *rate_limits.lock().unwrap(),
        vec![(JobPhase::Submission, 5000), (JobPhase::Submission, 5000)]
    );
    assert_eq!(image.submit_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn image_done_without_results_is_unavailable() {
    let image = Arc::new(MockImageService::new(
        vec![MockReply::Ok("job-3".to_string())],
        vec![MockReply::Ok(ImageCheck::finished(Vec::<String>::new()))],
    ));
    let service = service_with(FRANCE, geocoder(), Some(image));

    let response = service.get_route(&request("France", TripType::Car)).await;
    let plan = response.plan().unwrap();

    assert_eq!(plan.routes.len(), 3);
    assert_eq!(plan.image.status, ImageStatus::Unavailable);
    assert_eq!(plan.image.job_id.as_deref(), Some("job-3"));
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_polling_keeps_routes() {
    let image = Arc::new(MockImageService::new(vec![MockReply::Ok("job-4".to_string())], vec![]));
    let service = service_with(FRANCE, geocoder(), Some(image.clone()));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(25)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let response = service
        .get_route_with_cancel(&request("France", TripType::Car), &cancel)
        .await;

    assert!(started.elapsed() < Duration::from_secs(30));
    let plan = response.plan().unwrap();
    assert_eq!(plan.routes.len(), 3);
    assert_eq!(plan.image.status, ImageStatus::Unavailable);
    assert_eq!(image.check_calls(), 1);
}

#[tokio::test]
async fn text_without_days_fails_the_request() {
    let service = service_with("I'm sorry, I can't plan that trip.", geocoder(), None);
    let response = service.get_route(&request("France", TripType::Car)).await;

    assert_eq!(response.status_code(), 500);
    let GetRouteResponse::Failure(failure) = &response else {
        panic!("expected a failure, got {:?}", response);
    };
    assert_eq!(failure.error, "Error fetching data");

    let json = serde_json::to_value(&response).unwrap();
    assert!(json.get("routes").is_none());
}

#[tokio::test]
async fn success_payload_is_camel_case() {
    let service = service_with(FRANCE, geocoder(), None);
    let response = service.get_route(&request("France", TripType::Car)).await;
    let json: Value = serde_json::to_value(&response).unwrap();

    let day1 = &json["routes"][0];
    assert_eq!(day1["startPlace"], "Paris");
    assert_eq!(day1["distanceKm"], 300);
    assert_eq!(day1["pointsOfInterest"][0], "Eiffel Tower");
    assert_eq!(day1["name"], "France - Day 1 Route");
    assert_eq!(json["image"]["status"], "skipped");
    assert!(json["prompt"].as_str().unwrap().contains("France by car"));
}

#[tokio::test]
async fn cache_is_shared_between_requests() {
    let geo = Arc::new(geocoder());
    let cache = GeocodeCache::new();
    let coordinator = PipelineCoordinator::builder(Arc::new(MockTextBackend::fixed(FRANCE)))
        .geocoder(geo.clone())
        .cache(cache.clone())
        .config(TripConfig::default())
        .image_enabled(false)
        .build()
        .unwrap();
    let service = TripService::new(Arc::new(coordinator));

    service.get_route(&request("France", TripType::Car)).await;
    let first = geo.calls();
    service.get_route(&request("France", TripType::Car)).await;

    assert_eq!(cache.len(), 4);
    assert_eq!(geo.calls(), first);
}
