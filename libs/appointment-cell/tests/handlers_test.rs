use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::handlers::AppointmentCellState;
use appointment_cell::models::BookingStatus;
use appointment_cell::router::booking_routes;
use appointment_cell::services::{BookingService, FeedbackService, HttpPaymentGate, PaymentService};
use appointment_cell::store::{BookingGuard, BookingPatch, BookingStore, InMemoryBookingStore};
use doctor_cell::models::{SetAvailabilityRequest, SlotKey, TimeSlot};
use doctor_cell::services::{AvailabilityService, SlotGenerator, SlotGridConfig};
use doctor_cell::store::{InMemoryAvailabilityStore, InMemoryScoreStore, ScoreStore};
use notification_cell::services::dispatcher::InMemoryNotificationDispatcher;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct TestApp {
    router: Router,
    bookings: Arc<InMemoryBookingStore>,
    scores: Arc<InMemoryScoreStore>,
    config: TestConfig,
    doctor: TestUser,
    slot: SlotKey,
}

/// Two days out, inside the bookable horizon.
fn upcoming_slot() -> SlotKey {
    SlotKey::new((Utc::now() + Duration::days(2)).date_naive(), TimeSlot::new(10, 30).unwrap())
}

async fn create_test_app() -> TestApp {
    let config = TestConfig::default();
    let app_config = config.to_arc();
    let doctor = TestUser::doctor("doc@example.com");
    let slot = upcoming_slot();

    let generator = SlotGenerator::new(SlotGridConfig::default()).with_host_timezone(Some("UTC".to_string()));
    let availability = Arc::new(AvailabilityService::new(Arc::new(InMemoryAvailabilityStore::new()), generator));
    availability
        .set_availability(doctor.uuid(), SetAvailabilityRequest { from_date: slot.date, slots: vec![slot], timezone: None })
        .await
        .unwrap();

    let bookings = Arc::new(InMemoryBookingStore::new());
    let scores = Arc::new(InMemoryScoreStore::new());
    let dispatcher = Arc::new(InMemoryNotificationDispatcher::new());

    let state = Arc::new(AppointmentCellState {
        config: app_config.clone(),
        bookings: Arc::new(BookingService::new(bookings.clone(), availability, dispatcher.clone())),
        payments: Arc::new(PaymentService::new(
            bookings.clone(),
            Arc::new(HttpPaymentGate::new(&app_config)),
            dispatcher,
            app_config.server_url.clone(),
        )),
        feedback: Arc::new(FeedbackService::new(bookings.clone(), scores.clone())),
    });

    TestApp { router: booking_routes(state), bookings, scores, config, doctor, slot }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: String, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", token)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: String, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", token)
        .body(Body::empty())
        .unwrap()
}

impl TestApp {
    fn create_body(&self, patient: &TestUser, amount: f64) -> Value {
        json!({
            "patient_id": patient.id,
            "doctor_id": self.doctor.id,
            "booking_date": self.slot.date,
            "booking_time_slot": self.slot.time_slot,
            "amount": amount,
            "patient_timezone": "Europe/Berlin",
            "patient_name": "Ada Obi"
        })
    }

    async fn book(&self, patient: &TestUser, amount: f64) -> Value {
        let token = JwtTestUtils::bearer(patient, &self.config);
        let (status, body) = send(&self.router, post_json("/".to_string(), &token, self.create_body(patient, amount))).await;
        assert_eq!(status, StatusCode::CREATED);
        body["booking"].clone()
    }

    async fn confirm(&self, booking_id: &str) {
        let token = JwtTestUtils::bearer(&self.doctor, &self.config);
        let (status, _) = send(&self.router, post_json(
            format!("/{}/decision", booking_id),
            &token,
            json!({ "decision": "confirmed", "doctor_name": "Dr. Bello" }),
        )).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_patient_books_and_second_patient_conflicts() {
    let app = create_test_app().await;
    let patient = TestUser::patient("pat@example.com");
    let other = TestUser::patient("other@example.com");

    let booking = app.book(&patient, 30.0).await;
    assert_eq!(booking["status"], "pending");
    assert_eq!(booking["patient_timezone"], "Europe/Berlin");

    let (status, body) = send(&app.router, post_json(
        "/".to_string(),
        &JwtTestUtils::bearer(&other, &app.config),
        app.create_body(&other, 30.0),
    )).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "slot_conflict");

    let (status, body) = send(&app.router, post_json(
        "/".to_string(),
        &JwtTestUtils::bearer(&patient, &app.config),
        app.create_body(&patient, 30.0),
    )).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["booking"]["id"], booking["id"]);
    assert_eq!(body["dispatch"]["state"], "skipped");
}

#[tokio::test]
async fn test_cannot_book_for_someone_else() {
    let app = create_test_app().await;
    let patient = TestUser::patient("pat@example.com");
    let intruder = TestUser::patient("intruder@example.com");

    let (status, body) = send(&app.router, post_json(
        "/".to_string(),
        &JwtTestUtils::bearer(&intruder, &app.config),
        app.create_body(&patient, 30.0),
    )).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = create_test_app().await;

    let (status, body) = send(&app.router, Request::builder()
        .uri(format!("/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap()).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn test_only_the_booked_doctor_decides() {
    let app = create_test_app().await;
    let patient = TestUser::patient("pat@example.com");
    let booking = app.book(&patient, 30.0).await;
    let id = booking["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app.router, post_json(
        format!("/{}/decision", id),
        &JwtTestUtils::bearer(&TestUser::doctor("other-doc@example.com"), &app.config),
        json!({ "decision": "confirmed" }),
    )).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let doctor_token = JwtTestUtils::bearer(&app.doctor, &app.config);
    let (status, body) = send(&app.router, post_json(
        format!("/{}/decision", id),
        &doctor_token,
        json!({ "decision": "rejected" }),
    )).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["booking"]["status"], "rejected");

    let (status, body) = send(&app.router, post_json(
        format!("/{}/decision", id),
        &doctor_token,
        json!({ "decision": "confirmed" }),
    )).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");
}

#[tokio::test]
async fn test_meet_link_hidden_until_paid() {
    let app = create_test_app().await;
    let patient = TestUser::patient("pat@example.com");
    let admin = TestUser::admin("admin@example.com");
    let booking = app.book(&patient, 30.0).await;
    let id = booking["id"].as_str().unwrap().to_string();
    app.confirm(&id).await;

    let doctor_token = JwtTestUtils::bearer(&app.doctor, &app.config);
    let link_request = |token: &str| Request::builder()
        .method("PUT")
        .uri(format!("/{}/meet-link", id))
        .header("Authorization", token)
        .header("Content-Type", "application/json")
        .body(Body::from(json!({ "meet_link": "https://meet.example.com/abc" }).to_string()))
        .unwrap();

    let (status, body) = send(&app.router, link_request(&doctor_token)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");

    let (status, _) = send(&app.router, post_json(
        format!("/{}/paid", id),
        &JwtTestUtils::bearer(&patient, &app.config),
        json!({}),
    )).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app.router, post_json(
        format!("/{}/paid", id),
        &JwtTestUtils::bearer(&admin, &app.config),
        json!({}),
    )).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["booking"]["is_paid"], true);

    let (status, _) = send(&app.router, link_request(&doctor_token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app.router, get(format!("/patients/{}", patient.id), &JwtTestUtils::bearer(&patient, &app.config))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["bookings"][0]["meet_link"], "https://meet.example.com/abc");
}

#[tokio::test]
async fn test_unconfigured_payment_gateway_is_a_bad_gateway() {
    let app = create_test_app().await;
    let patient = TestUser::patient("pat@example.com");
    let booking = app.book(&patient, 30.0).await;
    let id = booking["id"].as_str().unwrap().to_string();
    app.confirm(&id).await;

    let (status, body) = send(&app.router, post_json(
        format!("/{}/payment", id),
        &JwtTestUtils::bearer(&patient, &app.config),
        json!({ "doctor_name": "Dr. Bello" }),
    )).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "external_dispatch_failure");
}

#[tokio::test]
async fn test_feedback_after_conducted_consultation() {
    let app = create_test_app().await;
    let patient = TestUser::patient("pat@example.com");
    let booking = app.book(&patient, 0.0).await;
    let id = booking["id"].as_str().unwrap().to_string();
    app.confirm(&id).await;

    let patient_token = JwtTestUtils::bearer(&patient, &app.config);
    let feedback = json!({ "consultation_occurred": true, "on_time": false, "rating": 4, "feedback": "Helpful" });

    let (status, body) = send(&app.router, post_json(format!("/{}/feedback", id), &patient_token, feedback.clone())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "not_eligible");

    // The slot is in the future, so conduct it directly in the store.
    let booking_id: Uuid = id.parse().unwrap();
    app.bookings
        .update_where(
            booking_id,
            &BookingGuard::status(BookingStatus::Confirmed),
            &BookingPatch { consultation_conducted: Some(true), ..BookingPatch::default() },
        )
        .await
        .unwrap();

    let (status, body) = send(&app.router, post_json(format!("/{}/feedback", id), &patient_token, feedback.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score_delta"], 25);
    assert_eq!(body["score_applied"], true);
    assert_eq!(body["booking"]["consultation_on_time_patient"], false);

    let (status, _) = send(&app.router, post_json(format!("/{}/feedback", id), &patient_token, feedback)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.scores.get_score(app.doctor.uuid()).await.unwrap().points, 25);
}

#[tokio::test]
async fn test_out_of_range_rating_is_a_validation_error() {
    let app = create_test_app().await;
    let patient = TestUser::patient("pat@example.com");
    let booking = app.book(&patient, 0.0).await;
    let id = booking["id"].as_str().unwrap().to_string();
    let patient_token = JwtTestUtils::bearer(&patient, &app.config);

    for rating in [json!(300), json!(-1), json!(0)] {
        let feedback = json!({ "consultation_occurred": true, "on_time": true, "rating": rating });
        let (status, body) = send(&app.router, post_json(format!("/{}/feedback", id), &patient_token, feedback)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "rating {}", rating);
        assert_eq!(body["code"], "validation_error");
    }
}

#[tokio::test]
async fn test_conducted_before_start_is_rejected() {
    let app = create_test_app().await;
    let patient = TestUser::patient("pat@example.com");
    let booking = app.book(&patient, 0.0).await;
    let id = booking["id"].as_str().unwrap().to_string();
    app.confirm(&id).await;

    let (status, body) = send(&app.router, post_json(
        format!("/{}/conducted", id),
        &JwtTestUtils::bearer(&app.doctor, &app.config),
        json!({}),
    )).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");
}

#[tokio::test]
async fn test_bookable_slots_drop_once_booked() {
    let app = create_test_app().await;
    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::bearer(&patient, &app.config);
    let uri = format!("/doctors/{}/slots?timezone=UTC", app.doctor.id);

    let (status, body) = send(&app.router, get(uri.clone(), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["timezone"], "UTC");
    assert_eq!(
        body["days"][0]["slots"][0]["id"],
        format!("{}_10:30", app.slot.date.format("%Y-%m-%d"))
    );

    app.book(&patient, 30.0).await;

    let (_, body) = send(&app.router, get(uri, &token)).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_doctor_lists_their_bookings() {
    let app = create_test_app().await;
    let patient = TestUser::patient("pat@example.com");
    app.book(&patient, 30.0).await;

    let (status, body) = send(&app.router, get(
        format!("/doctors/{}", app.doctor.id),
        &JwtTestUtils::bearer(&app.doctor, &app.config),
    )).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["bookings"][0]["patient_id"], patient.id);

    let (status, _) = send(&app.router, get(
        format!("/doctors/{}", app.doctor.id),
        &JwtTestUtils::bearer(&patient, &app.config),
    )).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
