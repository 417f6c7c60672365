use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{Booking, BookingError, CreateBookingRequest, Decision, FeedbackRequest};
use appointment_cell::services::{BookingService, FeedbackService, HttpPaymentGate, PaymentService};
use appointment_cell::store::{BookingStore, InMemoryBookingStore};
use doctor_cell::models::{DoctorScore, SetAvailabilityRequest, SlotKey, TimeSlot};
use doctor_cell::services::{AvailabilityService, SlotGenerator, SlotGridConfig};
use doctor_cell::store::{InMemoryAvailabilityStore, InMemoryScoreStore, ScoreStore};
use notification_cell::services::dispatcher::InMemoryNotificationDispatcher;
use shared_database::DbError;
use shared_utils::test_utils::TestConfig;

/// Score store that is always down.
struct UnavailableScoreStore;

#[async_trait]
impl ScoreStore for UnavailableScoreStore {
    async fn increment_points(&self, _doctor_id: Uuid, _delta: i64) -> Result<i64, DbError> {
        Err(DbError::Transport("score service unreachable".to_string()))
    }

    async fn get_score(&self, _doctor_id: Uuid) -> Result<DoctorScore, DbError> {
        Err(DbError::Transport("score service unreachable".to_string()))
    }
}

fn slot() -> SlotKey {
    SlotKey::new(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), TimeSlot::new(9, 0).unwrap())
}

fn before_slot() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 31, 12, 0, 0).unwrap()
}

fn after_slot() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
}

struct Harness {
    bookings: Arc<InMemoryBookingStore>,
    dispatcher: Arc<InMemoryNotificationDispatcher>,
    service: BookingService,
    doctor_id: Uuid,
    patient_id: Uuid,
}

async fn harness() -> Harness {
    let generator = SlotGenerator::new(SlotGridConfig::default()).with_host_timezone(Some("UTC".to_string()));
    let availability = Arc::new(AvailabilityService::new(Arc::new(InMemoryAvailabilityStore::new()), generator));
    let doctor_id = Uuid::new_v4();
    availability
        .set_availability(doctor_id, SetAvailabilityRequest { from_date: slot().date, slots: vec![slot()], timezone: None })
        .await
        .unwrap();

    let bookings = Arc::new(InMemoryBookingStore::new());
    let dispatcher = Arc::new(InMemoryNotificationDispatcher::new());
    let service = BookingService::new(bookings.clone(), availability, dispatcher.clone());

    Harness { bookings, dispatcher, service, doctor_id, patient_id: Uuid::new_v4() }
}

impl Harness {
    async fn confirmed_booking(&self, amount: f64) -> Booking {
        let created = self.service
            .create_booking(CreateBookingRequest {
                patient_id: self.patient_id,
                doctor_id: self.doctor_id,
                booking_date: slot().date,
                booking_time_slot: slot().time_slot,
                amount,
                patient_timezone: None,
                patient_name: None,
            }, before_slot())
            .await
            .unwrap();
        self.service
            .decide_booking(created.booking.id, Decision::Confirmed, None)
            .await
            .unwrap()
            .booking
    }

    async fn conducted_booking(&self) -> Booking {
        let booking = self.confirmed_booking(0.0).await;
        self.service.mark_conducted(booking.id, after_slot()).await.unwrap()
    }
}

fn feedback(rating: i64) -> FeedbackRequest {
    FeedbackRequest {
        consultation_occurred: true,
        on_time: true,
        rating,
        feedback: Some("  Very thorough.  ".to_string()),
    }
}

#[tokio::test]
async fn test_feedback_scores_the_doctor_once() {
    let h = harness().await;
    let scores = Arc::new(InMemoryScoreStore::new());
    let service = FeedbackService::new(h.bookings.clone(), scores.clone());
    let booking = h.conducted_booking().await;

    let outcome = service.submit_feedback(booking.id, feedback(5)).await.unwrap();
    assert_eq!(outcome.score_delta, 50);
    assert_eq!(outcome.doctor_points, Some(50));
    assert!(outcome.score_error.is_none());
    assert!(outcome.booking.has_feedback_patient);
    assert_eq!(outcome.booking.consultation_rating_patient, Some(5));
    assert_eq!(outcome.booking.consultation_feedback_patient.as_deref(), Some("Very thorough."));

    let second = service.submit_feedback(booking.id, feedback(1)).await;
    assert_matches!(second, Err(BookingError::NotEligible(_)));
    assert_eq!(scores.get_score(h.doctor_id).await.unwrap().points, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_feedback_scores_the_doctor_once() {
    let h = harness().await;
    let scores = Arc::new(InMemoryScoreStore::new());
    let service = Arc::new(FeedbackService::new(h.bookings.clone(), scores.clone()));
    let booking = h.conducted_booking().await;

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.submit_feedback(booking.id, feedback(5)).await })
        })
        .collect();

    let mut accepted = 0;
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(outcome) => {
                accepted += 1;
                assert_eq!(outcome.doctor_points, Some(50));
            }
            Err(e) => assert_matches!(e, BookingError::NotEligible(_)),
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(scores.get_score(h.doctor_id).await.unwrap().points, 50);
}

#[tokio::test]
async fn test_low_rating_lowers_the_score() {
    let h = harness().await;
    let scores = Arc::new(InMemoryScoreStore::new());
    let service = FeedbackService::new(h.bookings.clone(), scores.clone());
    let booking = h.conducted_booking().await;

    let outcome = service.submit_feedback(booking.id, feedback(2)).await.unwrap();
    assert_eq!(outcome.score_delta, -25);
    assert_eq!(scores.get_score(h.doctor_id).await.unwrap().points, -25);
}

#[tokio::test]
async fn test_feedback_requires_a_conducted_consultation() {
    let h = harness().await;
    let service = FeedbackService::new(h.bookings.clone(), Arc::new(InMemoryScoreStore::new()));
    let booking = h.confirmed_booking(0.0).await;

    let result = service.submit_feedback(booking.id, feedback(4)).await;
    assert_matches!(result, Err(BookingError::NotEligible(_)));

    let missing = service.submit_feedback(Uuid::new_v4(), feedback(4)).await;
    assert_matches!(missing, Err(BookingError::NotFound(_)));
}

#[tokio::test]
async fn test_out_of_range_rating_is_rejected() {
    let h = harness().await;
    let service = FeedbackService::new(h.bookings.clone(), Arc::new(InMemoryScoreStore::new()));
    let booking = h.conducted_booking().await;

    for rating in [0, 6, -1, 300, i64::MAX] {
        let result = service.submit_feedback(booking.id, feedback(rating)).await;
        assert_matches!(result, Err(BookingError::Validation(_)));
    }
    assert!(!h.bookings.get(booking.id).await.unwrap().unwrap().has_feedback_patient);
}

#[tokio::test]
async fn test_score_failure_keeps_the_feedback() {
    let h = harness().await;
    let service = FeedbackService::new(h.bookings.clone(), Arc::new(UnavailableScoreStore));
    let booking = h.conducted_booking().await;

    let outcome = service.submit_feedback(booking.id, feedback(4)).await.unwrap();
    assert_eq!(outcome.score_delta, 25);
    assert!(outcome.doctor_points.is_none());
    assert_matches!(outcome.score_error, Some(ref e) if e.contains("score service unreachable"));

    let stored = h.bookings.get(booking.id).await.unwrap().unwrap();
    assert!(stored.has_feedback_patient);
}

#[tokio::test]
async fn test_payment_initiation_then_mark_paid_reveals_link() {
    let server = MockServer::start().await;
    let h = harness().await;
    let booking = h.confirmed_booking(30.0).await;

    Mock::given(method("POST"))
        .and(path("/payments/init"))
        .and(body_partial_json(json!({
            "bookingId": booking.id,
            "patientId": h.patient_id,
            "doctorName": "Dr. Bello",
            "amount": 30.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "checkout_url": "https://pay.example.com/c/123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::with_mock_server(&server.uri()).to_app_config();
    let payments = PaymentService::new(
        h.bookings.clone(),
        Arc::new(HttpPaymentGate::new(&config)),
        h.dispatcher.clone(),
        config.server_url.clone(),
    );

    let initiation = payments
        .initiate_payment(booking.id, Some("Dr. Bello".to_string()))
        .await
        .unwrap();
    assert_eq!(initiation.payment["checkout_url"], "https://pay.example.com/c/123");
    assert!(!h.bookings.get(booking.id).await.unwrap().unwrap().is_paid);

    let paid = payments.mark_paid(booking.id).await.unwrap();
    assert!(paid.booking.is_paid);

    let again = payments.mark_paid(booking.id).await;
    assert_matches!(again, Err(BookingError::InvalidTransition { .. }));

    let with_link = h.service.set_meet_link(booking.id, "https://meet.example.com/paid").await.unwrap();
    assert!(with_link.booking.meet_link_visible());

    let inbox = h.dispatcher.notifications_for(h.patient_id).await;
    assert!(inbox.iter().any(|n| n.kind == "payment_success"));
}

#[tokio::test]
async fn test_payment_failures_surface_as_external_dispatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments/init"))
        .respond_with(ResponseTemplate::new(502).set_body_string("gateway down"))
        .mount(&server)
        .await;

    let h = harness().await;
    let booking = h.confirmed_booking(30.0).await;
    let config = TestConfig::with_mock_server(&server.uri()).to_app_config();
    let payments = PaymentService::new(
        h.bookings.clone(),
        Arc::new(HttpPaymentGate::new(&config)),
        h.dispatcher.clone(),
        config.server_url.clone(),
    );

    let result = payments.initiate_payment(booking.id, None).await;
    assert_matches!(result, Err(BookingError::ExternalDispatch(ref msg)) if msg.contains("gateway down"));
}

#[tokio::test]
async fn test_free_booking_skips_payment() {
    let h = harness().await;
    let booking = h.confirmed_booking(0.0).await;
    let config = TestConfig::default().to_app_config();
    let payments = PaymentService::new(
        h.bookings.clone(),
        Arc::new(HttpPaymentGate::new(&config)),
        h.dispatcher.clone(),
        config.server_url.clone(),
    );

    let result = payments.initiate_payment(booking.id, None).await;
    assert_matches!(result, Err(BookingError::InvalidTransition { .. }));
}
