use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::models::{
    BookingDecidedRelay, BookingRequestedRelay, DispatchError, NotificationPayload, RelayBooking,
};
use notification_cell::services::dispatcher::{
    HttpNotificationDispatcher, InMemoryNotificationDispatcher, NotificationDispatcher,
};
use shared_database::SupabaseClient;
use shared_utils::test_utils::TestConfig;

fn requested_relay() -> BookingRequestedRelay {
    BookingRequestedRelay {
        doctor_id: Uuid::new_v4(),
        patient_name: "Ada Obi".to_string(),
        booking_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        booking_time_slot: "09:00".to_string(),
        booking_id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        amount: 25.0,
        consultation_duration_minutes: 45,
        patient_timezone: "Africa/Lagos".to_string(),
    }
}

fn dispatcher_for(server: &MockServer) -> HttpNotificationDispatcher {
    let config = TestConfig::with_mock_server(&server.uri()).to_app_config();
    HttpNotificationDispatcher::new(&config, Arc::new(SupabaseClient::new(&config)))
}

#[tokio::test]
async fn test_booking_request_is_posted_to_relay() {
    let server = MockServer::start().await;
    let relay = requested_relay();

    Mock::given(method("POST"))
        .and(path("/relay/booking-request"))
        .and(body_partial_json(json!({
            "booking_id": relay.booking_id,
            "patient_name": "Ada Obi",
            "booking_time_slot": "09:00",
            "consultation_duration_minutes": 45,
            "patient_timezone": "Africa/Lagos"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    dispatcher_for(&server).booking_requested(&relay).await.unwrap();
}

#[tokio::test]
async fn test_decision_relay_failure_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/relay/booking-status"))
        .and(body_partial_json(json!({ "booking": { "status": "confirmed" }, "doctor_name": "Dr. Bello" })))
        .respond_with(ResponseTemplate::new(503).set_body_string("relay down"))
        .expect(1)
        .mount(&server)
        .await;

    let relay = BookingDecidedRelay {
        booking: RelayBooking {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            status: "confirmed".to_string(),
            booking_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            booking_time_slot: "09:00".to_string(),
        },
        doctor_name: "Dr. Bello".to_string(),
    };

    let result = dispatcher_for(&server).booking_decided(&relay).await;
    assert_matches!(result, Err(DispatchError::Rejected { status: 503, ref message }) if message == "relay down");
}

#[tokio::test]
async fn test_missing_relay_url_is_not_configured() {
    let config = TestConfig::default().to_app_config();
    let dispatcher = HttpNotificationDispatcher::new(&config, Arc::new(SupabaseClient::new(&config)));

    let result = dispatcher.booking_requested(&requested_relay()).await;
    assert_matches!(result, Err(DispatchError::NotConfigured));
}

#[tokio::test]
async fn test_notify_inserts_notification_row() {
    let server = MockServer::start().await;
    let recipient = Uuid::new_v4();
    let booking_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({
            "recipient_id": recipient,
            "kind": "payment_success",
            "payload": { "type": "payment_success", "booking_id": booking_id }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "recipient_id": recipient,
            "kind": "payment_success",
            "payload": { "type": "payment_success", "booking_id": booking_id, "amount": 25.0 },
            "is_read": false,
            "created_at": "2025-06-01T09:00:00Z"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let notification = dispatcher_for(&server)
        .notify(recipient, NotificationPayload::PaymentSuccess { booking_id, amount: 25.0 })
        .await
        .unwrap();

    assert_eq!(notification.recipient_id, recipient);
    assert_eq!(notification.payload.booking_id(), Some(booking_id));
}

#[tokio::test]
async fn test_in_memory_dispatcher_records_everything() {
    let dispatcher = InMemoryNotificationDispatcher::new();
    let relay = requested_relay();
    let recipient = relay.patient_id;

    dispatcher.booking_requested(&relay).await.unwrap();
    dispatcher
        .notify(recipient, NotificationPayload::MeetLinkUpdate {
            booking_id: relay.booking_id,
            meet_link: "https://meet.example.com/x".to_string(),
        })
        .await
        .unwrap();

    let relayed = dispatcher.relayed().await;
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].0, "booking-request");
    assert_eq!(relayed[0].1["patient_name"], "Ada Obi");

    let inbox = dispatcher.notifications_for(recipient).await;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, "meet_link_update");
    assert!(!inbox[0].is_read);
}
