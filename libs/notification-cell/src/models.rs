// libs/notification-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::DbError;

// ==============================================================================
// IN-APP NOTIFICATIONS
// ==============================================================================

/// Notification body, tagged by `type`. Each variant carries only what its
/// recipient needs to render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationPayload {
    BookingConfirmed {
        booking_id: Uuid,
        doctor_id: Uuid,
        booking_date: NaiveDate,
        booking_time_slot: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        doctor_name: Option<String>,
    },
    BookingRejected {
        booking_id: Uuid,
        doctor_id: Uuid,
        booking_date: NaiveDate,
        booking_time_slot: String,
    },
    PaymentSuccess {
        booking_id: Uuid,
        amount: f64,
    },
    MeetLinkUpdate {
        booking_id: Uuid,
        meet_link: String,
    },
    AdminAnnouncement {
        title: String,
        message: String,
    },
}

impl NotificationPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationPayload::BookingConfirmed { .. } => "booking_confirmed",
            NotificationPayload::BookingRejected { .. } => "booking_rejected",
            NotificationPayload::PaymentSuccess { .. } => "payment_success",
            NotificationPayload::MeetLinkUpdate { .. } => "meet_link_update",
            NotificationPayload::AdminAnnouncement { .. } => "admin_announcement",
        }
    }

    pub fn booking_id(&self) -> Option<Uuid> {
        match self {
            NotificationPayload::BookingConfirmed { booking_id, .. }
            | NotificationPayload::BookingRejected { booking_id, .. }
            | NotificationPayload::PaymentSuccess { booking_id, .. }
            | NotificationPayload::MeetLinkUpdate { booking_id, .. } => Some(*booking_id),
            NotificationPayload::AdminAnnouncement { .. } => None,
        }
    }
}

/// Row in the `notifications` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: String,
    pub payload: NotificationPayload,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// RELAY PAYLOADS
// ==============================================================================

/// Sent to the relay when a patient requests a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequestedRelay {
    pub doctor_id: Uuid,
    pub patient_name: String,
    pub booking_date: NaiveDate,
    pub booking_time_slot: String,
    pub booking_id: Uuid,
    pub patient_id: Uuid,
    pub amount: f64,
    pub consultation_duration_minutes: i32,
    pub patient_timezone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayBooking {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub status: String,
    pub booking_date: NaiveDate,
    pub booking_time_slot: String,
}

/// Sent to the relay when a doctor confirms or rejects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDecidedRelay {
    pub booking: RelayBooking,
    pub doctor_name: String,
}

// ==============================================================================
// ANNOUNCEMENTS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AnnouncementRequest {
    pub recipients: Vec<Uuid>,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDelivery {
    pub recipient_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnnouncementReport {
    pub delivered: Vec<Uuid>,
    pub failed: Vec<FailedDelivery>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Invalid notification: {0}")]
    Validation(String),

    #[error("Notification relay is not configured")]
    NotConfigured,

    #[error("Notification relay rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Notification relay unreachable: {0}")]
    Transport(String),

    #[error("Failed to record notification: {0}")]
    Persistence(#[from] DbError),
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        DispatchError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_is_tagged_by_type() {
        let booking_id = Uuid::new_v4();
        let payload = NotificationPayload::MeetLinkUpdate {
            booking_id,
            meet_link: "https://meet.example.com/abc".to_string(),
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "meet_link_update");
        assert_eq!(value["meet_link"], "https://meet.example.com/abc");
        assert_eq!(payload.kind(), "meet_link_update");
        assert_eq!(payload.booking_id(), Some(booking_id));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let parsed = serde_json::from_value::<NotificationPayload>(json!({
            "type": "something_else",
            "title": "x"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_announcement_has_no_booking() {
        let payload: NotificationPayload = serde_json::from_value(json!({
            "type": "admin_announcement",
            "title": "Maintenance",
            "message": "Back at noon"
        }))
        .unwrap();

        assert_eq!(payload.kind(), "admin_announcement");
        assert_eq!(payload.booking_id(), None);
    }
}
