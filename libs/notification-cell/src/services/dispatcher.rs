// libs/notification-cell/src/services/dispatcher.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DbError, SupabaseClient};

use crate::models::{
    BookingDecidedRelay, BookingRequestedRelay, DispatchError, Notification, NotificationPayload,
};

/// Relay endpoint for new booking requests.
pub const BOOKING_REQUEST_ENDPOINT: &str = "booking-request";
/// Relay endpoint for confirm/reject decisions.
pub const BOOKING_STATUS_ENDPOINT: &str = "booking-status";

/// Best-effort side channel informed of booking transitions. Callers treat
/// every error as non-fatal.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn booking_requested(&self, relay: &BookingRequestedRelay) -> Result<(), DispatchError>;

    async fn booking_decided(&self, relay: &BookingDecidedRelay) -> Result<(), DispatchError>;

    /// Record an in-app notification for `recipient_id`.
    async fn notify(
        &self,
        recipient_id: Uuid,
        payload: NotificationPayload,
    ) -> Result<Notification, DispatchError>;
}

// ==============================================================================
// HTTP RELAY + POSTGREST
// ==============================================================================

pub struct HttpNotificationDispatcher {
    client: Client,
    relay_url: String,
    supabase: Arc<SupabaseClient>,
}

impl HttpNotificationDispatcher {
    pub fn new(config: &AppConfig, supabase: Arc<SupabaseClient>) -> Self {
        Self {
            client: Client::new(),
            relay_url: config.notification_relay_url.trim_end_matches('/').to_string(),
            supabase,
        }
    }

    async fn post_relay<T: Serialize + Sync>(&self, endpoint: &str, body: &T) -> Result<(), DispatchError> {
        if self.relay_url.is_empty() {
            return Err(DispatchError::NotConfigured);
        }

        let url = format!("{}/{}", self.relay_url, endpoint);
        debug!("Posting notification relay request to {}", url);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!("Notification relay failed: {} - {}", status, message);
            return Err(DispatchError::Rejected { status: status.as_u16(), message });
        }

        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for HttpNotificationDispatcher {
    async fn booking_requested(&self, relay: &BookingRequestedRelay) -> Result<(), DispatchError> {
        self.post_relay(BOOKING_REQUEST_ENDPOINT, relay).await?;
        info!("Relayed booking request {} to doctor {}", relay.booking_id, relay.doctor_id);
        Ok(())
    }

    async fn booking_decided(&self, relay: &BookingDecidedRelay) -> Result<(), DispatchError> {
        self.post_relay(BOOKING_STATUS_ENDPOINT, relay).await?;
        info!("Relayed booking {} status {}", relay.booking.id, relay.booking.status);
        Ok(())
    }

    async fn notify(
        &self,
        recipient_id: Uuid,
        payload: NotificationPayload,
    ) -> Result<Notification, DispatchError> {
        let body = json!({
            "recipient_id": recipient_id,
            "kind": payload.kind(),
            "payload": payload,
            "is_read": false,
        });

        let rows: Vec<Notification> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/notifications",
            Some(self.supabase.service_key()),
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        let notification = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Decode("notification insert returned no row".to_string()))?;

        info!("Recorded {} notification {} for {}", notification.kind, notification.id, recipient_id);
        Ok(notification)
    }
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

/// Keeps every relay call and notification in process.
#[derive(Default)]
pub struct InMemoryNotificationDispatcher {
    relayed: RwLock<Vec<(String, Value)>>,
    notifications: RwLock<HashMap<Uuid, Vec<Notification>>>,
}

impl InMemoryNotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relay calls so far as `(endpoint, body)`.
    pub async fn relayed(&self) -> Vec<(String, Value)> {
        self.relayed.read().await.clone()
    }

    pub async fn notifications_for(&self, recipient_id: Uuid) -> Vec<Notification> {
        self.notifications
            .read()
            .await
            .get(&recipient_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn record_relay<T: Serialize + Sync>(&self, endpoint: &str, body: &T) -> Result<(), DispatchError> {
        let value = serde_json::to_value(body).map_err(DbError::from)?;
        self.relayed.write().await.push((endpoint.to_string(), value));
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryNotificationDispatcher {
    async fn booking_requested(&self, relay: &BookingRequestedRelay) -> Result<(), DispatchError> {
        self.record_relay(BOOKING_REQUEST_ENDPOINT, relay).await
    }

    async fn booking_decided(&self, relay: &BookingDecidedRelay) -> Result<(), DispatchError> {
        self.record_relay(BOOKING_STATUS_ENDPOINT, relay).await
    }

    async fn notify(
        &self,
        recipient_id: Uuid,
        payload: NotificationPayload,
    ) -> Result<Notification, DispatchError> {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id,
            kind: payload.kind().to_string(),
            payload,
            is_read: false,
            created_at: Utc::now(),
        };

        self.notifications
            .write()
            .await
            .entry(recipient_id)
            .or_default()
            .push(notification.clone());

        Ok(notification)
    }
}
