// libs/appointment-cell/src/services/payment.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use notification_cell::models::{DispatchError, NotificationPayload};
use notification_cell::services::NotificationDispatcher;
use shared_config::AppConfig;

use crate::models::{Booking, BookingAction, BookingError, BookingOutcome, BookingStatus, DispatchStatus, PaymentInitiation};
use crate::services::lifecycle::BookingLifecycleService;
use crate::store::{BookingGuard, BookingPatch, BookingStore};

/// Body sent to the payment initializer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentInitRequest {
    pub amount: f64,
    #[serde(rename = "bookingId")]
    pub booking_id: Uuid,
    pub description: String,
    #[serde(rename = "patientId")]
    pub patient_id: Uuid,
    #[serde(rename = "doctorName")]
    pub doctor_name: String,
    pub server_url: String,
}

/// Starts an out-of-band checkout and hands back whatever the provider
/// returns for the client to follow.
#[async_trait]
pub trait PaymentGate: Send + Sync {
    async fn initiate(&self, request: &PaymentInitRequest) -> Result<Value, DispatchError>;
}

pub struct HttpPaymentGate {
    client: Client,
    url: String,
}

impl HttpPaymentGate {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            url: config.payment_init_url.clone(),
        }
    }
}

#[async_trait]
impl PaymentGate for HttpPaymentGate {
    async fn initiate(&self, request: &PaymentInitRequest) -> Result<Value, DispatchError> {
        if self.url.is_empty() {
            return Err(DispatchError::NotConfigured);
        }

        debug!("Initiating payment for booking {} at {}", request.booking_id, self.url);

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("Payment initiation failed: {} - {}", status, response_text);
            return Err(DispatchError::Rejected { status: status.as_u16(), message: response_text });
        }

        // Non-JSON bodies are passed through as a string.
        Ok(serde_json::from_str(&response_text).unwrap_or(Value::String(response_text)))
    }
}

pub struct PaymentService {
    bookings: Arc<dyn BookingStore>,
    gate: Arc<dyn PaymentGate>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    server_url: String,
    lifecycle: BookingLifecycleService,
}

impl PaymentService {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        gate: Arc<dyn PaymentGate>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        server_url: String,
    ) -> Self {
        Self {
            bookings,
            gate,
            dispatcher,
            server_url,
            lifecycle: BookingLifecycleService::new(),
        }
    }

    async fn load(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))
    }

    /// Ask the payment initializer for a checkout. Nothing on the booking
    /// changes here; `mark_paid` records the result later.
    pub async fn initiate_payment(
        &self,
        booking_id: Uuid,
        doctor_name: Option<String>,
    ) -> Result<PaymentInitiation, BookingError> {
        let booking = self.load(booking_id).await?;
        self.lifecycle.validate_payment_initiation(&booking)?;

        let request = PaymentInitRequest {
            amount: booking.amount,
            booking_id: booking.id,
            description: format!(
                "Consultation on {} at {} UTC ({} min)",
                booking.booking_date, booking.booking_time_slot, booking.consultation_duration_minutes
            ),
            patient_id: booking.patient_id,
            doctor_name: doctor_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "Doctor".to_string()),
            server_url: self.server_url.clone(),
        };

        let payment = self.gate.initiate(&request).await.map_err(|e| {
            warn!("Payment initiation for booking {} failed: {}", booking_id, e);
            BookingError::ExternalDispatch(e.to_string())
        })?;

        info!("Payment initiated for booking {} ({})", booking_id, booking.amount);
        Ok(PaymentInitiation { booking_id, payment })
    }

    pub async fn mark_paid(&self, booking_id: Uuid) -> Result<BookingOutcome, BookingError> {
        let booking = self.load(booking_id).await?;
        self.lifecycle.validate_mark_paid(&booking)?;

        let guard = BookingGuard::status(BookingStatus::Confirmed).paid(false);
        let patch = BookingPatch { is_paid: Some(true), ..BookingPatch::default() };

        let booking = match self.bookings.update_where(booking_id, &guard, &patch).await? {
            Some(updated) => updated,
            None => {
                let current = self.load(booking_id).await?;
                return Err(BookingError::invalid_transition(&current, BookingAction::MarkPaid));
            }
        };

        info!("Booking {} marked as paid", booking.id);

        let payload = NotificationPayload::PaymentSuccess { booking_id: booking.id, amount: booking.amount };
        let dispatch = DispatchStatus::from_result(self.dispatcher.notify(booking.patient_id, payload).await);
        if dispatch.is_failed() {
            warn!("Booking {} paid but the patient was not notified: {:?}", booking.id, dispatch);
        }

        Ok(BookingOutcome { booking, dispatch })
    }
}
