use std::sync::Arc;

use tracing::info;

use appointment_cell::handlers::AppointmentCellState;
use appointment_cell::services::{BookingService, FeedbackService, HttpPaymentGate, PaymentService};
use appointment_cell::store::{BookingStore, InMemoryBookingStore, SupabaseBookingStore};
use doctor_cell::handlers::DoctorCellState;
use doctor_cell::services::{AvailabilityService, SlotGenerator, SlotGridConfig};
use doctor_cell::store::{
    AvailabilityStore, InMemoryAvailabilityStore, InMemoryScoreStore, ScoreStore,
    SupabaseAvailabilityStore, SupabaseScoreStore,
};
use notification_cell::handlers::NotificationCellState;
use notification_cell::services::dispatcher::{HttpNotificationDispatcher, InMemoryNotificationDispatcher};
use notification_cell::services::{AnnouncementService, NotificationDispatcher};
use shared_config::{AppConfig, StorageBackend};
use shared_database::SupabaseClient;

use crate::router::CellStates;

struct Stores {
    availability: Arc<dyn AvailabilityStore>,
    scores: Arc<dyn ScoreStore>,
    bookings: Arc<dyn BookingStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

fn stores(config: &AppConfig) -> Stores {
    match config.storage_backend {
        StorageBackend::Supabase => {
            info!("Using PostgREST storage at {}", config.supabase_url);
            let supabase = Arc::new(SupabaseClient::new(config));
            Stores {
                availability: Arc::new(SupabaseAvailabilityStore::new(supabase.clone())),
                scores: Arc::new(SupabaseScoreStore::new(supabase.clone())),
                bookings: Arc::new(SupabaseBookingStore::new(supabase.clone())),
                dispatcher: Arc::new(HttpNotificationDispatcher::new(config, supabase)),
            }
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; records are lost on restart");
            Stores {
                availability: Arc::new(InMemoryAvailabilityStore::new()),
                scores: Arc::new(InMemoryScoreStore::new()),
                bookings: Arc::new(InMemoryBookingStore::new()),
                dispatcher: Arc::new(InMemoryNotificationDispatcher::new()),
            }
        }
    }
}

pub fn build_states(config: Arc<AppConfig>) -> CellStates {
    let stores = stores(&config);

    let generator = SlotGenerator::new(SlotGridConfig::default())
        .with_host_timezone(config.host_timezone.clone());
    let availability = Arc::new(AvailabilityService::new(stores.availability, generator));

    let bookings = Arc::new(BookingService::new(
        stores.bookings.clone(),
        availability.clone(),
        stores.dispatcher.clone(),
    ));
    let payments = Arc::new(PaymentService::new(
        stores.bookings.clone(),
        Arc::new(HttpPaymentGate::new(&config)),
        stores.dispatcher.clone(),
        config.server_url.clone(),
    ));
    let feedback = Arc::new(FeedbackService::new(stores.bookings, stores.scores.clone()));

    CellStates {
        doctors: Arc::new(DoctorCellState {
            config: config.clone(),
            availability,
            scores: stores.scores,
        }),
        bookings: Arc::new(AppointmentCellState {
            config: config.clone(),
            bookings,
            payments,
            feedback,
        }),
        notifications: Arc::new(NotificationCellState {
            config,
            announcements: Arc::new(AnnouncementService::new(stores.dispatcher)),
        }),
    }
}
