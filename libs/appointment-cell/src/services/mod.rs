pub mod booking;
pub mod conflict;
pub mod feedback;
pub mod lifecycle;
pub mod payment;

pub use booking::BookingService;
pub use conflict::ConflictArbiter;
pub use feedback::FeedbackService;
pub use lifecycle::BookingLifecycleService;
pub use payment::{HttpPaymentGate, PaymentGate, PaymentService};
