pub mod announcement;
pub mod dispatcher;

pub use announcement::AnnouncementService;
pub use dispatcher::NotificationDispatcher;
