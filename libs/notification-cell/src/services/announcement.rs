// libs/notification-cell/src/services/announcement.rs
use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{AnnouncementReport, AnnouncementRequest, DispatchError, FailedDelivery, NotificationPayload};
use crate::services::dispatcher::NotificationDispatcher;

const MAX_RECIPIENTS: usize = 1_000;
const MAX_TITLE_LEN: usize = 200;

pub struct AnnouncementService {
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl AnnouncementService {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Send an `admin_announcement` to every recipient. Deliveries are
    /// independent; one failure does not stop the rest.
    pub async fn announce(&self, request: AnnouncementRequest) -> Result<AnnouncementReport, DispatchError> {
        let title = request.title.trim();
        let message = request.message.trim();

        if title.is_empty() || message.is_empty() {
            return Err(DispatchError::Validation("title and message are required".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(DispatchError::Validation(format!(
                "title must be at most {} characters", MAX_TITLE_LEN
            )));
        }

        let recipients: BTreeSet<Uuid> = request.recipients.into_iter().filter(|id| !id.is_nil()).collect();
        if recipients.is_empty() {
            return Err(DispatchError::Validation("at least one recipient is required".to_string()));
        }
        if recipients.len() > MAX_RECIPIENTS {
            return Err(DispatchError::Validation(format!(
                "at most {} recipients per announcement", MAX_RECIPIENTS
            )));
        }

        let mut report = AnnouncementReport::default();
        for recipient_id in recipients {
            let payload = NotificationPayload::AdminAnnouncement {
                title: title.to_string(),
                message: message.to_string(),
            };

            match self.dispatcher.notify(recipient_id, payload).await {
                Ok(_) => report.delivered.push(recipient_id),
                Err(e) => {
                    warn!("Announcement to {} failed: {}", recipient_id, e);
                    report.failed.push(FailedDelivery { recipient_id, error: e.to_string() });
                }
            }
        }

        info!("Announcement '{}' delivered to {} recipients, {} failed",
              title, report.delivered.len(), report.failed.len());
        Ok(report)
    }
}
