use std::sync::Arc;

use crate::services::file_intake::FileIntake;
use crate::services::notifications::{NotificationQueue, NotificationService};
use crate::services::notifier::Notifier;
use crate::services::storage::PaymentStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PaymentStore>,
    pub intake: Arc<FileIntake>,
    pub notifications: Arc<NotificationService>,
    pub queue: NotificationQueue,
    pub port: u16,
}

impl AppState {
    /// Wires the services together and starts the background notification worker.
    pub fn new(
        store: Arc<dyn PaymentStore>,
        intake: FileIntake,
        notifier: Notifier,
        port: u16,
    ) -> Self {
        let notifications = Arc::new(NotificationService::new(store.clone(), Arc::new(notifier)));
        let queue = NotificationQueue::spawn(notifications.clone());

        AppState {
            store,
            intake: Arc::new(intake),
            notifications,
            queue,
            port,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        self.notifications.notifier()
    }
}
