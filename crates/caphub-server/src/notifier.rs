//! Notification channel — push events for one session.
//!
//! Every send resolves the session's bound push channel at call time.
//! Missing sessions, missing channels and write failures all report
//! `false` and never error.

use std::sync::Arc;

use caphub_protocol::{ProgressSnapshot, PushEvent};
use caphub_transport::PushChannel;
use tracing::{debug, warn};

use crate::manager::SessionServerManager;

#[derive(Clone)]
pub struct NotificationChannel {
    manager: Arc<SessionServerManager>,
}

impl NotificationChannel {
    pub fn new(manager: Arc<SessionServerManager>) -> Self {
        Self { manager }
    }

    /// Record the progress on the session and push it if a channel is bound.
    pub fn send_progress(
        &self,
        session_id: &str,
        stage: &str,
        percent: f64,
        message: &str,
    ) -> bool {
        let snapshot = ProgressSnapshot::new(stage, percent, message);
        let event = PushEvent::progress(snapshot.clone());
        let channel = self.manager.store().set_progress(session_id, snapshot);
        deliver(session_id, channel, &event)
    }

    pub fn send_notification(&self, session_id: &str, message: &str) -> bool {
        let channel = self.manager.store().channel(session_id);
        deliver(session_id, channel, &PushEvent::notification(message))
    }

    /// Push the terminal event, then end the session whatever the outcome.
    pub fn send_complete(&self, session_id: &str, success: bool, error: Option<String>) -> bool {
        let channel = self.manager.store().channel(session_id);
        let delivered = deliver(session_id, channel, &PushEvent::complete(success, error));
        self.manager.close(session_id);
        delivered
    }
}

fn deliver(session_id: &str, channel: Option<PushChannel>, event: &PushEvent) -> bool {
    let Some(channel) = channel else {
        debug!("Session {session_id}: no listen channel, event dropped");
        return false;
    };
    match channel.send(event) {
        Ok(()) => true,
        Err(e) => {
            warn!("Session {session_id}: push failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use caphub_capabilities::default_registry;
    use caphub_transport::push_channel;
    use serde_json::Value;

    use super::*;
    use crate::store::SessionStore;

    fn notifier() -> (NotificationChannel, Arc<SessionServerManager>) {
        let registry = Arc::new(default_registry().unwrap());
        let manager = SessionServerManager::new(registry, Arc::new(SessionStore::new()));
        (NotificationChannel::new(manager.clone()), manager)
    }

    #[tokio::test]
    async fn events_arrive_in_call_order() {
        let (notifier, manager) = notifier();
        let (channel, mut rx) = push_channel();
        manager.store().get_or_create("s", Some(channel), None);

        assert!(notifier.send_progress("s", "start", 10.0, "starting"));
        assert!(notifier.send_notification("s", "hello"));
        assert!(notifier.send_progress("s", "end", 100.0, "done"));

        let first: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        let second: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        let third: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["stage"], "start");
        assert_eq!(second["type"], "notification");
        assert_eq!(third["percent"], 100.0);
        assert_eq!(manager.store().last_progress("s").unwrap().stage, "end");
    }

    #[test]
    fn no_channel_reports_failure() {
        let (notifier, manager) = notifier();
        assert!(!notifier.send_notification("missing", "x"));
        manager.store().get_or_create("s", None, None);
        assert!(!notifier.send_progress("s", "stage", 5.0, "m"));
        // Late pollers still see the snapshot.
        assert_eq!(manager.store().last_progress("s").unwrap().percent, 5.0);
    }

    #[tokio::test]
    async fn completion_ends_the_session() {
        let (notifier, manager) = notifier();
        let (channel, mut rx) = push_channel();
        manager.store().get_or_create("s", Some(channel), None);
        manager.get_or_create("s");

        assert!(notifier.send_complete("s", true, None));
        assert!(manager.store().get("s").is_none());
        assert!(manager.get("s").is_none());
        assert!(!notifier.send_progress("s", "late", 1.0, "too late"));

        let event: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(event["type"], "complete");
        assert_eq!(event["success"], true);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn failed_completion_still_ends_the_session() {
        let (notifier, manager) = notifier();
        manager.store().get_or_create("s", None, None);
        manager.get_or_create("s");
        assert!(!notifier.send_complete("s", false, Some("boom".into())));
        assert!(manager.store().get("s").is_none());
        assert!(manager.is_empty());
    }
}
