//! Background tasks that persist reconciliation events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::domain::EventBus;
use crate::persistence::EventLog;

/// Spawns a task appending every bus event to `log`.
///
/// The task ends when the bus is dropped. Lagged events are lost and
/// logged.
#[must_use]
pub fn spawn_event_recorder(bus: &EventBus, log: Arc<dyn EventLog>) -> JoinHandle<()> {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(err) = log.append(&event).await {
                        tracing::error!(
                            event_type = event.event_type_str(),
                            transaction_id = %event.transaction_id(),
                            error = %err,
                            "failed to record reconciliation event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event recorder lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Spawns a task deleting events older than `retention_days`, once per
/// `every`.
#[must_use]
pub fn spawn_event_cleanup(
    log: Arc<dyn EventLog>,
    retention_days: u64,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match log.delete_older_than(retention_days).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, retention_days, "old events deleted"),
                Err(err) => tracing::error!(error = %err, "event cleanup failed"),
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::domain::{ReconciliationEvent, TransactionId, TransactionStatus, UserId};
    use crate::persistence::InMemoryPersistence;

    #[tokio::test]
    async fn recorder_persists_published_events() {
        let store = Arc::new(InMemoryPersistence::new());
        let bus = EventBus::new(16);
        let handle = spawn_event_recorder(&bus, Arc::clone(&store) as Arc<dyn EventLog>);

        bus.publish(ReconciliationEvent::TransactionInserted {
            transaction_id: TransactionId::new("o1"),
            user_id: UserId::new("user-1"),
            status: TransactionStatus::Pending,
            timestamp: Utc::now(),
        });
        drop(bus);

        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(matches!(joined, Ok(Ok(()))));

        let events = store.events().await;
        assert_eq!(events.len(), 1);
        let Some(first) = events.first() else {
            panic!("one event expected");
        };
        assert_eq!(first.event_type, "transaction_inserted");
        assert_eq!(first.transaction_id, "o1");
    }
}
