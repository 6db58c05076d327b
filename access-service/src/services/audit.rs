//! Fire-and-forget audit trail for decisions and session events.

use std::sync::Arc;

use crate::models::AuditRecord;

use super::store::AuditSink;

#[derive(Clone)]
pub struct AuditEmitter {
    sink: Arc<dyn AuditSink>,
}

impl AuditEmitter {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Log the record and hand it to the sink on a background task.
    /// Sink failures are logged and never reach the caller.
    pub fn emit(&self, record: AuditRecord) {
        if record.allowed {
            tracing::info!(
                event = record.event.as_str(),
                user_id = ?record.principal_id,
                resource = %record.resource_name,
                action = %record.action,
                policy = %record.policy_name,
                "Access granted"
            );
        } else {
            tracing::warn!(
                event = record.event.as_str(),
                user_id = ?record.principal_id,
                resource = %record.resource_name,
                action = %record.action,
                policy = %record.policy_name,
                reason = %record.reason,
                "Access denied"
            );
        }

        metrics::counter!(
            "access_audit_events_total",
            "event" => record.event.as_str(),
            "decision" => record.decision_label()
        )
        .increment(1);

        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.record(&record).await {
                tracing::error!(
                    error = %e,
                    event = record.event.as_str(),
                    "Failed to write audit record"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditEventKind, RequestOrigin};
    use crate::services::store::RecordingAuditSink;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn record() -> AuditRecord {
        AuditRecord::event(
            AuditEventKind::Login,
            Some(1),
            None,
            "session",
            true,
            "password",
            "credentials accepted",
            &RequestOrigin::new("POST", "/auth/login", None),
        )
    }

    #[tokio::test]
    async fn records_reach_the_sink() {
        let sink = Arc::new(RecordingAuditSink::new());
        let emitter = AuditEmitter::new(sink.clone());
        emitter.emit(record());

        for _ in 0..50 {
            if !sink.snapshot().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn sink_failure_does_not_propagate() {
        let sink = Arc::new(RecordingAuditSink::new());
        sink.failing.store(true, Ordering::SeqCst);
        let emitter = AuditEmitter::new(sink.clone());
        emitter.emit(record());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sink.snapshot().is_empty());
    }
}
