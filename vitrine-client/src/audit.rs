//! Fire-and-forget audit channel.
//!
//! Mirrors state-changing actions to the audit endpoint on a side channel.
//! Failures degrade observability, not correctness, so this is the only
//! component permitted silent failure: errors are logged and swallowed,
//! and `record` never blocks or throws back into the caller's flow.

use crate::remote::RemoteClient;
use tokio::sync::mpsc;
use vitrine_core::AuditRecord;

/// Best-effort audit emitter.
///
/// Records are enqueued without waiting and drained by a background task
/// that POSTs them one at a time. Dropping every clone of the emitter
/// closes the channel and lets the drain task finish its backlog and exit.
#[derive(Clone)]
pub struct AuditEmitter {
    tx: Option<mpsc::UnboundedSender<AuditRecord>>,
}

impl AuditEmitter {
    /// Spawn the drain task and return the emitter handle.
    pub fn spawn(client: RemoteClient) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditRecord>();
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(err) = client.send_audit(&record).await {
                    tracing::warn!(
                        action = %record.action,
                        target = %record.target_id,
                        error = %err,
                        "audit record dropped"
                    );
                }
            }
        });
        Self { tx: Some(tx) }
    }

    /// An emitter that discards every record (audit disabled in config).
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Enqueue a record. Never blocks, never fails the caller.
    pub fn record(&self, record: AuditRecord) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(record).is_err() {
            tracing::warn!("audit drain task gone; record dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::StaticTokenProvider;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn emitter_for(server: &MockServer) -> AuditEmitter {
        let tokens = Arc::new(StaticTokenProvider::new(None));
        let client =
            RemoteClient::with_timeout(&server.uri(), Duration::from_secs(2), tokens).unwrap();
        AuditEmitter::spawn(client)
    }

    #[tokio::test]
    async fn test_records_are_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let emitter = emitter_for(&server);
        emitter.record(AuditRecord::new("like", "product", "42", Some("u1".to_string())));

        // Drain task runs in the background; give it a beat before the
        // mock server verifies expectations on drop.
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn test_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audit"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let emitter = emitter_for(&server);
        // Must not panic or surface anything to the caller.
        emitter.record(AuditRecord::new("like", "product", "42", Some("u1".to_string())));
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn test_disabled_emitter_is_inert() {
        let emitter = AuditEmitter::disabled();
        emitter.record(AuditRecord::new("view", "product", "7", None));
    }
}
