//! Verdict trigger
//!
//! After a session ends, the verification agent records an accept or
//! reject decision with remarks. The trigger enforces the
//! preconditions (session ended, remarks non-empty, at most one
//! handoff per session) and then makes a single call to the external
//! decision-persistence collaborator. Retry and idempotency are that
//! collaborator's responsibility, not ours. A missing captured
//! artifact is a degraded-but-valid path: the handoff proceeds with no
//! artifact reference.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use vkyc_signal_core::DurableId;

use crate::error::{SessionError, SessionResult};
use crate::identity::OnceLatch;

/// The business decision for a verification case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

/// Reference to an artifact held by the external document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef(pub String);

/// Metadata for a moment-in-time capture taken during an active
/// session. The bytes themselves live with the external store; only
/// presence matters here.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedArtifact {
    pub reference: ArtifactRef,
    pub mime_type: String,
    pub captured_at: DateTime<Utc>,
    pub bytes_len: usize,
}

/// The recorded decision handed to the external collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub decision: Decision,
    pub remarks: String,
    pub artifact_ref: Option<ArtifactRef>,
}

/// External decision-persistence collaborator.
#[async_trait]
pub trait VerdictSink: Send + Sync {
    /// Persist the verdict for a case. Called at most once per session;
    /// not retried by this core.
    async fn submit_verdict(&self, durable_id: &DurableId, verdict: Verdict) -> SessionResult<()>;
}

/// Sink that drops verdicts, for endpoints that never judge (the
/// customer side).
pub struct NullVerdictSink;

#[async_trait]
impl VerdictSink for NullVerdictSink {
    async fn submit_verdict(&self, durable_id: &DurableId, _verdict: Verdict) -> SessionResult<()> {
        warn!(%durable_id, "verdict discarded by null sink");
        Ok(())
    }
}

/// Guards the single handoff for one session.
#[derive(Debug, Default)]
pub struct VerdictTrigger {
    latch: OnceLatch,
}

impl VerdictTrigger {
    pub fn new() -> Self {
        Self {
            latch: OnceLatch::new(),
        }
    }

    pub fn has_fired(&self) -> bool {
        self.latch.is_fired()
    }

    /// Validate preconditions and hand the verdict off exactly once.
    pub async fn fire(
        &self,
        sink: &dyn VerdictSink,
        durable_id: &DurableId,
        decision: Decision,
        remarks: &str,
        artifact: Option<&CapturedArtifact>,
    ) -> SessionResult<()> {
        if remarks.trim().is_empty() {
            return Err(SessionError::EmptyRemarks);
        }
        if !self.latch.fire() {
            return Err(SessionError::VerdictAlreadySubmitted);
        }

        let artifact_ref = match artifact {
            Some(captured) => Some(captured.reference.clone()),
            None => {
                warn!(%durable_id, "no artifact captured during session, submitting verdict without one");
                None
            }
        };

        let verdict = Verdict {
            decision,
            remarks: remarks.to_string(),
            artifact_ref,
        };
        info!(%durable_id, ?decision, "handing verdict to decision persistence");
        sink.submit_verdict(durable_id, verdict).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        submitted: Mutex<Vec<(DurableId, Verdict)>>,
    }

    #[async_trait]
    impl VerdictSink for RecordingSink {
        async fn submit_verdict(
            &self,
            durable_id: &DurableId,
            verdict: Verdict,
        ) -> SessionResult<()> {
            self.submitted.lock().push((durable_id.clone(), verdict));
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_remarks_are_rejected_before_handoff() {
        let sink = RecordingSink::default();
        let trigger = VerdictTrigger::new();
        let case = DurableId::from("CASE-1");

        let err = trigger
            .fire(&sink, &case, Decision::Accept, "   ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::EmptyRemarks));
        assert!(sink.submitted.lock().is_empty());
        // a rejected precondition does not consume the single shot
        assert!(!trigger.has_fired());
    }

    #[tokio::test]
    async fn fires_at_most_once_per_session() {
        let sink = RecordingSink::default();
        let trigger = VerdictTrigger::new();
        let case = DurableId::from("CASE-1");

        trigger
            .fire(&sink, &case, Decision::Accept, "looks valid", None)
            .await
            .unwrap();
        let err = trigger
            .fire(&sink, &case, Decision::Reject, "second thoughts", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::VerdictAlreadySubmitted));

        let submitted = sink.submitted.lock();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].1.remarks, "looks valid");
        assert_eq!(submitted[0].1.artifact_ref, None);
    }

    #[tokio::test]
    async fn missing_artifact_is_degraded_but_valid() {
        let sink = RecordingSink::default();
        let trigger = VerdictTrigger::new();
        let case = DurableId::from("CASE-2");
        let artifact = CapturedArtifact {
            reference: ArtifactRef("doc-17".into()),
            mime_type: "image/png".into(),
            captured_at: Utc::now(),
            bytes_len: 2048,
        };

        trigger
            .fire(&sink, &case, Decision::Reject, "face mismatch", Some(&artifact))
            .await
            .unwrap();
        let submitted = sink.submitted.lock();
        assert_eq!(
            submitted[0].1.artifact_ref,
            Some(ArtifactRef("doc-17".into()))
        );
    }
}
