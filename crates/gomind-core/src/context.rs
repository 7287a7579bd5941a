//! Per-request execution context: cancellation, deadline, and HITL baggage.
//!
//! "Resume mode" is carried here rather than as global state, so nested HITL
//! checks deep inside the executor can consult it the same way they consult
//! trace baggage (§4.9, §9 design notes).

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Key identifying one HITL check point: its kind plus the step it guards
/// (absent for plan-level checks).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResumePointKey {
    pub point: crate::checkpoint::InterruptPoint,
    pub step_id: Option<String>,
}

/// Request-scoped execution context threaded through planner, binder,
/// executor and HITL controller.
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub original_request_id: String,
    pub trace_id: Option<String>,
    cancel: CancellationToken,
    /// Check points that must be skipped because this run resumes a
    /// checkpoint already approved at that exact point (§8 invariant 10).
    resume_skip: Arc<HashSet<ResumePointKey>>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        Self {
            original_request_id: request_id.clone(),
            request_id,
            trace_id: None,
            cancel: CancellationToken::new(),
            resume_skip: Arc::new(HashSet::new()),
        }
    }

    /// Builds a resumed context: the original_request_id is preserved
    /// (§8 invariant 11) across however many resumes occur.
    pub fn resumed(
        new_request_id: impl Into<String>,
        original_request_id: impl Into<String>,
        trace_id: Option<String>,
        resume_skip: HashSet<ResumePointKey>,
    ) -> Self {
        Self {
            request_id: new_request_id.into(),
            original_request_id: original_request_id.into(),
            trace_id,
            cancel: CancellationToken::new(),
            resume_skip: Arc::new(resume_skip),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True if an HITL check at this exact point+step should be skipped
    /// because the resumed checkpoint already approved it.
    pub fn should_skip_hitl(&self, key: &ResumePointKey) -> bool {
        self.resume_skip.contains(key)
    }
}
