//! Mock signer and intent store for tests.

use super::{ExecutionRequest, IntentStore, Signer, SignerError, StrategyIntent};
use crate::domain::Address;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Mock signer with a scripted outcome queue.
///
/// Outcomes are consumed front-to-back; when the queue runs dry every
/// submission succeeds. All accepted requests are recorded for inspection.
#[derive(Debug, Default)]
pub struct MockSigner {
    outcomes: Mutex<VecDeque<Result<String, SignerError>>>,
    submissions: Mutex<Vec<ExecutionRequest>>,
}

impl MockSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next submission.
    pub fn push_failure(&self, error: SignerError) {
        self.outcomes.lock().unwrap().push_back(Err(error));
    }

    /// Queue a success returning `tx_hash`.
    pub fn push_success(&self, tx_hash: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Ok(tx_hash.to_string()));
    }

    /// Every request the signer has seen, in order.
    pub fn submissions(&self) -> Vec<ExecutionRequest> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Signer for MockSigner {
    async fn submit(&self, request: &ExecutionRequest) -> Result<String, SignerError> {
        self.submissions.lock().unwrap().push(request.clone());
        match self.outcomes.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(format!("0xtx_{}", request.idempotency_key)),
        }
    }
}

/// Mock intent store returning a fixed intent.
#[derive(Debug, Default)]
pub struct MockIntentStore {
    intent: Option<StrategyIntent>,
}

impl MockIntentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_intent(mut self, intent: StrategyIntent) -> Self {
        self.intent = Some(intent);
        self
    }
}

#[async_trait]
impl IntentStore for MockIntentStore {
    async fn current_intent(&self, _owner: &Address) -> Option<StrategyIntent> {
        self.intent.clone()
    }
}
