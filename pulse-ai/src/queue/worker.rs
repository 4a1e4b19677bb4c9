//! Worker loop
//!
//! Each worker claims the next operation, calls the provider under the
//! operation's own timeout and commits the outcome unless the operation was
//! cancelled meanwhile.

use super::{AiOperation, OperationQueue};
use crate::prompts::build_prompt;
use crate::provider::CompletionParams;
use tracing::{debug, warn};

impl OperationQueue {
    pub(super) async fn run_worker(&self, worker_id: usize) {
        debug!(worker_id, "Worker started");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            if let Some(operation) = self.claim_next().await {
                self.execute(worker_id, operation).await;
                continue;
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.work_available.notified() => {}
            }
        }
        debug!(worker_id, "Worker stopped");
    }

    async fn execute(&self, worker_id: usize, operation: AiOperation) {
        let prompt = build_prompt(
            operation.operation_type,
            &operation.input,
            operation.context.as_ref(),
            &operation.difficulty_weights,
        );
        let params = CompletionParams::from(&operation.settings);
        let timeout = operation.settings.operation_timeout();

        debug!(
            worker_id,
            operation_id = %operation.id,
            model = %params.model,
            timeout_s = timeout.as_secs(),
            "Calling provider"
        );

        let outcome = tokio::select! {
            _ = operation.cancel_token.cancelled() => {
                debug!(operation_id = %operation.id, "Cancelled while running, dropping provider call");
                return;
            }
            _ = self.shutdown.cancelled() => {
                Err("Service stopped before the operation finished".to_string())
            }
            result = tokio::time::timeout(timeout, self.provider.complete(&prompt, &params)) => {
                match result {
                    Ok(Ok(text)) => Ok(text),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("Operation timed out after {} seconds", timeout.as_secs())),
                }
            }
        };

        if !self.finish(operation.id, outcome).await {
            warn!(operation_id = %operation.id, "Discarded result of an operation that is no longer running");
        }
    }
}
