use super::service::{KnowledgeService, Operation};
use super::KbError;
use log::debug;
use std::time::Duration;

/// Delay between operation status polls.
pub const OPERATION_POLL_DELAY: Duration = Duration::from_secs(5);

/// Poll attempts while the operation reports NotStarted/Running.
pub const OPERATION_POLL_RETRIES: usize = 10;

/// Terminal outcome of a monitored knowledge service operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Operation succeeded; carries the resource location of the result.
    Succeeded(String),
    /// Operation reached a terminal state other than success.
    Failed(String),
    /// Operation was still pending after the last allowed poll.
    TimedOut,
}

/// Polls an operation with a fixed delay and bounded retry count until it
/// leaves the pending states, and maps the terminal state to an outcome.
pub async fn await_operation(
    service: &dyn KnowledgeService,
    mut operation: Operation,
    delay: Duration,
    retries: usize,
) -> Result<OperationOutcome, KbError> {
    for attempt in 0..retries {
        if !operation.operation_state.is_pending() {
            break;
        }
        debug!(
            "operation {} pending ({:?}), poll {}/{}",
            operation.operation_id,
            operation.operation_state,
            attempt + 1,
            retries
        );
        tokio::time::sleep(delay).await;
        operation = service.get_operation(&operation.operation_id).await?;
    }

    if operation.operation_state.is_pending() {
        return Ok(OperationOutcome::TimedOut);
    }

    match operation.operation_state {
        super::service::OperationState::Succeeded => {
            let location = operation.resource_location.unwrap_or_default();
            Ok(OperationOutcome::Succeeded(location))
        }
        state => Ok(OperationOutcome::Failed(
            operation
                .error_message
                .unwrap_or_else(|| format!("operation ended in state {state:?}")),
        )),
    }
}
