use std::collections::HashMap;

use lambda_runtime::{Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::ProcessState;
use crate::workload::{InvocationOutcome, LINE_SEPARATOR};

// API Gateway proxy integration response
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

pub const STATUS_OK: u16 = 200;
pub const STATUS_UNAVAILABLE: u16 = 503;

// Map an outcome onto the proxy envelope; body is itself a JSON document
pub fn to_proxy_response(outcome: &InvocationOutcome) -> Result<ProxyResponse, serde_json::Error> {
    let (status_code, message) = match outcome {
        InvocationOutcome::Success { elapsed_nanos } => (STATUS_OK, elapsed_nanos.to_string()),
        InvocationOutcome::Failure { descriptor } => {
            (STATUS_UNAVAILABLE, format!("{descriptor}{LINE_SEPARATOR}"))
        }
    };

    Ok(ProxyResponse {
        status_code,
        body: serde_json::to_string(&MessageBody { message })?,
    })
}

// No status channel here: callers tell failures apart by the string not
// parsing as an integer
pub fn to_direct_response(outcome: &InvocationOutcome) -> String {
    match outcome {
        InvocationOutcome::Success { elapsed_nanos } => elapsed_nanos.to_string(),
        InvocationOutcome::Failure { descriptor } => format!("{descriptor}{LINE_SEPARATOR}"),
    }
}

// A process whose cold start failed must never serve an invocation
fn terminate_failed_process() -> ! {
    tracing::error!("Initialization failed earlier, exiting before serving the invocation");
    std::process::exit(1)
}

fn invoke(state: &ProcessState) -> InvocationOutcome {
    let runner = match state.runner() {
        Some(runner) => runner,
        None => terminate_failed_process(),
    };

    let outcome = runner.run();
    if let InvocationOutcome::Success { elapsed_nanos } = outcome {
        tracing::info!(elapsed_nanos, "Workload completed");
    }
    outcome
}

// Stream/proxy style entry point; the request envelope is ignored
pub async fn proxy_handler(state: &ProcessState, event: LambdaEvent<Value>) -> Result<ProxyResponse, Error> {
    tracing::debug!(request_id = %event.context.request_id, "Proxy invocation");
    let outcome = invoke(state);
    Ok(to_proxy_response(&outcome)?)
}

// Direct style entry point; the key/value request is ignored
pub async fn direct_handler(
    state: &ProcessState,
    event: LambdaEvent<HashMap<String, Value>>,
) -> Result<String, Error> {
    tracing::debug!(request_id = %event.context.request_id, "Direct invocation");
    let outcome = invoke(state);
    Ok(to_direct_response(&outcome))
}
