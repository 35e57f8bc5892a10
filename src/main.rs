use std::collections::HashMap;
use std::sync::Arc;

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;

use scale_bench_lambda::config::{HandlerKind, HarnessConfig};
use scale_bench_lambda::handler::{direct_handler, proxy_handler};
use scale_bench_lambda::loader;
use scale_bench_lambda::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    // Load the reference image at cold start (once per container lifecycle).
    // A failure here does not stop the process; the first invocation does.
    let config = HarnessConfig::from_env();
    let state = Arc::new(loader::initialize(&config).await);

    match config.handler {
        HandlerKind::Proxy => {
            run(service_fn(move |event: LambdaEvent<Value>| {
                let state = Arc::clone(&state);
                async move { proxy_handler(&state, event).await }
            }))
            .await
        }
        HandlerKind::Direct => {
            run(service_fn(move |event: LambdaEvent<HashMap<String, Value>>| {
                let state = Arc::clone(&state);
                async move { direct_handler(&state, event).await }
            }))
            .await
        }
    }
}
