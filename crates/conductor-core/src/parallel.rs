//! The deferred-effect pair for parallel execution: each sub-step
//! contributes a `call` (the async side effect, dispatched concurrently)
//! and an `apply` (a pure fold applied serially, in submission order,
//! once every call has settled). A single failing call discards the whole
//! group — there is no partial success.

use futures::future::BoxFuture;

use crate::error::ConductorError;
use crate::registry::AgentResponse;

type CallResult = crate::error::ConductorResult<AgentResponse>;

pub struct DeferredEffect<S> {
    pub call: Box<dyn FnOnce() -> BoxFuture<'static, CallResult> + Send>,
    pub apply: Box<dyn FnOnce(AgentResponse, S) -> S + Send>,
}

/// Dispatches every `call` concurrently (exactly `effects.len()`
/// in-flight, never more, never fewer), then folds the responses into
/// `state` serially in the order the effects were submitted — regardless
/// of which call actually finished first.
pub async fn execute_parallel_group<S: Send + 'static>(
    effects: Vec<DeferredEffect<S>>,
    mut state: S,
) -> crate::error::ConductorResult<S> {
    let mut applies = Vec::with_capacity(effects.len());
    let mut handles = Vec::with_capacity(effects.len());
    for effect in effects {
        applies.push(effect.apply);
        handles.push(tokio::spawn((effect.call)()));
    }

    let mut responses = Vec::with_capacity(handles.len());
    for handle in handles {
        let response = handle
            .await
            .map_err(|e| ConductorError::Fatal(format!("agent task panicked: {e}")))??;
        responses.push(response);
    }

    for (apply, response) in applies.into_iter().zip(responses.into_iter()) {
        state = apply(response, state);
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect(output: &'static str, delay_ms: u64) -> DeferredEffect<Vec<String>> {
        DeferredEffect {
            call: Box::new(move || {
                Box::pin(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    Ok(AgentResponse {
                        output: output.to_string(),
                        data: serde_json::Value::Null,
                    })
                })
            }),
            apply: Box::new(|response, mut acc| {
                acc.push(response.output);
                acc
            }),
        }
    }

    #[tokio::test]
    async fn folds_in_submission_order_despite_completion_order() {
        // "slow" finishes after "fast", but submission order must win.
        let effects = vec![effect("slow", 30), effect("fast", 1)];
        let result = execute_parallel_group(effects, Vec::new()).await.unwrap();
        assert_eq!(result, vec!["slow".to_string(), "fast".to_string()]);
    }

    #[tokio::test]
    async fn any_failure_fails_the_whole_group() {
        let effects: Vec<DeferredEffect<Vec<String>>> = vec![
            effect("ok", 1),
            DeferredEffect {
                call: Box::new(|| Box::pin(async { Err(ConductorError::guard("boom")) })),
                apply: Box::new(|response, mut acc| {
                    acc.push(response.output);
                    acc
                }),
            },
        ];
        let result = execute_parallel_group(effects, Vec::new()).await;
        assert!(result.is_err());
    }
}
