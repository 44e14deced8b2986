//! Per-instance cancellation, grounded on the same
//! `tokio_util::sync::CancellationToken` per running unit of work used
//! elsewhere in this codebase to let a `stop` command interrupt an
//! in-flight loop at its next guard check rather than only marking state
//! after the fact.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, instance_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens
            .lock()
            .expect("cancellation registry mutex poisoned")
            .insert(instance_id.to_string(), token.clone());
        token
    }

    pub fn token_for(&self, instance_id: &str) -> CancellationToken {
        self.tokens
            .lock()
            .expect("cancellation registry mutex poisoned")
            .entry(instance_id.to_string())
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    pub fn cancel(&self, instance_id: &str) {
        if let Some(token) = self
            .tokens
            .lock()
            .expect("cancellation registry mutex poisoned")
            .get(instance_id)
        {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_observed_through_a_separately_fetched_token() {
        let registry = CancellationRegistry::new();
        let token = registry.register("wf-1");
        assert!(!token.is_cancelled());
        registry.cancel("wf-1");
        assert!(token.is_cancelled());
        assert!(registry.token_for("wf-1").is_cancelled());
    }
}
