pub mod client;
pub mod query;

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::client::{AiClientError, LanguageModel};

    /// Deterministic stand-in for the hosted model: pops pre-scripted
    /// responses in order, failing once the script runs out.
    pub struct ScriptedModel {
        responses: Mutex<VecDeque<Result<Value, AiClientError>>>,
    }

    impl ScriptedModel {
        pub fn new(responses: Vec<Result<Value, AiClientError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
            }
        }

        /// A model that is always unreachable.
        pub fn unreachable() -> Self {
            Self::new(vec![])
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete_json(&self, _system: &str, _user: &str) -> Result<Value, AiClientError> {
            self.responses
                .lock()
                .expect("script lock poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(AiClientError::Malformed("script exhausted".into())))
        }
    }
}
