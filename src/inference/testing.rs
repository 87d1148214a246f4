//! Scripted gateway for tests.

use crate::inference::gateway::{Completion, InferenceGateway, Prompt, ProviderError};
use crate::types::ComplexityTier;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum Step {
    Reply { text: String, tokens: u64 },
    Fail { status: u16, body: String },
    Hang,
}

/// Plays back steps in order; repeats the last one once the script runs out.
pub(crate) struct ScriptedGateway {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(Prompt, ComplexityTier, u32)>>,
}

impl ScriptedGateway {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying(text: &str, tokens: u64) -> Self {
        Self::new(vec![Step::Reply {
            text: text.to_string(),
            tokens,
        }])
    }

    pub(crate) fn failing(status: u16, body: &str) -> Self {
        Self::new(vec![Step::Fail {
            status,
            body: body.to_string(),
        }])
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn seen(&self) -> Vec<(Prompt, ComplexityTier, u32)> {
        self.seen.lock().unwrap().clone()
    }

    fn next_step(&self) -> Step {
        let mut last = self.last.lock().unwrap();
        if let Some(step) = self.steps.lock().unwrap().pop_front() {
            *last = Some(step);
        }
        last.clone().unwrap_or(Step::Hang)
    }
}

#[async_trait]
impl InferenceGateway for ScriptedGateway {
    async fn invoke(
        &self,
        prompt: &Prompt,
        tier: ComplexityTier,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((prompt.clone(), tier, max_tokens));

        match self.next_step() {
            Step::Reply { text, tokens } => Ok(Completion {
                text: Some(text),
                tokens_used: tokens,
            }),
            Step::Fail { status, body } => Err(ProviderError::Status { status, body }),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::Malformed("unreachable".into()))
            }
        }
    }
}
