use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::model::{GenerateRequest, LanguageModel, ModelError};
use crate::task::QUESTIONS;

/// Canned language model.
///
/// The question is recognized from its text in the prompt and the bill from
/// the prompt's `Bill {id} data:` header. Unscripted questions get a short
/// answer without links.
#[derive(Default)]
pub struct MockLanguageModel {
    answers: Mutex<HashMap<u8, String>>,
    bill_answers: Mutex<HashMap<(String, u8), String>>,
    failures: Mutex<Vec<ModelError>>,
    delay: Mutex<Option<Duration>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer question `index` with `text` for every bill.
    pub fn answer_for(&self, index: u8, text: impl Into<String>) {
        self.answers.lock().unwrap().insert(index, text.into());
    }

    pub fn answer_for_bill(&self, bill_id: &str, index: u8, text: impl Into<String>) {
        self.bill_answers
            .lock()
            .unwrap()
            .insert((bill_id.to_string(), index), text.into());
    }

    /// Fail the next calls with these errors, in order.
    pub fn fail_next(&self, errors: Vec<ModelError>) {
        let mut failures = self.failures.lock().unwrap();
        failures.extend(errors);
    }

    /// Make every call take this long.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    fn respond(&self, prompt: &str) -> String {
        let index = QUESTIONS
            .iter()
            .find(|q| prompt.contains(q.text))
            .map(|q| q.index)
            .unwrap_or(0);
        let bill_id = prompt
            .strip_prefix("Bill ")
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or_default()
            .to_string();

        if let Some(text) = self.bill_answers.lock().unwrap().get(&(bill_id.clone(), index)) {
            return text.clone();
        }
        if let Some(text) = self.answers.lock().unwrap().get(&index) {
            return text.clone();
        }
        format!("Canned answer {} for {}.", index, bill_id)
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        request: GenerateRequest,
        timeout: Duration,
    ) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(ModelError::Timeout(timeout));
            }
            tokio::time::sleep(delay).await;
        }

        let failure = {
            let mut failures = self.failures.lock().unwrap();
            (!failures.is_empty()).then(|| failures.remove(0))
        };
        if let Some(error) = failure {
            return Err(error);
        }

        Ok(self.respond(&request.prompt))
    }
}
