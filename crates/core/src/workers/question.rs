//! Answers one question about one bill.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::legislative::{BillResource, LegislativeError, LegislativeSource, PublicUrls};
use crate::links::extract_links;
use crate::model::{GenerateRequest, LanguageModel};
use crate::pool::{HandlerError, TaskContext, TaskHandler};
use crate::progress::{LinkStatus, ProgressTracker};
use crate::task::{question, topics, AnswerEvent, BillId, Outgoing, Question, Task, TaskKind, TaskPayload};

use super::{draft_trigger, parse_bill, BillMetadata};

/// Per-document cap on JSON handed to the model.
const MAX_DOCUMENT_CHARS: usize = 6_000;

const SYSTEM_PROMPT: &str = "You answer questions about U.S. congressional bills using only the \
data provided from Congress.gov. Write in a clear, accessible style suitable for a news article. \
Do not speculate beyond the data. When a reference URL is provided, cite it as a markdown link \
in the form [text](url). Never invent or modify URLs.";

pub struct QuestionHandler {
    tracker: ProgressTracker,
    source: Arc<dyn LegislativeSource>,
    model: Arc<dyn LanguageModel>,
    congress: u32,
    model_timeout: Duration,
    max_tokens: u32,
    temperature: f32,
}

impl QuestionHandler {
    pub fn new(
        tracker: ProgressTracker,
        source: Arc<dyn LegislativeSource>,
        model: Arc<dyn LanguageModel>,
        model_config: &ModelConfig,
        congress: u32,
    ) -> Self {
        Self {
            tracker,
            source,
            model,
            congress,
            model_timeout: Duration::from_secs(model_config.timeout_secs),
            max_tokens: model_config.max_tokens,
            temperature: model_config.temperature,
        }
    }

    /// The bill record plus the question's supplementary resources. A missing
    /// supplementary resource is treated as empty; a missing bill is not.
    async fn fetch_documents(
        &self,
        bill: &BillId,
        question: &Question,
    ) -> Result<(Value, Vec<(BillResource, Value)>), HandlerError> {
        let record = self.source.fetch(bill, BillResource::Bill).await?;

        let supplementary = try_join_all(question.resources.iter().map(|resource| async move {
            match self.source.fetch(bill, *resource).await {
                Ok(value) => Ok((*resource, value)),
                Err(LegislativeError::NotFound(_)) => Ok((*resource, Value::Null)),
                Err(e) => Err(e),
            }
        }))
        .await?;

        Ok((record, supplementary))
    }

    fn build_prompt(
        &self,
        bill: &BillId,
        question_text: &str,
        record: &Value,
        supplementary: &[(BillResource, Value)],
    ) -> String {
        let meta = BillMetadata::from_documents(record, None);
        let urls = PublicUrls::new(bill, self.congress, meta.sponsor_bioguide_id.as_deref());

        let mut prompt = format!("Bill {} data:\n{}\n", bill, render_document(&record["bill"]));
        for (resource, value) in supplementary {
            let body = if value.is_null() {
                "No data available.".to_string()
            } else {
                render_document(&value[resource.response_key()])
            };
            prompt.push_str(&format!("\n{} data:\n{}\n", resource, body));
        }

        prompt.push_str("\nReference URLs:\n");
        prompt.push_str(&format!("- Bill: {}\n", urls.bill));
        prompt.push_str(&format!("- Actions: {}\n", urls.actions));
        prompt.push_str(&format!("- Committees: {}\n", urls.committees));
        prompt.push_str(&format!("- Cosponsors: {}\n", urls.cosponsors));
        prompt.push_str(&format!("- Amendments: {}\n", urls.amendments));
        if let Some(sponsor) = &urls.sponsor {
            prompt.push_str(&format!("- Sponsor: {}\n", sponsor));
        }

        prompt.push_str(&format!("\nQuestion: {}\n\nAnswer:", question_text));
        prompt
    }

    async fn generate(
        &self,
        bill: &BillId,
        question: &Question,
        question_text: &str,
    ) -> Result<String, HandlerError> {
        let (record, supplementary) = self.fetch_documents(bill, question).await?;
        let prompt = self.build_prompt(bill, question_text, &record, &supplementary);

        let request = GenerateRequest::new(prompt)
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        Ok(self.model.generate(request, self.model_timeout).await?)
    }
}

/// Pretty JSON cut to a bounded size on a character boundary.
fn render_document(value: &Value) -> String {
    let text = serde_json::to_string_pretty(value).unwrap_or_default();
    match text.char_indices().nth(MAX_DOCUMENT_CHARS) {
        Some((cut, _)) => format!("{}\n...(truncated)", &text[..cut]),
        None => text,
    }
}

#[async_trait]
impl TaskHandler for QuestionHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Question
    }

    async fn handle(&self, task: &Task, ctx: &TaskContext) -> Result<Vec<Outgoing>, HandlerError> {
        let TaskPayload::Question {
            question_index,
            question_text,
        } = &task.payload
        else {
            return Err(HandlerError::Malformed("not a question task".to_string()));
        };
        let question = question(*question_index).ok_or_else(|| {
            HandlerError::Malformed(format!("no question with index {}", question_index))
        })?;
        let bill = parse_bill(task)?;
        let bill_id = task.bill_id.as_str();
        let index = question.index;

        // Stored text wins over a new generation so links stay consistent.
        let answer = if let Some(answer) = self.tracker.answer(bill_id, index).await? {
            debug!(bill_id, question = index, "Already answered, skipping model call");
            answer
        } else if let Some(candidate) = self.tracker.candidate(bill_id, index).await? {
            candidate
        } else {
            let generated = self.generate(&bill, question, question_text).await?;
            self.tracker
                .stash_candidate(bill_id, index, &generated)
                .await?
        };

        let links = extract_links(&answer);
        for url in &links {
            self.tracker.register_link(bill_id, url).await?;
        }

        let outcome = self.tracker.record_answer(bill_id, index, &answer).await?;
        if outcome.inserted {
            info!(
                bill_id,
                question = index,
                answered = outcome.answered_count,
                links = links.len(),
                "Answer stored"
            );
        }
        if outcome.answered_count >= crate::task::QUESTION_COUNT as i64 {
            self.tracker.seal_links(bill_id).await?;
        }

        let mut outgoing = Vec::new();
        for url in &links {
            if self.tracker.link_status(bill_id, url).await? == Some(LinkStatus::Pending) {
                outgoing.push(Outgoing::task(&Task::link_check(bill_id, url.as_str()))?);
            }
        }

        outgoing.push(Outgoing::event(
            topics::QUESTION_ANSWERS,
            bill_id,
            &AnswerEvent {
                bill_id: bill_id.to_string(),
                question_index: index,
                answer,
                links,
                answered_at: Utc::now(),
            },
        )?);

        if let Some(draft) = draft_trigger(&self.tracker, task, ctx).await? {
            outgoing.push(draft);
        }
        Ok(outgoing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStateStore;
    use crate::testing::{fixtures, MockLanguageModel, MockLegislativeSource};

    const CTX: TaskContext = TaskContext {
        attempt: 0,
        max_attempts: 3,
        delivery_count: 1,
    };

    struct Harness {
        tracker: ProgressTracker,
        source: Arc<MockLegislativeSource>,
        model: Arc<MockLanguageModel>,
        handler: QuestionHandler,
    }

    async fn harness() -> Harness {
        let tracker = ProgressTracker::new(Arc::new(InMemoryStateStore::new()));
        tracker.reset("H.R.1").await.unwrap();
        let source = Arc::new(fixtures::legislative_source());
        let model = Arc::new(MockLanguageModel::new());
        let handler = QuestionHandler::new(
            tracker.clone(),
            source.clone(),
            model.clone(),
            &ModelConfig::default(),
            118,
        );
        Harness {
            tracker,
            source,
            model,
            handler,
        }
    }

    fn question_task(index: u8) -> Task {
        Task::question("H.R.1", index, question(index).unwrap().text)
    }

    #[tokio::test]
    async fn test_answer_registers_links_and_publishes_checks() {
        let h = harness().await;
        h.model.answer_for(
            2,
            "Referred to [Natural Resources](https://www.congress.gov/committee/house-natural-resources/hsii00).",
        );

        let out = h.handler.handle(&question_task(2), &CTX).await.unwrap();

        let link_tasks: Vec<_> = out.iter().filter(|o| o.topic == topics::LINK_CHECK_TASKS).collect();
        assert_eq!(link_tasks.len(), 1);
        assert!(out.iter().any(|o| o.topic == topics::QUESTION_ANSWERS));
        assert!(!out.iter().any(|o| o.topic == topics::ARTICLE_TASKS));

        let progress = h.tracker.load("H.R.1").await.unwrap();
        assert_eq!(progress.answered_count, 1);
        assert_eq!(progress.pending_links().count(), 1);

        // bill record plus committees
        assert_eq!(h.source.calls(), 2);
        assert!(h.model.last_prompt().unwrap().contains("Question: What committees"));
    }

    #[tokio::test]
    async fn test_redelivery_skips_model() {
        let h = harness().await;
        h.handler.handle(&question_task(3), &CTX).await.unwrap();
        h.handler.handle(&question_task(3), &CTX).await.unwrap();

        assert_eq!(h.model.calls(), 1);
        assert_eq!(h.tracker.load("H.R.1").await.unwrap().answered_count, 1);
    }

    #[tokio::test]
    async fn test_last_answer_without_links_queues_draft() {
        let h = harness().await;
        let mut drafts = 0;
        for index in 1..=7 {
            let out = h.handler.handle(&question_task(index), &CTX).await.unwrap();
            drafts += out.iter().filter(|o| o.topic == topics::ARTICLE_TASKS).count();
        }
        assert_eq!(drafts, 1);

        let progress = h.tracker.load("H.R.1").await.unwrap();
        assert_eq!(progress.links_total, Some(0));
        assert_eq!(progress.draft_status, crate::progress::DraftStatus::Queued);
    }

    #[tokio::test]
    async fn test_missing_supplementary_resource_is_empty() {
        let h = harness().await;
        h.source.fail(BillResource::Amendments, LegislativeError::NotFound("amendments".into()));

        h.handler.handle(&question_task(6), &CTX).await.unwrap();
        assert!(h.model.last_prompt().unwrap().contains("amendments data:\nNo data available."));
    }

    #[tokio::test]
    async fn test_rate_limit_is_transient() {
        let h = harness().await;
        h.source.fail(BillResource::Bill, LegislativeError::RateLimited);

        let err = h.handler.handle(&question_task(1), &CTX).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(h.model.calls(), 0);
    }

    #[tokio::test]
    async fn test_bad_question_index_is_malformed() {
        let h = harness().await;
        let task = Task::question("H.R.1", 9, "Is this a question?");
        let err = h.handler.handle(&task, &CTX).await.unwrap_err();
        assert!(matches!(err, HandlerError::Malformed(_)));
    }

    #[test]
    fn test_render_document_truncates() {
        let long = Value::String("x".repeat(MAX_DOCUMENT_CHARS * 2));
        let rendered = render_document(&long);
        assert!(rendered.ends_with("...(truncated)"));
        assert!(rendered.len() < MAX_DOCUMENT_CHARS + 32);
    }
}
