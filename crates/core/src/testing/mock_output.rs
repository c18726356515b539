use std::sync::Mutex;

use async_trait::async_trait;

use crate::output::{Article, OutputCollector, OutputError, RunSummary};

/// Keeps every write in memory.
#[derive(Default)]
pub struct RecordingOutputCollector {
    writes: Mutex<Vec<(Vec<Article>, RunSummary)>>,
}

impl RecordingOutputCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<(Vec<Article>, RunSummary)> {
        self.writes.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl OutputCollector for RecordingOutputCollector {
    async fn write(&self, articles: &[Article], summary: &RunSummary) -> Result<(), OutputError> {
        self.writes
            .lock()
            .unwrap()
            .push((articles.to_vec(), summary.clone()));
        Ok(())
    }
}
