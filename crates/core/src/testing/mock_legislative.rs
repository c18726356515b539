use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::legislative::{BillResource, LegislativeError, LegislativeSource};
use crate::task::BillId;

struct Failure {
    error: LegislativeError,
    /// `None` fails forever.
    remaining: Option<usize>,
}

/// Scripted legislative source.
///
/// Documents are served per resource for every bill unless a bill-specific
/// document was set. Resources with nothing configured answer `NotFound`.
#[derive(Default)]
pub struct MockLegislativeSource {
    documents: Mutex<HashMap<BillResource, Value>>,
    bill_documents: Mutex<HashMap<(String, BillResource), Value>>,
    failures: Mutex<HashMap<BillResource, Failure>>,
    calls: AtomicUsize,
}

impl MockLegislativeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, resource: BillResource, value: Value) -> Self {
        self.documents
            .lock()
            .unwrap()
            .insert(resource, value);
        self
    }

    pub fn set_bill_document(&self, bill_id: &str, resource: BillResource, value: Value) {
        self.bill_documents
            .lock()
            .unwrap()
            .insert((bill_id.to_string(), resource), value);
    }

    /// Fail every fetch of `resource` with `error`.
    pub fn fail(&self, resource: BillResource, error: LegislativeError) {
        self.failures.lock().unwrap().insert(
            resource,
            Failure {
                error,
                remaining: None,
            },
        );
    }

    /// Fail the next `times` fetches of `resource`, then recover.
    pub fn fail_times(&self, resource: BillResource, error: LegislativeError, times: usize) {
        self.failures.lock().unwrap().insert(
            resource,
            Failure {
                error,
                remaining: Some(times),
            },
        );
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self, resource: BillResource) -> Option<LegislativeError> {
        let mut failures = self.failures.lock().unwrap();
        let failure = failures.get_mut(&resource)?;
        match &mut failure.remaining {
            None => Some(failure.error.clone()),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(failure.error.clone())
            }
        }
    }
}

#[async_trait]
impl LegislativeSource for MockLegislativeSource {
    async fn fetch(
        &self,
        bill: &BillId,
        resource: BillResource,
    ) -> Result<Value, LegislativeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.scripted_failure(resource) {
            return Err(error);
        }

        let specific = self
            .bill_documents
            .lock()
            .unwrap()
            .get(&(bill.as_str().to_string(), resource))
            .cloned();
        specific
            .or_else(|| self.documents.lock().unwrap().get(&resource).cloned())
            .ok_or_else(|| LegislativeError::NotFound(format!("{}/{}", bill, resource)))
    }
}
