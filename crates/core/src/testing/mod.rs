//! Mock collaborators and fixtures for tests.
//!
//! Every external dependency of the pipeline has a scriptable stand-in here,
//! so handler, pool and controller behavior can be exercised without network
//! access.
//!
//! # Example
//!
//! ```rust,ignore
//! use billwire_core::testing::{fixtures, MockLanguageModel, MockLinkProber};
//!
//! let source = fixtures::legislative_source();
//! let model = MockLanguageModel::new();
//! model.answer_for(2, "Referred to [Natural Resources](https://example.com/c).");
//! let prober = MockLinkProber::new().with_status("https://example.com/c", 404);
//! ```

mod flaky_store;
mod mock_legislative;
mod mock_model;
mod mock_output;
mod mock_prober;

pub use flaky_store::FlakyStateStore;
pub use mock_legislative::MockLegislativeSource;
pub use mock_model::MockLanguageModel;
pub use mock_output::RecordingOutputCollector;
pub use mock_prober::MockLinkProber;

/// Canned API documents.
pub mod fixtures {
    use serde_json::{json, Value};

    use crate::legislative::BillResource;

    use super::MockLegislativeSource;

    pub const BILL_TITLE: &str = "Lower Energy Costs Act";
    pub const SPONSOR_BIOGUIDE_ID: &str = "S001176";

    /// A `bill` document shaped like the Congress.gov response.
    pub fn bill_document(title: &str, sponsor_bioguide_id: &str) -> Value {
        json!({
            "bill": {
                "congress": 118,
                "title": title,
                "introducedDate": "2023-03-14",
                "sponsors": [{
                    "bioguideId": sponsor_bioguide_id,
                    "fullName": "Rep. Scalise, Steve [R-LA-1]",
                    "party": "R",
                    "state": "LA"
                }],
                "latestAction": {
                    "actionDate": "2023-03-30",
                    "text": "Received in the Senate."
                }
            }
        })
    }

    pub fn committees_document() -> Value {
        json!({
            "committees": [
                {"systemCode": "hsii00", "name": "Natural Resources Committee", "chamber": "House"},
                {"systemCode": "hsif00", "name": "Energy and Commerce Committee", "chamber": "House"}
            ]
        })
    }

    pub fn actions_document() -> Value {
        json!({
            "actions": [
                {"actionDate": "2023-03-30", "text": "Passed/agreed to in House: On passage Passed by the Yeas and Nays: 225 - 204."},
                {"actionDate": "2023-03-14", "text": "Introduced in House"}
            ]
        })
    }

    pub fn cosponsors_document() -> Value {
        json!({
            "cosponsors": [
                {"bioguideId": "W000806", "fullName": "Rep. Westerman, Bruce [R-AR-4]"}
            ]
        })
    }

    pub fn summaries_document() -> Value {
        json!({
            "summaries": [
                {"actionDesc": "Introduced in House", "text": "This bill addresses energy production."}
            ]
        })
    }

    pub fn amendments_document() -> Value {
        json!({ "amendments": [] })
    }

    /// A source answering every resource of every bill.
    pub fn legislative_source() -> MockLegislativeSource {
        MockLegislativeSource::new()
            .with_document(BillResource::Bill, bill_document(BILL_TITLE, SPONSOR_BIOGUIDE_ID))
            .with_document(BillResource::Committees, committees_document())
            .with_document(BillResource::Actions, actions_document())
            .with_document(BillResource::Cosponsors, cosponsors_document())
            .with_document(BillResource::Summaries, summaries_document())
            .with_document(BillResource::Amendments, amendments_document())
    }
}
