use serde::Serialize;
use serde_json::Value;

/// Fields of an article that come straight from the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BillMetadata {
    pub title: Option<String>,
    pub sponsor_bioguide_id: Option<String>,
    pub sponsor_name: Option<String>,
    /// Committee system codes in API order, without duplicates.
    pub committee_ids: Vec<String>,
}

impl BillMetadata {
    /// Read from the `bill` document and, when available, the `committees`
    /// document.
    pub fn from_documents(bill: &Value, committees: Option<&Value>) -> Self {
        let record = &bill["bill"];
        let sponsor = &record["sponsors"][0];

        let mut committee_ids: Vec<String> = Vec::new();
        if let Some(list) = committees.and_then(|c| c["committees"].as_array()) {
            for code in list.iter().filter_map(|c| c["systemCode"].as_str()) {
                if !committee_ids.iter().any(|existing| existing == code) {
                    committee_ids.push(code.to_string());
                }
            }
        }

        Self {
            title: record["title"].as_str().map(str::to_string),
            sponsor_bioguide_id: sponsor["bioguideId"].as_str().map(str::to_string),
            sponsor_name: sponsor["fullName"].as_str().map(str::to_string),
            committee_ids,
        }
    }
}
