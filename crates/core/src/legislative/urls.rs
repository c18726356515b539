//! Public congress.gov page URLs. Prompts hand these to the model so answers
//! cite pages a reader can open rather than API endpoints.

use serde::Serialize;

use crate::task::BillId;

fn bill_type_slug(bill_type: &str) -> &'static str {
    match bill_type {
        "hr" => "house-bill",
        "s" => "senate-bill",
        "hres" => "house-resolution",
        "sres" => "senate-resolution",
        "hjres" => "house-joint-resolution",
        "sjres" => "senate-joint-resolution",
        "hconres" => "house-concurrent-resolution",
        "sconres" => "senate-concurrent-resolution",
        _ => "bill",
    }
}

fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

/// `https://www.congress.gov/bill/118th-congress/house-bill/1`
pub fn public_bill_url(bill: &BillId, congress: u32) -> String {
    format!(
        "https://www.congress.gov/bill/{}-congress/{}/{}",
        ordinal(congress),
        bill_type_slug(bill.bill_type()),
        bill.number()
    )
}

pub fn public_member_url(bioguide_id: &str) -> String {
    format!("https://www.congress.gov/member/{}", bioguide_id)
}

/// Reference pages offered to the model for one bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUrls {
    pub bill: String,
    pub actions: String,
    pub cosponsors: String,
    pub committees: String,
    pub amendments: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsor: Option<String>,
}

impl PublicUrls {
    pub fn new(bill: &BillId, congress: u32, sponsor_bioguide_id: Option<&str>) -> Self {
        let base = public_bill_url(bill, congress);
        Self {
            actions: format!("{}/all-actions", base),
            cosponsors: format!("{}/cosponsors", base),
            committees: format!("{}/committees", base),
            amendments: format!("{}/amendments", base),
            sponsor: sponsor_bioguide_id.map(public_member_url),
            bill: base,
        }
    }
}
