use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const BILL_TYPES: [&str; 8] = [
    "hr", "s", "hres", "sres", "hjres", "sjres", "hconres", "sconres",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid bill identifier: {0}")]
pub struct BillIdError(pub String);

/// A parsed bill identifier such as `H.R.1` or `S.RES.412`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BillId {
    display: String,
    bill_type: String,
    number: u32,
}

impl BillId {
    /// Congress.gov path segment for the bill type (`hr`, `sres`, ...).
    pub fn bill_type(&self) -> &str {
        &self.bill_type
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Filesystem-safe stem, `H.R.1` becomes `H_R_1`.
    pub fn file_stem(&self) -> String {
        self.display.replace('.', "_")
    }
}

impl FromStr for BillId {
    type Err = BillIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let display = s.trim().to_uppercase();
        let (prefix, number) = display
            .rsplit_once('.')
            .ok_or_else(|| BillIdError(s.to_string()))?;

        let number: u32 = number.parse().map_err(|_| BillIdError(s.to_string()))?;
        let bill_type: String = prefix
            .split('.')
            .map(|part| part.to_lowercase())
            .collect();

        if number == 0 || !BILL_TYPES.contains(&bill_type.as_str()) {
            return Err(BillIdError(s.to_string()));
        }

        Ok(Self {
            display,
            bill_type,
            number,
        })
    }
}

impl fmt::Display for BillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}
