use std::fmt;

use thiserror::Error;

/// Sub-resources of a bill on the API. `Bill` is the bill record itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BillResource {
    Bill,
    Actions,
    Amendments,
    Committees,
    Cosponsors,
    Summaries,
}

impl BillResource {
    /// Path segment after `/bill/{congress}/{type}/{number}`, if any.
    pub fn path_segment(&self) -> Option<&'static str> {
        match self {
            BillResource::Bill => None,
            BillResource::Actions => Some("actions"),
            BillResource::Amendments => Some("amendments"),
            BillResource::Committees => Some("committees"),
            BillResource::Cosponsors => Some("cosponsors"),
            BillResource::Summaries => Some("summaries"),
        }
    }

    /// Top-level key holding the resource's payload in the response.
    pub fn response_key(&self) -> &'static str {
        self.path_segment().unwrap_or("bill")
    }

    pub fn as_str(&self) -> &'static str {
        self.response_key()
    }
}

impl fmt::Display for BillResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum LegislativeError {
    #[error("rate limited by legislative API")]
    RateLimited,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl LegislativeError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LegislativeError::RateLimited
            | LegislativeError::Timeout
            | LegislativeError::Http(_) => true,
            LegislativeError::Api { status, .. } => *status >= 500,
            LegislativeError::NotFound(_) | LegislativeError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for LegislativeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LegislativeError::Timeout
        } else if e.is_decode() {
            LegislativeError::Decode(e.to_string())
        } else {
            LegislativeError::Http(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_and_keys() {
        assert_eq!(BillResource::Bill.path_segment(), None);
        assert_eq!(BillResource::Bill.response_key(), "bill");
        assert_eq!(BillResource::Cosponsors.path_segment(), Some("cosponsors"));
        assert_eq!(BillResource::Cosponsors.response_key(), "cosponsors");
    }

    #[test]
    fn test_retryability() {
        assert!(LegislativeError::RateLimited.is_retryable());
        assert!(LegislativeError::Timeout.is_retryable());
        assert!(LegislativeError::Api {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!LegislativeError::Api {
            status: 400,
            message: String::new()
        }
        .is_retryable());
        assert!(!LegislativeError::NotFound("H.R.1".into()).is_retryable());
    }
}
