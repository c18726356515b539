use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use tracing::debug;

use super::{LinkProber, ProbeError};

/// Probes with HEAD and follows redirects. Servers that reject HEAD get a GET.
pub struct HttpLinkProber {
    client: Client,
}

impl HttpLinkProber {
    pub fn new() -> Result<Self, ProbeError> {
        let client = Client::builder()
            .user_agent(concat!("billwire/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    async fn send(&self, method: Method, url: &Url, timeout: Duration) -> Result<StatusCode, ProbeError> {
        let response = self
            .client
            .request(method, url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(timeout)
                } else if e.is_builder() {
                    ProbeError::InvalidUrl(url.to_string())
                } else {
                    ProbeError::Network(e.to_string())
                }
            })?;
        Ok(response.status())
    }
}

fn check_url(url: &str) -> Result<Url, ProbeError> {
    let invalid = || ProbeError::InvalidUrl(url.to_string());
    let parsed = Url::parse(url).map_err(|_| invalid())?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(invalid());
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid());
    }
    Ok(parsed)
}

#[async_trait]
impl LinkProber for HttpLinkProber {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError> {
        let parsed = check_url(url)?;

        let status = self.send(Method::HEAD, &parsed, timeout).await?;
        let status = if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::NOT_IMPLEMENTED {
            debug!(url, "HEAD rejected, retrying with GET");
            self.send(Method::GET, &parsed, timeout).await?
        } else {
            status
        };

        Ok(status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_url() {
        assert!(check_url("https://www.congress.gov/bill/118th-congress/house-bill/1").is_ok());
        assert!(check_url("http://example.com").is_ok());
        assert!(matches!(check_url("ftp://example.com"), Err(ProbeError::InvalidUrl(_))));
        assert!(matches!(check_url("https://:80/x"), Err(ProbeError::InvalidUrl(_))));
        assert!(matches!(check_url("mailto:clerk@house.gov"), Err(ProbeError::InvalidUrl(_))));
        assert!(matches!(check_url("/bill/118th-congress"), Err(ProbeError::InvalidUrl(_))));
        assert!(matches!(check_url("https://exa mple.com"), Err(ProbeError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_sent() {
        let prober = HttpLinkProber::new().unwrap();
        let err = prober
            .probe("not-a-url", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let prober = HttpLinkProber::new().unwrap();
        let err = prober
            .probe("http://127.0.0.1:1/", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Network(_) | ProbeError::Timeout(_)));
    }
}
