//! Push notification dispatch.
//!
//! Delivery is best-effort: implementations report failure through the
//! return value, and a failed notification never stops the monitor.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification. Returns `false` when delivery failed.
    async fn notify(&self, title: &str, message: &str) -> bool;
}

#[async_trait]
impl Notifier for Box<dyn Notifier> {
    async fn notify(&self, title: &str, message: &str) -> bool {
        self.as_ref().notify(title, message).await
    }
}

/// Sink used when no push key is configured.
pub struct NoNotifier;

#[async_trait]
impl Notifier for NoNotifier {
    async fn notify(&self, _title: &str, _message: &str) -> bool {
        true
    }
}

const BARK_BASE_URL: &str = "https://api.day.app";

/// Bark (api.day.app) transport: a GET whose path embeds the device key
/// and the message.
pub struct BarkNotifier {
    client: Client,
    base_url: String,
    key: String,
}

impl BarkNotifier {
    pub fn new(client: Client, key: impl Into<String>) -> Self {
        Self::with_base_url(client, BARK_BASE_URL, key)
    }

    pub fn with_base_url(
        client: Client,
        base_url: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl Notifier for BarkNotifier {
    async fn notify(&self, title: &str, message: &str) -> bool {
        let url = format!(
            "{}/{}/{}?title={}&level=critical&volume=10&call=1",
            self.base_url,
            self.key,
            urlencoding::encode(message),
            urlencoding::encode(title),
        );

        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("push notification delivered");
                true
            }
            Ok(response) => {
                warn!(status = %response.status(), "push endpoint rejected the notification");
                false
            }
            Err(err) => {
                warn!(error = %err, "push notification failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ensure_crypto_provider() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    #[tokio::test]
    async fn delivers_through_the_keyed_path() {
        ensure_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/device-key/2%20new%20offers"))
            .and(query_param("title", "New UCAS offer"))
            .and(query_param("level", "critical"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let notifier = BarkNotifier::with_base_url(Client::new(), server.uri(), "device-key");
        assert!(notifier.notify("New UCAS offer", "2 new offers").await);
    }

    #[tokio::test]
    async fn rejection_reports_failure_without_erroring() {
        ensure_crypto_provider();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = BarkNotifier::with_base_url(Client::new(), server.uri(), "device-key");
        assert!(!notifier.notify("title", "message").await);
    }

    #[tokio::test]
    async fn no_notifier_always_succeeds() {
        assert!(NoNotifier.notify("title", "message").await);
    }
}
