//! Periodic self-ping so free hosting tiers do not idle the webhook server.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, warn};

/// Ping `url` once; failures are logged, never fatal
pub async fn ping(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => {
            debug!(url = %url, status = %response.status(), "Keep-alive ping");
            true
        }
        Ok(response) => {
            warn!(url = %url, status = %response.status(), "Keep-alive ping rejected");
            false
        }
        Err(e) => {
            warn!(url = %url, error = %e, "Keep-alive ping failed");
            false
        }
    }
}

/// Ping on a fixed period, first run one period from now
pub fn spawn(client: reqwest::Client, url: String, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        loop {
            ticker.tick().await;
            ping(&client, &url).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_ping_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        assert!(ping(&client, &format!("{}/", server.uri())).await);
        assert!(!ping(&client, &format!("{}/down", server.uri())).await);
    }
}
