use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::models::Signal;

#[derive(Debug, Deserialize)]
struct SignalPoolResponse {
    status: String,
    #[serde(default)]
    count: usize,
    #[serde(default)]
    data: Vec<Signal>,
}

/// Polls the external signal pool. The caller deduplicates the batches; this
/// type only fetches and decodes.
pub struct SignalFeed {
    client: Client,
    url: String,
}

impl SignalFeed {
    pub fn new(url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client");
        Self { client, url }
    }

    /// One poll of the pool. Any transport or decode failure yields an empty
    /// batch; the next tick retries by construction.
    pub async fn fetch(&self) -> Vec<Signal> {
        let resp = match self.client.get(&self.url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Signal pool unreachable: {}", e);
                return Vec::new();
            }
        };

        match resp.json::<SignalPoolResponse>().await {
            Ok(body) if body.status == "success" && body.count > 0 => body.data,
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!("Signal pool returned an undecodable payload: {}", e);
                Vec::new()
            }
        }
    }
}
