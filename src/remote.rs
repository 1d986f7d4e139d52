//! Remote persistence seam.
//!
//! The coordinator only needs "insert this payload into that destination".
//! [`RestSink`] speaks the PostgREST dialect used by the hosted backend:
//! `POST {url}/rest/v1/{table}` with the payload wrapped in a one-element
//! array.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::RemoteWriteError;
use crate::record::Destination;

#[async_trait]
pub trait RemoteSink: Send + Sync {
    async fn insert(&self, destination: Destination, payload: &Value)
        -> Result<(), RemoteWriteError>;
}

pub struct RestSink {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestSink {
    /// `timeout` bounds each request at the transport level
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteWriteError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn table_url(&self, destination: Destination) -> String {
        format!("{}/rest/v1/{}", self.base_url, destination)
    }
}

#[async_trait]
impl RemoteSink for RestSink {
    async fn insert(
        &self,
        destination: Destination,
        payload: &Value,
    ) -> Result<(), RemoteWriteError> {
        let url = self.table_url(destination);
        let mut request = self
            .client
            .post(&url)
            .header("Prefer", "return=minimal")
            .json(&[payload]);

        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteWriteError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Inserted into {} ({})", destination, status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordKind;

    #[test]
    fn test_table_url_trims_trailing_slash() {
        let sink = RestSink::new("http://localhost:54321/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            sink.table_url(RecordKind::Inspection.destination()),
            "http://localhost:54321/rest/v1/ppe_inspections"
        );
    }
}
