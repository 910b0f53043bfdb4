//! HTTP access for the engine.
//!
//! This module wraps a blocking reqwest client and provides:
//! - The capability probe (HEAD) reporting size and range support
//! - Streaming GET requests with optional `Range` and `Referer` headers

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, ACCEPT_RANGES, CONTENT_LENGTH, RANGE, REFERER};
use reqwest::StatusCode;

use super::record::ByteRange;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// What the capability probe learned about a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeInfo {
    /// `Content-Length`, 0 when absent.
    pub total_size: u64,
    /// `Accept-Ranges: bytes` was advertised.
    pub accepts_ranges: bool,
}

/// Blocking HTTP client shared by every transfer of one engine.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    read_timeout: Duration,
}

impl HttpClient {
    /// Build a client from engine settings.
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| EngineError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            read_timeout: config.read_timeout,
        })
    }

    /// Read timeout in whole seconds, for error reporting.
    pub fn timeout_secs(&self) -> u64 {
        self.read_timeout.as_secs()
    }

    /// Issue a HEAD request, following redirects.
    pub fn probe(&self, url: &str, referrer: Option<&str>) -> EngineResult<ProbeInfo> {
        let response = with_referrer(self.client.head(url), referrer)
            .send()
            .map_err(|e| EngineError::Probe {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(EngineError::Probe {
                url: url.to_string(),
                reason: format!("HEAD request failed with status {}", response.status()),
            });
        }

        Ok(probe_info(response.headers()))
    }

    /// Open a streaming GET. A ranged request must be answered with 206.
    pub fn get(
        &self,
        url: &str,
        referrer: Option<&str>,
        range: Option<ByteRange>,
    ) -> EngineResult<Response> {
        let mut request = with_referrer(self.client.get(url), referrer);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = request
            .send()
            .map_err(|e| EngineError::from_transfer(url, e, self.timeout_secs()))?;

        let status = response.status();
        match range {
            Some(range) if status != StatusCode::PARTIAL_CONTENT => Err(EngineError::Transfer {
                url: url.to_string(),
                reason: if status.is_success() {
                    format!("server ignored range request {} ({})", range.header_value(), status)
                } else {
                    format!("GET request failed with status {}", status)
                },
            }),
            None if !status.is_success() => Err(EngineError::Transfer {
                url: url.to_string(),
                reason: format!("GET request failed with status {}", status),
            }),
            _ => Ok(response),
        }
    }
}

fn with_referrer(request: RequestBuilder, referrer: Option<&str>) -> RequestBuilder {
    match referrer {
        Some(referrer) => request.header(REFERER, referrer),
        None => request,
    }
}

fn probe_info(headers: &HeaderMap) -> ProbeInfo {
    let total_size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);

    let accepts_ranges = headers
        .get_all(ACCEPT_RANGES)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"));

    ProbeInfo {
        total_size,
        accepts_ranges,
    }
}
