//! HTTP client for the external risk-review service.
//!
//! `POST {base_url}/review` with a [`ReviewRequest`] body; the service answers
//! `{"verdict": "APPROVE" | "REJECT", "rationale": "..."}`. Every transport,
//! status or decoding failure maps to `ReviewUnavailable`, which the review
//! stage folds into a REJECT.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::RiskReviewConfig;
use crate::core::risk_review::{ReviewRequest, RiskOracle};
use crate::errors::BotError;
use crate::types::{RiskVerdict, Verdict};

/// Responses slower than this are logged.
const SLOW_REVIEW_MS: u128 = 2_000;

#[derive(Debug, Deserialize)]
struct ReviewResponse {
    verdict: String,
    #[serde(default)]
    rationale: String,
}

pub struct HttpRiskOracle {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRiskOracle {
    pub fn new(config: &RiskReviewConfig) -> Result<Self, BotError> {
        let timeout = Duration::from_millis(config.timeout_ms);

        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| BotError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn review_url(&self) -> String {
        format!("{}/review", self.base_url)
    }
}

/// Verdict strings are accepted case-insensitively; anything else is unusable.
fn parse_verdict(raw: &str) -> Result<Verdict, BotError> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "APPROVE" => Ok(Verdict::Approve),
        "REJECT" => Ok(Verdict::Reject),
        other => Err(BotError::ReviewUnavailable {
            reason: format!("unrecognized verdict {other:?}"),
        }),
    }
}

#[async_trait]
impl RiskOracle for HttpRiskOracle {
    async fn review(&self, request: &ReviewRequest) -> Result<RiskVerdict, BotError> {
        let start = Instant::now();
        let url = self.review_url();

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| BotError::ReviewUnavailable {
                reason: if e.is_timeout() {
                    format!("timeout after {}ms", self.timeout.as_millis())
                } else if e.is_connect() {
                    format!("connection failed: {e}")
                } else {
                    format!("request failed: {e}")
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::ReviewUnavailable {
                reason: format!("service returned {status}: {body}"),
            });
        }

        let body: ReviewResponse = response
            .json()
            .await
            .map_err(|e| BotError::ReviewUnavailable {
                reason: format!("failed to parse response: {e}"),
            })?;

        let verdict = RiskVerdict {
            verdict: parse_verdict(&body.verdict)?,
            rationale: body.rationale,
        };

        let elapsed = start.elapsed().as_millis();
        if elapsed > SLOW_REVIEW_MS {
            warn!(symbol = %request.symbol, elapsed_ms = elapsed as u64, "slow risk review");
        }
        debug!(
            symbol = %request.symbol,
            verdict = verdict.verdict.as_str(),
            elapsed_ms = elapsed as u64,
            "risk review response"
        );

        Ok(verdict)
    }
}
