use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{normalize_ticker, ApiRateLimiter, SourceGateway};
use crate::error::{Result, SyncError};
use crate::models::tiingo::TickerMeta;
use crate::models::{Config, FundamentalReport, MultiplierPoint, PricePoint};
use crate::utils::{parse_date_prefix, DATE_FORMAT};

/// Tiingo REST client
pub struct TiingoClient {
    client: Client,
    base_url: Url,
    api_token: String,
    statements_start: NaiveDate,
    rate_limiter: ApiRateLimiter,
}

impl TiingoClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("valuation-sync/0.1")
            .build()?;

        let base_url = Url::parse(&config.tiingo_base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::GatewayResponse(format!(
                "base url {} cannot carry a path",
                config.tiingo_base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            api_token: config.tiingo_api_token.clone(),
            statements_start: config.fundamentals_start_date,
            rate_limiter: ApiRateLimiter::new(config.rate_limit_per_minute),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let token = HeaderValue::from_str(&format!("Token {}", self.api_token))
            .map_err(|e| SyncError::GatewayResponse(format!("invalid api token: {}", e)))?;
        headers.insert(AUTHORIZATION, token);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        self.rate_limiter.wait_if_needed().await;
        debug!("GET {}", url.path());

        let response = self
            .client
            .get(url)
            .headers(self.headers()?)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<T>().await?)
    }

    fn with_start_date(mut url: Url, start: NaiveDate) -> Url {
        url.query_pairs_mut()
            .append_pair("startDate", &start.format(DATE_FORMAT).to_string());
        url
    }
}

#[async_trait]
impl SourceGateway for TiingoClient {
    async fn daily_prices(&self, ticker: &str, start_date: NaiveDate) -> Result<Vec<PricePoint>> {
        let symbol = normalize_ticker(ticker);
        let url = Self::with_start_date(self.endpoint(&["daily", &symbol, "prices"]), start_date);
        self.get_json(url).await
    }

    async fn daily_multipliers(&self, ticker: &str) -> Result<Vec<MultiplierPoint>> {
        let symbol = normalize_ticker(ticker);
        self.get_json(self.endpoint(&["fundamentals", &symbol, "daily"])).await
    }

    async fn latest_daily_update(&self, ticker: &str) -> Result<Option<NaiveDate>> {
        let symbol = normalize_ticker(ticker);
        let meta: TickerMeta = self.get_json(self.endpoint(&["daily", &symbol])).await?;

        match meta.end_date.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => match parse_date_prefix(raw) {
                Some(date) => Ok(Some(date)),
                None => {
                    warn!("{}: unparseable endDate {:?}", ticker, raw);
                    Ok(None)
                }
            },
        }
    }

    async fn quarterly_fundamentals(&self, ticker: &str) -> Result<Vec<FundamentalReport>> {
        let symbol = normalize_ticker(ticker);
        let url = Self::with_start_date(
            self.endpoint(&["fundamentals", &symbol, "statements"]),
            self.statements_start,
        );
        self.get_json(url).await
    }

    async fn latest_quarterly_update_date(&self, ticker: &str) -> Result<Option<NaiveDate>> {
        // Provider returns newest first; take the max rather than trusting order
        let reports = self.quarterly_fundamentals(ticker).await?;
        Ok(reports.iter().map(|r| r.date).max())
    }
}
