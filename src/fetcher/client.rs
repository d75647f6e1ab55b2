use crate::domain::AwardRecord;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Malformed response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

pub const DEFAULT_FIELDS: &[&str] = &[
    "agency",
    "awardeeCountryCode",
    "awardeeStateCode",
    "awardeeName",
    "startDate",
    "expDate",
    "date",
    "title",
    "abstractText",
];

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub user_agent: String,
    pub agency: String,
    pub country_code: String,
    pub fields: Vec<String>,
    pub page_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.nsf.gov/services/v1/awards.json".to_string(),
            timeout: Duration::from_secs(40),
            connection_timeout: Duration::from_secs(10),
            user_agent: format!("nsf-harvest/{}", env!("CARGO_PKG_VERSION")),
            agency: "NSF".to_string(),
            country_code: "US".to_string(),
            fields: DEFAULT_FIELDS.iter().map(|f| (*f).to_string()).collect(),
            page_size: 25,
        }
    }
}

/// Response shape of the awards endpoint. Only `response.award` is read.
#[derive(Debug, Default, Deserialize)]
struct AwardsEnvelope {
    #[serde(default)]
    response: Option<AwardsBody>,
}

#[derive(Debug, Default, Deserialize)]
struct AwardsBody {
    #[serde(default)]
    award: Option<Vec<AwardRecord>>,
}

/// Thin HTTP client for one page of awards.
#[derive(Debug, Clone)]
pub struct AwardsClient {
    client: Client,
    config: ClientConfig,
    endpoint_url: Url,
}

impl AwardsClient {
    pub fn new(config: ClientConfig) -> Result<Self, FetchError> {
        let endpoint_url: Url = config.endpoint.parse().map_err(|e| {
            FetchError::InvalidConfiguration(format!("Invalid endpoint URL: {e}"))
        })?;

        if config.page_size == 0 {
            return Err(FetchError::InvalidConfiguration(
                "Page size must be greater than 0".to_string(),
            ));
        }

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            config,
            endpoint_url,
        })
    }

    /// Full request URL for one page of `year` starting at record `offset`.
    pub fn page_url(&self, year: i32, offset: u32) -> Url {
        let mut url = self.endpoint_url.clone();
        url.query_pairs_mut()
            .append_pair("rpp", &self.config.page_size.to_string())
            .append_pair("offset", &offset.to_string())
            .append_pair("startDateStart", &format!("01/01/{year}"))
            .append_pair("startDateEnd", &format!("12/31/{year}"))
            .append_pair("agency", &self.config.agency)
            .append_pair("awardeeCountryCode", &self.config.country_code)
            .append_pair("printFields", &self.config.fields.join(","));
        url
    }

    /// Fetches one page. A response without `response.award` is an empty page.
    pub async fn fetch_page(&self, year: i32, offset: u32) -> Result<Vec<AwardRecord>, FetchError> {
        let response = self.client.get(self.page_url(year, offset)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::HttpError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let envelope: AwardsEnvelope = serde_json::from_str(&body)?;
        Ok(envelope
            .response
            .and_then(|body| body.award)
            .unwrap_or_default())
    }
}
