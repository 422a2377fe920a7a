use super::base::{DaoBackend, DaoCore, DaoSettings};
use crate::error::{NutpipeError, Result};
use crate::nut::StreamSource;
use crate::util::merge_path;
use chrono::DateTime;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::LAST_MODIFIED;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpDaoConfig {
    /// Scheme, host and optional port, e.g. `https://cdn.example.com`.
    pub base_url: String,
    pub timeout_ms: u64,
    #[serde(flatten)]
    pub settings: DaoSettings,
}

impl Default for HttpDaoConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            timeout_ms: 5_000,
            settings: DaoSettings::default(),
        }
    }
}

/// Remote resources. Only concrete paths are listed.
pub struct HttpBackend {
    base: Url,
    timeout: Duration,
    // built on first use: the blocking client must not be created inside an async context
    client: OnceLock<Client>,
}

pub type HttpNutDao = DaoCore<HttpBackend>;

impl HttpNutDao {
    pub fn new(config: HttpDaoConfig) -> Result<Arc<Self>> {
        let mut root = merge_path(&[config.base_url.as_str(), config.settings.base_path.as_str()]);
        if !root.ends_with('/') {
            root.push('/');
        }
        let base = Url::parse(&root)
            .map_err(|e| NutpipeError::bad_argument(format!("invalid base url '{root}': {e}")))?;
        let backend = HttpBackend {
            base,
            timeout: Duration::from_millis(config.timeout_ms),
            client: OnceLock::new(),
        };
        Ok(DaoCore::with_backend(backend, config.settings))
    }
}

impl HttpBackend {
    fn client(&self) -> Result<&Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .build()?;
        Ok(self.client.get_or_init(|| client))
    }

    pub fn url_for(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| NutpipeError::bad_argument(format!("invalid path '{path}': {e}")))
    }
}

fn status_error(status: StatusCode, url: &Url) -> NutpipeError {
    if status == StatusCode::NOT_FOUND {
        NutpipeError::not_found(url.to_string())
    } else {
        NutpipeError::Http(format!("{url} answered {status}"))
    }
}

/// Parses an HTTP date such as `Wed, 21 Oct 2015 07:28:00 GMT` into epoch milliseconds.
pub fn parse_http_date(value: &str) -> Option<u64> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .and_then(|dt| u64::try_from(dt.timestamp_millis()).ok())
}

impl StreamSource for HttpBackend {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let url = self.url_for(path)?;
        debug!("GET {}", url);
        let response = self.client()?.get(url.clone()).send()?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), &url));
        }
        let bytes = response.bytes()?;
        Ok(Box::new(Cursor::new(bytes.to_vec())))
    }
}

impl DaoBackend for HttpBackend {
    fn describe(&self) -> String {
        format!("http:{}", self.base)
    }

    fn list_paths(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(vec![pattern.to_string()])
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let url = self.url_for(path)?;
        let response = self.client()?.head(url).send()?;
        Ok(response.status() == StatusCode::OK)
    }

    fn last_update(&self, path: &str) -> Result<u64> {
        let url = self.url_for(path)?;
        let response = self.client()?.head(url.clone()).send()?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), &url));
        }
        Ok(response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date)
            .unwrap_or(0))
    }
}
