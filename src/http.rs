use std::io::Read;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};

use crate::config::MirrorConfig;
use crate::error::RescueError;

pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True when the declared media type is `text/html`, ignoring parameters.
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .map(|mime| mime.essence_str() == mime::TEXT_HTML.essence_str())
            .unwrap_or(false)
    }
}

/// GET capability shared by catalog retrieval and the download workers.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, RescueError>;
}

#[derive(Clone)]
pub struct PortalHttpClient {
    client: Client,
}

impl PortalHttpClient {
    pub fn new(config: &MirrorConfig) -> Result<Self, RescueError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|err| RescueError::InvalidConfig(format!("user_agent: {err}")))?,
        );
        // The blocking client applies `timeout` to every body read as well,
        // so large files are not cut off as long as bytes keep flowing.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| RescueError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpClient for PortalHttpClient {
    fn get(&self, url: &str) -> Result<HttpResponse, RescueError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| RescueError::Http(err.to_string()))?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        Ok(HttpResponse {
            status: response.status().as_u16(),
            content_type,
            body: Box::new(response),
        })
    }
}
