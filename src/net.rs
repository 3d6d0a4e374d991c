use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use tracing::debug;

use crate::error::{Result, ScrapeError};

/// Blocking request capability used by both drivers. Non-2xx responses are errors.
pub trait Transport {
    fn post_form(&self, url: &str, form: &[(&str, String)], timeout: Duration) -> Result<String>;
    fn get(&self, url: &str, timeout: Duration) -> Result<String>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(ScrapeError::Client)?;
        Ok(HttpTransport { client })
    }

    fn send(&self, url: &str, request: RequestBuilder) -> Result<String> {
        let transport_err = |source| ScrapeError::Transport {
            url: url.to_string(),
            source,
        };

        let response = request.send().map_err(transport_err)?;
        let status = response.status();
        debug!(%url, status = status.as_u16(), "response");
        if !status.is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().map_err(transport_err)
    }
}

impl Transport for HttpTransport {
    fn post_form(&self, url: &str, form: &[(&str, String)], timeout: Duration) -> Result<String> {
        self.send(url, self.client.post(url).form(form).timeout(timeout))
    }

    fn get(&self, url: &str, timeout: Duration) -> Result<String> {
        self.send(url, self.client.get(url).timeout(timeout))
    }
}
