use std::time::Duration;

use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tracing::debug;

use crate::error::FetchError;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Something that turns a URL into page HTML. One attempt, no retries.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Plain GET through reqwest.
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl PageSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody(url.to_string()));
        }
        Ok(body)
    }
}

/// Raw HTML through spider.cloud, for pages that block plain clients.
pub struct SpiderSource {
    spider: Spider,
}

impl SpiderSource {
    pub fn new(api_key: String) -> Result<Self, FetchError> {
        let spider = Spider::new(Some(api_key))
            .map_err(|e| FetchError::Spider(format!("failed to create client: {e}")))?;
        Ok(Self { spider })
    }

    /// Reads `SPIDER_API_KEY` from the environment.
    pub fn from_env() -> Result<Self, FetchError> {
        let key = std::env::var("SPIDER_API_KEY")
            .map_err(|_| FetchError::Spider("SPIDER_API_KEY environment variable must be set".into()))?;
        Self::new(key)
    }
}

impl PageSource for SpiderSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let params = RequestParams {
            return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
            ..Default::default()
        };

        let response = self
            .spider
            .scrape_url(url, Some(params), "application/json")
            .await
            .map_err(|e| FetchError::Spider(e.to_string()))?;

        // some client versions hand back the JSON body as a string
        let parsed: serde_json::Value = match response.as_str() {
            Some(s) => serde_json::from_str(s).unwrap_or(response.clone()),
            None => response,
        };
        let first = parsed.as_array().and_then(|arr| arr.first());

        if let Some(status) = first
            .and_then(|obj| obj.get("status"))
            .and_then(|s| s.as_u64())
            .filter(|s| *s >= 400)
        {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status as u16,
            });
        }

        let content = first
            .and_then(|obj| obj.get("content"))
            .and_then(|c| c.as_str())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| FetchError::EmptyBody(url.to_string()))?;
        debug!(url, bytes = content.len(), "spider page");
        Ok(content.to_string())
    }
}

/// Page source picked at startup from configuration.
pub enum Source {
    Http(HttpSource),
    Spider(SpiderSource),
}

impl PageSource for Source {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        match self {
            Source::Http(s) => s.fetch(url).await,
            Source::Spider(s) => s.fetch(url).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, VecDeque};

    use super::*;

    /// Replays queued responses per URL; the last response for a URL repeats.
    #[derive(Default)]
    pub struct ScriptedSource {
        responses: RefCell<HashMap<String, VecDeque<Result<String, u16>>>>,
        calls: Cell<usize>,
    }

    impl ScriptedSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(self, url: &str, html: &str) -> Self {
            self.push(url, Ok(html.to_string()))
        }

        pub fn status(self, url: &str, status: u16) -> Self {
            self.push(url, Err(status))
        }

        fn push(self, url: &str, resp: Result<String, u16>) -> Self {
            self.responses
                .borrow_mut()
                .entry(url.to_string())
                .or_default()
                .push_back(resp);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.get()
        }
    }

    impl PageSource for ScriptedSource {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls.set(self.calls.get() + 1);
            let mut responses = self.responses.borrow_mut();
            let queue = responses
                .get_mut(url)
                .ok_or_else(|| FetchError::Status { url: url.to_string(), status: 404 })?;
            let resp = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            match resp {
                Some(Ok(html)) => Ok(html),
                Some(Err(status)) => Err(FetchError::Status { url: url.to_string(), status }),
                None => Err(FetchError::EmptyBody(url.to_string())),
            }
        }
    }
}
