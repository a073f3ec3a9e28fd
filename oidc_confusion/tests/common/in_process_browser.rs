//! Browser double that answers simulated-actor URLs through the harness
//! dispatcher and everything else over plain HTTP.
//!
//! Scripts understood:
//! - anything mentioning `readyState` answers `"complete"`
//! - `login:<user>` appends `user=<user>` to the current URL and follows it

use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use http::StatusCode;
use http::header::LOCATION;
use oidc_confusion::{ActorError, BrowserCookie, BrowserDriver, DriverFactory, Harness};
use serde_json::Value;
use url::Url;

const MAX_REDIRECTS: usize = 10;

#[derive(Default)]
struct Page {
    url: String,
    source: String,
}

pub struct InProcessBrowser {
    harness: Harness,
    client: reqwest::Client,
    page: Mutex<Page>,
    /// Every URL loaded, redirects included.
    pub visited: Arc<Mutex<Vec<String>>>,
}

/// Hands out [`InProcessBrowser`]s once a harness is attached.
#[derive(Default)]
pub struct InProcessBrowserFactory {
    harness: OnceLock<Harness>,
    pub visited: Arc<Mutex<Vec<String>>>,
}

impl InProcessBrowser {
    pub fn factory() -> Arc<InProcessBrowserFactory> {
        Arc::new(InProcessBrowserFactory::default())
    }

    async fn navigate(&self, url: &str) -> Result<(), ActorError> {
        let mut url = url.to_string();
        for _ in 0..MAX_REDIRECTS {
            self.visited.lock().unwrap().push(url.clone());
            let (status, location, body) = self.load(&url).await?;
            match location {
                Some(location) if status.is_redirection() => {
                    let next = Url::parse(&url)
                        .and_then(|base| base.join(&location))
                        .map_err(|e| ActorError::Browser(e.to_string()))?;
                    url = next.to_string();
                }
                _ => {
                    *self.page.lock().unwrap() = Page { url, source: body };
                    return Ok(());
                }
            }
        }
        Err(ActorError::Browser("Too many redirects".to_string()))
    }

    async fn load(&self, url: &str) -> Result<(StatusCode, Option<String>, String), ActorError> {
        let hosts = &self.harness.config().hosts;
        let is_actor = [
            &hosts.honest_op_url,
            &hosts.evil_op_url,
            &hosts.honest_rp_url,
            &hosts.evil_rp_url,
        ]
        .iter()
        .any(|host| url.starts_with(host.as_str()));

        if is_actor {
            let request = http::Request::builder()
                .uri(url)
                .body(Vec::new())
                .map_err(|e| ActorError::Browser(e.to_string()))?;
            let response = self
                .harness
                .dispatch(request)
                .await
                .map_err(|e| ActorError::Browser(e.to_string()))?;
            let location = response.location().map(str::to_string);
            return Ok((response.status, location, response.body_text()));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ActorError::Browser(e.to_string()))?;
        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| ActorError::Browser(e.to_string()))?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        Ok((status, location, body))
    }
}

#[async_trait]
impl BrowserDriver for InProcessBrowser {
    async fn open(&self, url: &str) -> Result<(), ActorError> {
        self.navigate(url).await
    }

    async fn execute_script(&self, script: &str) -> Result<Value, ActorError> {
        if script.contains("readyState") {
            return Ok(Value::String("complete".to_string()));
        }
        if let Some(user) = script.trim().strip_prefix("login:") {
            let current = self.page.lock().unwrap().url.clone();
            let mut url = Url::parse(&current).map_err(|e| ActorError::Browser(e.to_string()))?;
            url.query_pairs_mut().append_pair("user", user.trim());
            self.navigate(url.as_str()).await?;
            return Ok(Value::Bool(true));
        }
        Ok(Value::Null)
    }

    async fn current_url(&self) -> Result<String, ActorError> {
        Ok(self.page.lock().unwrap().url.clone())
    }

    async fn page_source(&self) -> Result<String, ActorError> {
        Ok(self.page.lock().unwrap().source.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, ActorError> {
        Ok(Vec::new())
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>, ActorError> {
        Ok(Vec::new())
    }

    async fn set_cookies(&self, _cookies: &[BrowserCookie]) -> Result<(), ActorError> {
        Ok(())
    }

    async fn quit(&self) -> Result<(), ActorError> {
        Ok(())
    }
}

impl InProcessBrowserFactory {
    pub fn attach(&self, harness: Harness) {
        let _ = self.harness.set(harness);
    }
}

#[async_trait]
impl DriverFactory for InProcessBrowserFactory {
    async fn create(&self) -> Result<Box<dyn BrowserDriver>, ActorError> {
        let harness = self
            .harness
            .get()
            .cloned()
            .ok_or_else(|| ActorError::Browser("No harness attached".to_string()))?;
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ActorError::Browser(e.to_string()))?;
        Ok(Box::new(InProcessBrowser {
            harness,
            client,
            page: Mutex::new(Page::default()),
            visited: self.visited.clone(),
        }))
    }
}
