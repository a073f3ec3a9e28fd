//! Minimal W3C WebDriver client.
//! https://www.w3.org/TR/webdriver2/

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};

use crate::actor::errors::ActorError;

use super::driver::{BrowserCookie, BrowserDriver, DriverFactory};

/// Opens headless sessions at a WebDriver endpoint such as chromedriver.
pub struct WebDriverFactory {
    endpoint: String,
    client: reqwest::Client,
}

impl WebDriverFactory {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ActorError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn capabilities() -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "acceptInsecureCerts": true,
                    "goog:chromeOptions": {
                        "args": [
                            "headless",
                            "no-sandbox",
                            "disable-gpu",
                            "window-size=1024x768",
                            "disable-local-storage"
                        ]
                    }
                }
            }
        })
    }
}

#[async_trait]
impl DriverFactory for WebDriverFactory {
    async fn create(&self) -> Result<Box<dyn BrowserDriver>, ActorError> {
        let url = format!("{}/session", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&Self::capabilities())
            .send()
            .await?;
        let value = unwrap_value(response).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| ActorError::Browser("WebDriver returned no session id".to_string()))?;
        tracing::debug!("Opened WebDriver session {}", session_id);

        Ok(Box::new(WebDriverSession {
            base: format!("{}/session/{}", self.endpoint, session_id),
            client: self.client.clone(),
        }))
    }
}

struct WebDriverSession {
    base: String,
    client: reqwest::Client,
}

impl WebDriverSession {
    async fn get(&self, command: &str) -> Result<Value, ActorError> {
        let response = self
            .client
            .get(format!("{}{}", self.base, command))
            .send()
            .await?;
        unwrap_value(response).await
    }

    async fn post(&self, command: &str, body: Value) -> Result<Value, ActorError> {
        let response = self
            .client
            .post(format!("{}{}", self.base, command))
            .json(&body)
            .send()
            .await?;
        unwrap_value(response).await
    }

    async fn delete(&self, command: &str) -> Result<Value, ActorError> {
        let response = self
            .client
            .delete(format!("{}{}", self.base, command))
            .send()
            .await?;
        unwrap_value(response).await
    }
}

/// The `value` member of a WebDriver response, or its error.
async fn unwrap_value(response: reqwest::Response) -> Result<Value, ActorError> {
    let status = response.status();
    let mut body: Value = response.json().await?;
    let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or("");
    Err(ActorError::Browser(format!("{status} {error}: {message}")))
}

fn string_value(value: Value) -> Result<String, ActorError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(ActorError::Browser(format!(
            "Expected string from WebDriver, got {other}"
        ))),
    }
}

#[async_trait]
impl BrowserDriver for WebDriverSession {
    async fn open(&self, url: &str) -> Result<(), ActorError> {
        self.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    async fn execute_script(&self, script: &str) -> Result<Value, ActorError> {
        self.post("/execute/sync", json!({ "script": script, "args": [] }))
            .await
    }

    async fn current_url(&self) -> Result<String, ActorError> {
        string_value(self.get("/url").await?)
    }

    async fn page_source(&self) -> Result<String, ActorError> {
        string_value(self.get("/source").await?)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, ActorError> {
        let encoded = string_value(self.get("/screenshot").await?)?;
        STANDARD
            .decode(encoded)
            .map_err(|e| ActorError::Browser(format!("Invalid screenshot data: {e}")))
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>, ActorError> {
        Ok(serde_json::from_value(self.get("/cookie").await?)?)
    }

    async fn set_cookies(&self, cookies: &[BrowserCookie]) -> Result<(), ActorError> {
        self.delete("/cookie").await?;
        for cookie in cookies {
            self.post("/cookie", json!({ "cookie": cookie })).await?;
        }
        Ok(())
    }

    async fn quit(&self) -> Result<(), ActorError> {
        self.delete("").await?;
        Ok(())
    }
}
