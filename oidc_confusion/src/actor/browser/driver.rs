use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actor::errors::ActorError;

/// Cookie as exchanged with a browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Remote-controlled browser session.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn open(&self, url: &str) -> Result<(), ActorError>;

    /// Run a script in the current page and return its JSON result.
    async fn execute_script(&self, script: &str) -> Result<Value, ActorError>;

    async fn current_url(&self) -> Result<String, ActorError>;

    async fn page_source(&self) -> Result<String, ActorError>;

    async fn page_contains(&self, text: &str) -> Result<bool, ActorError> {
        Ok(self.page_source().await?.contains(text))
    }

    /// PNG screenshot of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, ActorError>;

    async fn cookies(&self) -> Result<Vec<BrowserCookie>, ActorError>;

    /// Replace the cookie jar of the current domain.
    async fn set_cookies(&self, cookies: &[BrowserCookie]) -> Result<(), ActorError>;

    async fn quit(&self) -> Result<(), ActorError>;
}

/// Source of fresh browser sessions.
#[async_trait]
pub trait DriverFactory: Send + Sync + 'static {
    async fn create(&self) -> Result<Box<dyn BrowserDriver>, ActorError>;
}

/// Factory used when no browser backend is configured. Every step that
/// needs a browser ends UNDETERMINED.
pub struct NoBrowser;

#[async_trait]
impl DriverFactory for NoBrowser {
    async fn create(&self) -> Result<Box<dyn BrowserDriver>, ActorError> {
        Err(ActorError::Browser(
            "No browser backend configured".to_string(),
        ))
    }
}

/// Drivers opened by one browser behavior, so they can all be closed when
/// the step ends.
pub(crate) struct DriverPool {
    factory: Arc<dyn DriverFactory>,
    open: Mutex<Vec<Arc<dyn BrowserDriver>>>,
}

impl DriverPool {
    pub(crate) fn new(factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            factory,
            open: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn fresh(&self) -> Result<Arc<dyn BrowserDriver>, ActorError> {
        let driver: Arc<dyn BrowserDriver> = Arc::from(self.factory.create().await?);
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(driver.clone());
        Ok(driver)
    }

    /// Close one driver early and forget it.
    pub(crate) async fn release(&self, driver: &Arc<dyn BrowserDriver>) {
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|d| !Arc::ptr_eq(d, driver));
        if let Err(e) = driver.quit().await {
            tracing::warn!("Failed to quit browser driver: {}", e);
        }
    }

    pub(crate) async fn quit_all(&self) {
        let drivers: Vec<_> = self
            .open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for driver in drivers {
            if let Err(e) = driver.quit().await {
                tracing::warn!("Failed to quit browser driver: {}", e);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn test_pool_quits_every_driver_once() {
        // Given a pool with two open drivers
        let first = Arc::new(ScriptedDriver::new());
        let factory = QueueFactory::new(vec![
            Box::new(first.clone()),
            Box::new(ScriptedDriver::new()),
        ]);
        let pool = DriverPool::new(factory);
        pool.fresh().await.unwrap();
        pool.fresh().await.unwrap();

        // When quitting twice
        pool.quit_all().await;
        pool.quit_all().await;

        // Then the first driver saw exactly one quit
        let quits = first
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|h| *h == "quit")
            .count();
        assert_eq!(quits, 1);
    }

    #[tokio::test]
    async fn test_no_browser_factory_fails() {
        assert!(matches!(
            NoBrowser.create().await,
            Err(ActorError::Browser(_))
        ));
    }
}
