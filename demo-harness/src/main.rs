use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oidc_confusion::{
    DriverFactory, NoBrowser, OIDC_CONFUSION_WEBDRIVER_URL, TIMEOUTS, WebDriverFactory,
};
use oidc_confusion_axum::{Harness, HarnessOptions, oidc_confusion_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "{}=debug,oidc_confusion=debug,oidc_confusion_axum=debug,tower_http=info",
                    env!("CARGO_CRATE_NAME")
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let drivers: Arc<dyn DriverFactory> = match OIDC_CONFUSION_WEBDRIVER_URL.as_deref() {
        Some(url) => {
            tracing::info!("Driving browsers through WebDriver at {}", url);
            Arc::new(WebDriverFactory::new(url, TIMEOUTS.long)?)
        }
        None => {
            tracing::warn!("OIDC_CONFUSION_WEBDRIVER_URL not set, browser steps will be undetermined");
            Arc::new(NoBrowser)
        }
    };

    let harness = Harness::new(HarnessOptions::from_env(drivers))?;
    let app = oidc_confusion_router(harness);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Harness listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
