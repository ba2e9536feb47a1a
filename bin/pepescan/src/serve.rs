use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use config::MarketCapConfig;
use feed::{FeedError, FeedHandle, FeedSnapshot, SortKey};
use market_cap::{MarketCapClient, MarketCapResponse};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Debug, clap::Args)]
pub struct ServeArgs {
    /// Address the HTTP server listens on
    #[clap(short, long, env, default_value = "0.0.0.0:3000")]
    listen: SocketAddr,
}

#[derive(Clone)]
pub struct AppState {
    feed: FeedHandle,
    market_cap: Arc<MarketCapClient>,
}

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
pub struct SortRequest {
    key: SortKey,
}

impl ServeArgs {
    pub async fn exec(&self, feed: FeedHandle, market_cap: MarketCapConfig) -> anyhow::Result<()> {
        let state = AppState {
            feed,
            market_cap: Arc::new(MarketCapClient::new(market_cap)?),
        };

        let listener = TcpListener::bind(self.listen).await?;
        info!("Listening on http://{}", self.listen);
        axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("HTTP server stopped");
        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/transfers", get(transfers))
        .route("/api/filters/sender", post(set_sender_filter))
        .route("/api/filters/recipient", post(set_recipient_filter))
        .route("/api/sort", post(trigger_sort))
        .route("/api/pepe", get(market_cap))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<AppState>) -> Response {
    let snapshot = state.feed.snapshot();
    let status = if state.feed.is_closed() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = json!({
        "connectivity": snapshot.connectivity,
        "history": snapshot.history,
        "stale": snapshot.stale,
    });
    (status, Json(body)).into_response()
}

async fn transfers(State(state): State<AppState>) -> Json<FeedSnapshot> {
    Json(state.feed.snapshot().as_ref().clone())
}

async fn set_sender_filter(
    State(state): State<AppState>,
    Json(request): Json<FilterRequest>,
) -> StatusCode {
    accepted(state.feed.set_sender_filter(request.value).await)
}

async fn set_recipient_filter(
    State(state): State<AppState>,
    Json(request): Json<FilterRequest>,
) -> StatusCode {
    accepted(state.feed.set_recipient_filter(request.value).await)
}

async fn trigger_sort(State(state): State<AppState>, Json(request): Json<SortRequest>) -> StatusCode {
    accepted(state.feed.trigger_sort(request.key).await)
}

async fn market_cap(State(state): State<AppState>) -> Json<MarketCapResponse> {
    Json(state.market_cap.market_cap().await)
}

/// Intents are applied by the feed worker, so success only means queued.
fn accepted(result: Result<(), FeedError>) -> StatusCode {
    match result {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            warn!("Rejected view intent: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Config;
    use erc20::Erc20;
    use ethers::types::Address;
    use feed::SystemClock;
    use mock_provider::MockProvider;
    use std::time::Duration;

    fn state() -> AppState {
        let mock = Arc::new(MockProvider::new());
        let contract = Arc::new(Erc20::new(Address::repeat_byte(0x69), "PEPE".to_string(), 18));
        let feed = FeedHandle::start(&Config::default(), mock, contract, Arc::new(SystemClock)).unwrap();
        AppState {
            feed,
            market_cap: Arc::new(MarketCapClient::new(MarketCapConfig::default()).unwrap()),
        }
    }

    async fn wait_for_sort(state: &AppState, key: SortKey) -> Arc<FeedSnapshot> {
        let mut rx = state.feed.watch();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                if snapshot.view.sort.key == Some(key) {
                    return snapshot;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn intents_are_queued() {
        let state = state();
        let status = trigger_sort(
            State(state.clone()),
            Json(SortRequest { key: SortKey::Age }),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        wait_for_sort(&state, SortKey::Age).await;

        let status = set_sender_filter(
            State(state.clone()),
            Json(FilterRequest {
                value: "not-an-address".to_string(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let Json(snapshot) = transfers(State(state.clone())).await;
        assert_eq!(snapshot.view.sender_filter, "");

        state.feed.shutdown().await;
        let status = set_recipient_filter(
            State(state.clone()),
            Json(FilterRequest { value: String::new() }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn market_cap_without_key_is_error() {
        let state = state();
        let Json(response) = market_cap(State(state.clone())).await;
        assert_eq!(response.data, "error");
        state.feed.shutdown().await;
    }

    #[tokio::test]
    async fn health_reports_closed_feed() {
        let state = state();
        assert_eq!(health(State(state.clone())).await.status(), StatusCode::OK);
        state.feed.shutdown().await;
        assert_eq!(
            health(State(state.clone())).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn sort_request_accepts_lowercase_keys() {
        let request: SortRequest = serde_json::from_str(r#"{"key":"amount"}"#).unwrap();
        assert_eq!(request.key, SortKey::Amount);
        assert!(serde_json::from_str::<SortRequest>(r#"{"key":"hash"}"#).is_err());
    }
}
