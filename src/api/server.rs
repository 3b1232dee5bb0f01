use std::net::SocketAddr;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::*;
use crate::api::middleware::cors::cors_layer;
use crate::api::middleware::verify::verify_sender_ident;
use crate::api::notify::BadgeNotifier;
use crate::db::prelude::{RedisLedgerStore, StoreErr};
use crate::engine::{AggregationEngine, EngineErr};
use crate::util::env::{EnvErr, Var, env_config};
use crate::var;

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AggregationEngine>,
    pub notifier: Option<Arc<BadgeNotifier>>,
}

#[instrument(skip(tx))]
pub async fn router(tx: UnboundedSender<SocketAddr>) -> Result<(), RouteError> {
    let env = env_config().await?;

    let store = RedisLedgerStore::from_pool().await?;
    let state = Arc::new(AppState {
        engine: Arc::new(AggregationEngine::new(Arc::new(store))),
        notifier: BadgeNotifier::from_env(env).map(Arc::new),
    });

    //
    // review event ingest, signed by the review-management collaborator
    let event_routes = Router::new()
        .route("/reviews/created", post(review_created))
        .route("/reviews/deleted", post(review_deleted))
        .route_layer(middleware::from_fn(verify_sender_ident));

    let app = Router::new()
        .merge(event_routes)
        //
        // general
        .route("/", get(|| async { Response::new(Body::empty()) }))
        //
        // read-only projections
        .route("/leaderboard", get(leaderboard))
        .route("/progress/by-id/{user_id}", get(progress_by_id))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .layer(cors_layer(var!(Var::CorsAllowOrigins).await?))
        .with_state(state);

    let port = var!(Var::ServerApiPort).await?.parse::<u16>()?;

    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    tx.send(socket_addr)?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Traces any `RouteError` a handler attached to its response.
#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = ?err, "error occurred inside route handler");
    }

    res
}

#[instrument(skip(tx, rx))]
pub async fn start_server(
    tx: UnboundedSender<SocketAddr>,
    mut rx: UnboundedReceiver<SocketAddr>,
) -> Result<Vec<JoinHandle<()>>, RouteError> {
    tracing::info!("starting server");
    let server_handle = tokio::task::spawn(async move {
        if let Err(e) = router(tx).await {
            tracing::error!(error = ?e, "server exited with error");
        }
    });

    let logging_handle = tokio::task::spawn(async move {
        while !rx.is_closed() {
            if let Some(msg) = rx.recv().await {
                tracing::info!(
                    server_url = &format!("http://127.0.0.1:{}", msg.port()),
                    "server ready"
                );
                break;
            }
        }
    });

    let handles = vec![server_handle, logging_handle];
    Ok(handles)
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Engine(#[from] EngineErr),

    #[error(transparent)]
    Store(#[from] StoreErr),

    #[error(transparent)]
    EnvError(#[from] EnvErr),

    #[error("malformed event payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("invalid server port: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    ReadySignal(#[from] SendError<SocketAddr>),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let status = match &self {
            RouteError::Engine(EngineErr::Validation { .. }) => StatusCode::BAD_REQUEST,
            RouteError::Engine(EngineErr::NotFound(_)) => StatusCode::NOT_FOUND,
            RouteError::Engine(EngineErr::Contention { .. }) => StatusCode::CONFLICT,
            RouteError::Engine(EngineErr::Persistence(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            RouteError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.to_string();
        let mut response = (status, Json(ErrorResponse { message })).into_response();
        response.extensions_mut().insert(Arc::new(self));

        response
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::prelude::UserId;

    #[test]
    fn test_error_status_mapping() {
        let validation: RouteError = EngineErr::Validation { field: "category" }.into();
        assert_eq!(validation.into_response().status(), StatusCode::BAD_REQUEST);

        let contention: RouteError = EngineErr::Contention {
            user_id: UserId::from("u1"),
            attempts: 8,
        }
        .into();
        assert_eq!(contention.into_response().status(), StatusCode::CONFLICT);

        let unknown: RouteError = EngineErr::NotFound(UserId::from("ghost")).into();
        assert_eq!(unknown.into_response().status(), StatusCode::NOT_FOUND);

        let persistence: RouteError =
            EngineErr::Persistence(StoreErr::VersionConflict(UserId::from("u1"))).into();
        assert_eq!(
            persistence.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
