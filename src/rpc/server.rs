//! HTTP transport for the XML-RPC gateway.
//!
//! Calls arrive as `POST` bodies on the configured path (and on `/`). Each one
//! is decoded, handled on the blocking pool under the state lock, and answered
//! with a `text/xml` body. Decode errors and unknown methods are faults, sent
//! with status 200 like any other XML-RPC response.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use super::gateway::{self, Gema, Reply};
use super::xmlrpc::{encode_fault, encode_response, parse_call};
use crate::error::RpcError;
use crate::settings::ServerSettings;

/// Fault code used for every fault the gateway raises.
pub const FAULT_CODE: i64 = 1;

#[derive(Clone)]
pub struct AppState {
    pub gema: Arc<Mutex<Gema>>,
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(gema: Gema) -> Self {
        Self {
            gema: Arc::new(Mutex::new(gema)),
            shutdown: Arc::new(Notify::new()),
        }
    }
}

/// Builds the router serving XML-RPC calls on `rpc_path` and `/`.
pub fn build_app(state: AppState, rpc_path: &str) -> Router {
    let mut router = Router::new().route("/", post(rpc_handler));
    if rpc_path != "/" {
        router = router.route(rpc_path, post(rpc_handler));
    }
    router.with_state(state)
}

async fn rpc_handler(State(state): State<AppState>, body: String) -> impl IntoResponse {
    let gema = Arc::clone(&state.gema);
    let outcome = tokio::task::spawn_blocking(move || dispatch(&gema, &body)).await;

    let xml = match outcome {
        Ok(Ok(reply)) => {
            if reply.shutdown {
                state.shutdown.notify_one();
            }
            encode_response(&reply.value)
        }
        Ok(Err(err)) => {
            warn!(error = %err, "rpc call rejected");
            encode_fault(FAULT_CODE, &err.to_string())
        }
        Err(err) => {
            error!(error = %err, "rpc handler task failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                err.to_string(),
            );
        }
    };
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/xml")], xml)
}

fn dispatch(gema: &Mutex<Gema>, body: &str) -> Result<Reply, RpcError> {
    let call = parse_call(body)?;
    let mut gema = gema.lock().unwrap_or_else(PoisonError::into_inner);
    gateway::handle(&mut gema, &call)
}

/// Serves the gateway until a `shutdown` call completes.
///
/// After the shutdown call is answered the listener stays up for the
/// configured delay so the response can reach the client.
pub async fn serve(settings: &ServerSettings, gema: Gema) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    let addr: SocketAddr = listener.local_addr()?;

    println!("Starting server on port {}.", addr.port());
    println!("For help, call the 'get_endpoints' method or consult the documentation.");
    info!(bind = %addr, path = %settings.rpc_path, "gEMA gateway listening");

    let state = AppState::new(gema);
    let shutdown = Arc::clone(&state.shutdown);
    let delay = settings.shutdown_delay();
    let app = build_app(state, &settings.rpc_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.notified().await;
            tokio::time::sleep(delay).await;
            info!("shutting down gEMA gateway");
        })
        .await
}
