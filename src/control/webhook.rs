//! Local webhook receiver
//!
//! Accepts POSTed JSON events on any path and forwards them into the control
//! queue. Every accepted POST is answered 200; validation happens at the queue
//! boundary. If the listener dies the dispatcher is told via a `Terminated`
//! event.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::control::event::{ControlEvent, ControlSender, EventError};

/// Largest accepted request body
const MAX_BODY: usize = 1 << 20;

/// Time allowed to deliver one request body
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Routes for the event receiver
pub fn router(control: ControlSender) -> Router {
    Router::new()
        .route("/", post(receive))
        .route("/{*path}", post(receive))
        .layer(DefaultBodyLimit::max(MAX_BODY))
        .layer(middleware::from_fn(read_timeout))
        .with_state(control)
}

/// Bind and serve until the listener fails
pub async fn serve(addr: SocketAddr, control: ControlSender) {
    let result = match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Listening for events on http://{}", addr);
            serve_listener(listener, control.clone()).await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("Event listener stopped: {}", e);
        let terminated = ControlEvent::Terminated {
            error: Some(e.to_string()),
        };
        if control.push(terminated).is_err() {
            warn!("Control queue closed, listener failure not delivered");
        }
    }
}

/// Serve on an already-bound listener
pub async fn serve_listener(listener: TcpListener, control: ControlSender) -> std::io::Result<()> {
    axum::serve(listener, router(control)).await
}

async fn receive(State(control): State<ControlSender>, body: Bytes) -> StatusCode {
    // Invalid objects are logged and dropped by the queue
    if let Err(EventError::Closed) = control.push_json(&body) {
        warn!("Control queue closed, event dropped");
    }
    StatusCode::OK
}

/// Drop clients that stall while sending their request
async fn read_timeout(request: Request, next: Next) -> Response {
    match tokio::time::timeout(REQUEST_TIMEOUT, next.run(request)).await {
        Ok(response) => response,
        Err(_) => StatusCode::REQUEST_TIMEOUT.into_response(),
    }
}
