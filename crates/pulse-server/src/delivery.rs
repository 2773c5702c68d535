//! `POST /api/messages/deliver`: push a persisted chat message to its recipient.
//!
//! The REST layer that stores messages calls this after a successful write.
//! Delivery is best-effort; an offline recipient is not an error.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use metrics::counter;
use pulse_core::events::ChatMessage;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::metrics::DELIVERY_REQUESTS_TOTAL;
use crate::server::AppState;

/// Response body.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct DeliveryResponse {
    /// Whether the recipient was online and the frame was queued.
    pub delivered: bool,
}

/// Deliver handler.
pub async fn deliver_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<DeliveryResponse>, (StatusCode, Json<Value>)> {
    let message = ChatMessage::from_value(body).map_err(|e| {
        counter!(DELIVERY_REQUESTS_TOTAL, "outcome" => "invalid").increment(1);
        (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
    })?;
    let receiver = message.receiver.clone();
    let delivered = state.hub.deliver_message(message);
    let outcome = if delivered { "delivered" } else { "offline" };
    counter!(DELIVERY_REQUESTS_TOTAL, "outcome" => outcome).increment(1);
    debug!(%receiver, delivered, "message delivery requested");
    Ok(Json(DeliveryResponse { delivered }))
}
