use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

/// Error payload used by the routes that answer with bare JSON rows
/// (events, past-events, orders, auth).
#[derive(Debug, Serialize, Clone)]
pub struct ErrorBody {
    pub error: String,
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// Success payload for the `{ success, data }` route family
/// (products, press, stories, ideas, subscriptions, talk-section, uploads,
/// filters).
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

pub fn envelope<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

#[derive(Debug, Serialize, Clone)]
pub struct EnvelopeError {
    pub success: bool,
    pub error: String,
}

pub fn envelope_error(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<EnvelopeError>) {
    (
        status,
        Json(EnvelopeError {
            success: false,
            error: message.into(),
        }),
    )
}

#[derive(Debug, Serialize)]
pub struct EnvelopeMessage {
    pub success: bool,
    pub message: String,
}

pub fn envelope_message(message: impl Into<String>) -> Json<EnvelopeMessage> {
    Json(EnvelopeMessage {
        success: true,
        message: message.into(),
    })
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

pub fn message(message: impl Into<String>) -> Json<Message> {
    Json(Message {
        message: message.into(),
    })
}
