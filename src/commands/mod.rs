// Commands module: text commands answered with JSON envelopes.

pub mod handler;

pub use handler::handle_command;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

/// Status code plus a `{success, data}` or `{success, message}` body.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResponse {
    pub status: u16,
    pub body: Value,
}

impl CommandResponse {
    pub fn ok<T: Serialize>(data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                status: 200,
                body: json!({ "success": true, "data": data }),
            },
            Err(e) => {
                error!("Failed to serialize response: {}", e);
                Self::fail(500, "Internal server error")
            }
        }
    }

    /// Like [`ok`](Self::ok) but with status 201.
    pub fn created<T: Serialize>(data: T) -> Self {
        let mut response = Self::ok(data);
        if response.is_success() {
            response.status = 201;
        }
        response
    }

    pub fn fail(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "success": false, "message": message.into() }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
