use fetchkit::{Client, Error, Payload};
use serde_json::Value;

use crate::cli::RequestCmd;
use crate::error::Result;
use crate::output::ResponseData;

/// Sends the request through a coordinator. Ctrl-C cancels it.
pub async fn run(client: &Client, cmd: &RequestCmd) -> Result<ResponseData> {
	let coordinator = client.coordinator(cmd.request.descriptor()?, cmd.options());

	let payload = tokio::select! {
		result = coordinator.run() => result?,
		_ = tokio::signal::ctrl_c() => {
			coordinator.cancel();
			return Err(Error::Cancelled.into());
		}
	};

	Ok(ResponseData {
		status: coordinator.state().status,
		body: payload_to_json(payload),
	})
}

/// JSON stays structured, text becomes a string and binary bodies are
/// summarized by size.
pub fn payload_to_json(payload: Payload) -> Value {
	match payload {
		Payload::Empty => Value::Null,
		Payload::Json(value) => value,
		Payload::Text(text) => Value::String(text),
		Payload::Binary(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
	}
}
