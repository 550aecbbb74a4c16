//! Session model: tokens, users, the published session snapshot and
//! offline actions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::RequestDescriptor;

fn default_token_type() -> String {
	"Bearer".to_string()
}

/// Access credential issued by the auth endpoints.
///
/// `expires_at` is an absolute Unix timestamp in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
	pub access_token: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<String>,
	pub expires_at: i64,
	#[serde(default = "default_token_type")]
	pub token_type: String,
}

impl AuthToken {
	pub fn new(access_token: impl Into<String>, expires_at: i64) -> Self {
		Self {
			access_token: access_token.into(),
			refresh_token: None,
			expires_at,
			token_type: default_token_type(),
		}
	}

	pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
		self.refresh_token = Some(refresh_token.into());
		self
	}

	/// Milliseconds until expiry, clamped at zero.
	pub fn remaining_ms(&self, now_ms: i64) -> u64 {
		self.expires_at.saturating_sub(now_ms).max(0) as u64
	}

	pub fn is_expired(&self, now_ms: i64) -> bool {
		self.remaining_ms(now_ms) == 0
	}

	/// Value for the `Authorization` header, e.g. `Bearer abc`.
	pub fn authorization(&self) -> String {
		format!("{} {}", self.token_type, self.access_token)
	}

	/// Short stable identifier of the access credential.
	///
	/// Used to key refresh leases without writing the credential itself.
	pub fn fingerprint(&self) -> String {
		let mut hasher = DefaultHasher::new();
		self.access_token.hash(&mut hasher);
		format!("{:016x}", hasher.finish())
	}
}

/// Authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
	pub id: String,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub permissions: Option<Vec<String>>,
}

impl User {
	pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			email: None,
			role: None,
			permissions: None,
		}
	}

	pub fn with_role(mut self, role: impl Into<String>) -> Self {
		self.role = Some(role.into());
		self
	}

	pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.permissions = Some(permissions.into_iter().map(Into::into).collect());
		self
	}

	pub fn has_role(&self, role: &str) -> bool {
		self.role.as_deref() == Some(role)
	}

	pub fn has_permission(&self, permission: &str) -> bool {
		self.permissions
			.as_ref()
			.is_some_and(|perms| perms.iter().any(|p| p == permission))
	}
}

/// Login credentials posted to `/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
	pub email: String,
	pub password: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub remember_me: Option<bool>,
}

impl Credentials {
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			email: email.into(),
			password: password.into(),
			remember_me: None,
		}
	}
}

/// Body of a login or refresh response. Refresh responses may omit the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<User>,
	pub token: AuthToken,
}

/// Body posted to `/auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
	pub refresh_token: String,
}

/// Body returned by `/auth/validate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateResponse {
	#[serde(default)]
	pub valid: bool,
}

/// Authentication state machine position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
	#[default]
	LoggedOut,
	Authenticating,
	Authenticated,
	Refreshing,
}

/// Snapshot of the session published to collaborators.
///
/// A new value is built for every change; holders never observe a partial
/// update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
	pub user: Option<User>,
	pub token: Option<AuthToken>,
	pub is_authenticated: bool,
	pub is_session_loading: bool,
	pub remaining_session_ms: u64,
	pub is_network_online: bool,
	pub status: SessionStatus,
}

impl Default for SessionState {
	fn default() -> Self {
		Self {
			user: None,
			token: None,
			is_authenticated: false,
			is_session_loading: false,
			remaining_session_ms: 0,
			is_network_online: true,
			status: SessionStatus::LoggedOut,
		}
	}
}

/// Operation captured while offline and replayed on reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineAction {
	pub id: u64,
	pub kind: String,
	pub payload: Value,
	/// Unix epoch milliseconds.
	pub created_at: i64,
}

impl OfflineAction {
	/// Kind used for actions that carry a serialized [`RequestDescriptor`].
	pub const REQUEST_KIND: &'static str = "request";

	pub fn new(id: u64, kind: impl Into<String>, payload: Value, created_at: i64) -> Self {
		Self {
			id,
			kind: kind.into(),
			payload,
			created_at,
		}
	}

	/// Returns the descriptor carried by a `request` action.
	pub fn request(&self) -> Option<RequestDescriptor> {
		if self.kind != Self::REQUEST_KIND {
			return None;
		}
		serde_json::from_value(self.payload.clone()).ok()
	}
}
