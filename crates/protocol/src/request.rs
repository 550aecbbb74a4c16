//! Request descriptors and their deterministic signatures.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	#[default]
	Get,
	Head,
	Post,
	Put,
	Patch,
	Delete,
	Options,
}

impl Method {
	pub fn as_str(&self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Head => "HEAD",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
			Method::Options => "OPTIONS",
		}
	}

	/// Returns true for methods whose results may be cached.
	pub fn is_read_only(&self) -> bool {
		matches!(self, Method::Get | Method::Head)
	}
}

impl fmt::Display for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when parsing an unknown method name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMethod(pub String);

impl fmt::Display for UnknownMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "unknown HTTP method: {}", self.0)
	}
}

impl std::error::Error for UnknownMethod {}

impl FromStr for Method {
	type Err = UnknownMethod;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_uppercase().as_str() {
			"GET" => Ok(Method::Get),
			"HEAD" => Ok(Method::Head),
			"POST" => Ok(Method::Post),
			"PUT" => Ok(Method::Put),
			"PATCH" => Ok(Method::Patch),
			"DELETE" => Ok(Method::Delete),
			"OPTIONS" => Ok(Method::Options),
			_ => Err(UnknownMethod(s.to_string())),
		}
	}
}

/// Header list with case-insensitive, unique names.
///
/// Insertion order is preserved for sending; [`Headers::canonical`] gives the
/// order-independent form used in signatures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct Headers {
	entries: Vec<(String, String)>,
}

impl Headers {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets `name` to `value`, replacing any existing entry regardless of case.
	///
	/// Returns the replaced value.
	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
		let name = name.into();
		let value = value.into();
		match self.position(&name) {
			Some(idx) => {
				let (_, old) = std::mem::replace(&mut self.entries[idx], (name, value));
				Some(old)
			}
			None => {
				self.entries.push((name, value));
				None
			}
		}
	}

	/// Sets `name` only when no entry with that name exists.
	pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();
		if self.position(&name).is_none() {
			self.entries.push((name, value.into()));
		}
	}

	pub fn get(&self, name: &str) -> Option<&str> {
		self.position(name).map(|idx| self.entries[idx].1.as_str())
	}

	pub fn contains(&self, name: &str) -> bool {
		self.position(name).is_some()
	}

	pub fn remove(&mut self, name: &str) -> Option<String> {
		self.position(name).map(|idx| self.entries.remove(idx).1)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Lowercased, name-sorted pairs, each name and value length-prefixed.
	pub fn canonical(&self) -> String {
		let mut pairs: Vec<(String, &str)> = self
			.entries
			.iter()
			.map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
			.collect();
		pairs.sort();
		let mut out = String::new();
		for (k, v) in &pairs {
			push_field(&mut out, k);
			push_field(&mut out, v);
		}
		out
	}

	fn position(&self, name: &str) -> Option<usize> {
		self.entries.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))
	}
}

impl From<BTreeMap<String, String>> for Headers {
	fn from(map: BTreeMap<String, String>) -> Self {
		let mut headers = Headers::new();
		for (k, v) in map {
			headers.insert(k, v);
		}
		headers
	}
}

impl From<Headers> for BTreeMap<String, String> {
	fn from(headers: Headers) -> Self {
		headers.entries.into_iter().collect()
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut headers = Headers::new();
		for (k, v) in iter {
			headers.insert(k, v);
		}
		headers
	}
}

/// One field of a multipart body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormPart {
	pub name: String,
	pub value: FormValue,
}

/// Multipart field content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FormValue {
	Text {
		value: String,
	},
	File {
		file_name: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		content_type: Option<String>,
		#[serde(with = "crate::request::base64_bytes")]
		bytes: Vec<u8>,
	},
}

/// Request body.
///
/// Binary and multipart bodies are sent untouched and leave the content type
/// to the HTTP stack. JSON bodies are serialized by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Body {
	Json(Value),
	Text(String),
	Binary(#[serde(with = "crate::request::base64_bytes")] Vec<u8>),
	Multipart(Vec<FormPart>),
}

impl Body {
	/// Returns true when the body must reach the wire unmodified.
	pub fn is_passthrough(&self) -> bool {
		matches!(self, Body::Binary(_) | Body::Multipart(_))
	}

	/// Variant-tagged form of the body, so equal text in different kinds
	/// never compares equal.
	fn fingerprint(&self) -> String {
		use base64::Engine;
		use base64::engine::general_purpose::STANDARD;

		match self {
			Body::Json(value) => format!("json:{value}"),
			Body::Text(text) => format!("text:{text}"),
			Body::Binary(bytes) => format!("binary:{}", STANDARD.encode(bytes)),
			Body::Multipart(parts) => {
				let mut out = String::from("multipart:");
				for part in parts {
					push_field(&mut out, &part.name);
					push_field(&mut out, &part.value.fingerprint());
				}
				out
			}
		}
	}
}

impl FormValue {
	fn fingerprint(&self) -> String {
		use base64::Engine;
		use base64::engine::general_purpose::STANDARD;

		match self {
			FormValue::Text { value } => format!("text:{value}"),
			FormValue::File {
				file_name,
				content_type,
				bytes,
			} => {
				let mut out = String::from("file:");
				push_field(&mut out, file_name);
				push_field(&mut out, content_type.as_deref().unwrap_or(""));
				out.push_str(&STANDARD.encode(bytes));
				out
			}
		}
	}
}

/// Appends `<byte length>:<field>` so adjacent fields cannot run together.
fn push_field(out: &mut String, field: &str) {
	let _ = write!(out, "{}:{field}", field.len());
}

/// Caching intent carried by a descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CachePolicy {
	/// Cache only when the caller supplies an explicit cache key.
	#[default]
	Default,
	/// Cache read-only results under the request signature.
	Cache,
	/// Never read from or write to the cache.
	NoStore,
}

/// Deterministic identity of a logical request.
///
/// Built from method, path, body, query parameters and headers. Two
/// descriptors with equal signatures are the same request for dedup and
/// caching purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestSignature(String);

impl RequestSignature {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for RequestSignature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for RequestSignature {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

/// Declarative description of a single request.
///
/// Built with the consuming `with_*`/shorthand methods; once handed to the
/// runtime it is never modified in place. Interceptors receive it by value and
/// return a new descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
	method: Method,
	path: String,
	#[serde(default, skip_serializing_if = "Headers::is_empty")]
	headers: Headers,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	body: Option<Body>,
	#[serde(default, rename = "queryParams", skip_serializing_if = "Vec::is_empty")]
	query: Vec<(String, String)>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	timeout_ms: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	retries: Option<u32>,
	#[serde(default)]
	cache_policy: CachePolicy,
	#[serde(default)]
	auth_required: bool,
}

impl RequestDescriptor {
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			headers: Headers::new(),
			body: None,
			query: Vec::new(),
			timeout_ms: None,
			retries: None,
			cache_policy: CachePolicy::Default,
			auth_required: false,
		}
	}

	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::Put, path)
	}

	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::Patch, path)
	}

	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name, value);
		self
	}

	pub fn with_headers(mut self, headers: Headers) -> Self {
		self.headers = headers;
		self
	}

	pub fn with_body(mut self, body: Body) -> Self {
		self.body = Some(body);
		self
	}

	pub fn with_json(self, value: Value) -> Self {
		self.with_body(Body::Json(value))
	}

	/// Serializes `data` into a JSON body.
	pub fn with_json_body<T: Serialize>(self, data: &T) -> Result<Self, serde_json::Error> {
		Ok(self.with_json(serde_json::to_value(data)?))
	}

	pub fn with_text(self, text: impl Into<String>) -> Self {
		self.with_body(Body::Text(text.into()))
	}

	pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((name.into(), value.into()));
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout_ms = Some(timeout.as_millis() as u64);
		self
	}

	pub fn with_retries(mut self, retries: u32) -> Self {
		self.retries = Some(retries);
		self
	}

	pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
		self.cache_policy = policy;
		self
	}

	pub fn with_auth_required(mut self, required: bool) -> Self {
		self.auth_required = required;
		self
	}

	/// Shorthand for `with_auth_required(true)`.
	pub fn authenticated(self) -> Self {
		self.with_auth_required(true)
	}

	pub fn method(&self) -> Method {
		self.method
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	pub fn headers(&self) -> &Headers {
		&self.headers
	}

	pub fn body(&self) -> Option<&Body> {
		self.body.as_ref()
	}

	pub fn query(&self) -> &[(String, String)] {
		&self.query
	}

	pub fn timeout(&self) -> Option<Duration> {
		self.timeout_ms.map(Duration::from_millis)
	}

	pub fn retries(&self) -> Option<u32> {
		self.retries
	}

	pub fn cache_policy(&self) -> CachePolicy {
		self.cache_policy
	}

	pub fn auth_required(&self) -> bool {
		self.auth_required
	}

	/// Computes the request signature.
	///
	/// Timeout, retries, cache policy and the auth flag are execution hints
	/// and do not take part.
	pub fn signature(&self) -> RequestSignature {
		let body = self.body.as_ref().map(Body::fingerprint).unwrap_or_default();
		let mut params = String::new();
		for (name, value) in &self.query {
			push_field(&mut params, name);
			push_field(&mut params, value);
		}

		let headers = self.headers.canonical();
		let mut out = format!("{} ", self.method);
		for field in [self.path.as_str(), body.as_str(), params.as_str(), headers.as_str()] {
			push_field(&mut out, field);
			out.push('|');
		}
		RequestSignature(out)
	}
}

pub(crate) mod base64_bytes {
	use base64::Engine;
	use base64::engine::general_purpose::STANDARD;
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&STANDARD.encode(bytes))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let encoded = String::deserialize(deserializer)?;
		STANDARD.decode(encoded).map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn headers_are_case_insensitive_and_unique() {
		let mut headers = Headers::new();
		headers.insert("Content-Type", "text/plain");
		let old = headers.insert("content-type", "application/json");

		assert_eq!(old.as_deref(), Some("text/plain"));
		assert_eq!(headers.len(), 1);
		assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
	}

	#[test]
	fn insert_if_absent_keeps_existing_value() {
		let mut headers = Headers::new();
		headers.insert("Accept", "text/html");
		headers.insert_if_absent("accept", "application/json");
		assert_eq!(headers.get("Accept"), Some("text/html"));
	}

	#[test]
	fn signature_ignores_header_order_and_case() {
		let a = RequestDescriptor::get("/posts")
			.with_header("X-One", "1")
			.with_header("x-two", "2");
		let b = RequestDescriptor::get("/posts")
			.with_header("x-two", "2")
			.with_header("x-one", "1");
		assert_eq!(a.signature(), b.signature());
	}

	#[test]
	fn signature_distinguishes_body_and_params() {
		let base = RequestDescriptor::post("/search");
		let a = base.clone().with_json(json!({"q": "rust"}));
		let b = base.clone().with_json(json!({"q": "go"}));
		let c = base.clone().with_json(json!({"q": "rust"})).with_query("page", "2");

		assert_ne!(a.signature(), b.signature());
		assert_ne!(a.signature(), c.signature());
		assert!(a.signature().as_str().starts_with("POST 7:/search|"));
	}

	#[test]
	fn json_and_text_bodies_have_distinct_signatures() {
		let json = RequestDescriptor::post("/search").with_body(Body::Json(json!({"q": 1})));
		let text = RequestDescriptor::post("/search").with_body(Body::Text(r#"{"q":1}"#.into()));
		assert_ne!(json.signature(), text.signature());
	}

	#[test]
	fn multipart_parts_are_distinguished() {
		let text_part = |name: &str, value: &str| FormPart {
			name: name.into(),
			value: FormValue::Text { value: value.into() },
		};
		let a = RequestDescriptor::post("/upload").with_body(Body::Multipart(vec![text_part("a", "1")]));
		let b = RequestDescriptor::post("/upload").with_body(Body::Multipart(vec![text_part("a", "2")]));
		let c = RequestDescriptor::post("/upload").with_body(Body::Multipart(vec![FormPart {
			name: "a".into(),
			value: FormValue::File {
				file_name: "1".into(),
				content_type: None,
				bytes: Vec::new(),
			},
		}]));

		assert_ne!(a.signature(), b.signature());
		assert_ne!(a.signature(), c.signature());
	}

	#[test]
	fn separators_inside_fields_cannot_forge_a_match() {
		let a = RequestDescriptor::get("/a|b").with_query("x", "1");
		let b = RequestDescriptor::get("/a").with_query("b|x", "1");
		assert_ne!(a.signature(), b.signature());

		let c = RequestDescriptor::get("/h").with_header("x-a", "1;x-b:2");
		let d = RequestDescriptor::get("/h").with_header("x-a", "1").with_header("x-b", "2");
		assert_ne!(c.signature(), d.signature());
	}

	#[test]
	fn signature_ignores_execution_hints() {
		let a = RequestDescriptor::get("/feed");
		let b = RequestDescriptor::get("/feed")
			.with_retries(3)
			.with_timeout(Duration::from_secs(2))
			.authenticated();
		assert_eq!(a.signature(), b.signature());
	}

	#[test]
	fn descriptor_serializes_with_external_field_names() {
		let descriptor = RequestDescriptor::get("/coupons")
			.with_query("store", "7")
			.with_timeout(Duration::from_millis(1500))
			.authenticated();
		let value = serde_json::to_value(&descriptor).unwrap();

		assert_eq!(value["method"], "GET");
		assert_eq!(value["queryParams"][0][0], "store");
		assert_eq!(value["timeoutMs"], 1500);
		assert_eq!(value["authRequired"], true);

		let back: RequestDescriptor = serde_json::from_value(value).unwrap();
		assert_eq!(back, descriptor);
	}

	#[test]
	fn binary_body_is_base64_on_the_wire() {
		let body = Body::Binary(vec![0, 1, 2, 255]);
		let value = serde_json::to_value(&body).unwrap();
		assert_eq!(value, json!({"type": "binary", "value": "AAEC/w=="}));
		assert!(body.is_passthrough());
	}

	#[test]
	fn method_parses_case_insensitively() {
		assert_eq!("patch".parse::<Method>().unwrap(), Method::Patch);
		assert!("FETCH".parse::<Method>().is_err());
		assert!(Method::Head.is_read_only());
		assert!(!Method::Post.is_read_only());
	}
}
