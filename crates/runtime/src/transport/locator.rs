//! Request locator resolution.

use url::Url;

use crate::error::TransportError;

/// Paths with this prefix are same-origin API paths by default.
pub const DEFAULT_SAME_ORIGIN_PREFIX: &str = "/api/";

/// Returns true for `http://` and `https://` locators.
pub fn is_absolute(path: &str) -> bool {
	let lower = path.get(..8).unwrap_or(path).to_ascii_lowercase();
	lower.starts_with("http://") || lower.starts_with("https://")
}

/// Resolves `path` against the base locator.
///
/// Absolute locators and same-origin API paths are returned verbatim. Any
/// other path is appended to `base` with exactly one `/` between them.
pub fn resolve(base: &str, same_origin_prefix: &str, path: &str) -> String {
	if is_absolute(path) || (!same_origin_prefix.is_empty() && path.starts_with(same_origin_prefix)) {
		return path.to_string();
	}
	if base.is_empty() {
		return path.to_string();
	}
	format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Turns a resolved locator into the URL that is actually sent.
///
/// Relative locators are joined to `origin`; query pairs are appended
/// URL-encoded in insertion order.
pub fn to_url(locator: &str, origin: Option<&str>, query: &[(String, String)]) -> Result<Url, TransportError> {
	let absolute = if is_absolute(locator) {
		locator.to_string()
	} else {
		let origin = origin.ok_or_else(|| {
			TransportError::invalid(format!("Relative locator {locator} needs a configured origin"))
		})?;
		format!("{}/{}", origin.trim_end_matches('/'), locator.trim_start_matches('/'))
	};

	let mut url =
		Url::parse(&absolute).map_err(|err| TransportError::invalid(format!("Invalid locator {absolute}: {err}")))?;
	if !query.is_empty() {
		let mut pairs = url.query_pairs_mut();
		for (name, value) in query {
			pairs.append_pair(name, value);
		}
	}
	Ok(url)
}
