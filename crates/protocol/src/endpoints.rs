//! Fixed session endpoint paths consumed by the session manager.

/// Exchanges credentials for a user and token.
pub const LOGIN: &str = "/auth/login";
/// Invalidates the current token server-side (best effort).
pub const LOGOUT: &str = "/auth/logout";
/// Exchanges a refresh credential for a new token.
pub const REFRESH: &str = "/auth/refresh";
/// Asks the server whether the current token is still valid.
pub const VALIDATE: &str = "/auth/validate";
/// Reads (`GET`) or updates (`PUT`) the current user's profile.
pub const ME: &str = "/auth/me";
