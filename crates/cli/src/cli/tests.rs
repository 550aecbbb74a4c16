use clap::Parser;
use fetchkit::Body;
use serde_json::json;

use super::*;

fn request(args: &[&str]) -> RequestCmd {
	let mut argv = vec!["fk", "request"];
	argv.extend_from_slice(args);
	match Cli::parse_from(argv).command {
		Commands::Request(cmd) => cmd,
		other => panic!("expected request, got {other:?}"),
	}
}

#[test]
fn parses_request_with_headers_query_and_body() {
	let cmd = request(&[
		"post",
		"/posts",
		"-H",
		"X-Trace: abc",
		"-q",
		"draft=true",
		"--json",
		r#"{"title":"hi"}"#,
		"--auth",
		"--retries",
		"2",
		"--retry-delay-ms",
		"100",
	]);

	let descriptor = cmd.request.descriptor().unwrap();
	assert_eq!(descriptor.method(), Method::Post);
	assert_eq!(descriptor.path(), "/posts");
	assert_eq!(descriptor.headers().get("x-trace"), Some("abc"));
	assert_eq!(descriptor.query(), &[("draft".to_string(), "true".to_string())]);
	assert_eq!(descriptor.body(), Some(&Body::Json(json!({"title": "hi"}))));
	assert!(descriptor.auth_required());

	let options = cmd.options();
	assert!(options.manual);
	assert_eq!(options.retries, 2);
	assert_eq!(options.backoff(1), Duration::from_millis(200));
	assert!(!options.retry_system_errors);
}

#[test]
fn rejects_malformed_header_query_and_json() {
	assert!(request(&["get", "/x", "-H", "no-colon"]).request.descriptor().is_err());
	assert!(request(&["get", "/x", "-H", ": v"]).request.descriptor().is_err());
	assert!(request(&["get", "/x", "-q", "novalue"]).request.descriptor().is_err());
	assert!(request(&["post", "/x", "--json", "{"]).request.descriptor().is_err());
}

#[test]
fn unknown_method_is_a_parse_error() {
	assert!(Cli::try_parse_from(["fk", "request", "FETCH", "/x"]).is_err());
}

#[test]
fn global_flags_follow_subcommands() {
	let cli = Cli::parse_from(["fk", "status", "-vv", "--format", "text", "--base-url", "http://h"]);
	assert_eq!(cli.verbose, 2);
	assert_eq!(cli.format, OutputFormat::Text);
	assert_eq!(cli.base_url.as_deref(), Some("http://h"));
	assert_eq!(cli.command.name(), "status");
}

#[test]
fn login_requires_credentials() {
	assert!(Cli::try_parse_from(["fk", "login", "--email", "a@b.c"]).is_err());
	let cli = Cli::parse_from(["fk", "login", "--email", "a@b.c", "--password", "pw"]);
	assert!(matches!(cli.command, Commands::Login(ref args) if args.email == "a@b.c"));
}
