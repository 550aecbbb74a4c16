use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Filter used when `RUST_LOG` is unset.
///
/// 0 keeps errors only, 1 (`-v`) adds session lifecycle events and 2+
/// (`-vv`) adds request flow, cache hits and dedup joins.
pub fn default_filter(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "error,fk_runtime=off",
		1 => "info,fk_runtime=warn",
		_ => "debug,reqwest=info,hyper_util=info",
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));
	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_ansi(std::io::stderr().is_terminal())
		.with_target(verbosity > 1)
		.compact()
		.init();
}
