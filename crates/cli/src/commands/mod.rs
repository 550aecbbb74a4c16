//! Command dispatch.
//!
//! Every invocation builds one [`Client`] over the session file, restores
//! the persisted session, runs a single command and prints its envelope.

mod offline;
mod request;
mod session;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use fetchkit::Client;
use serde::Serialize;

use crate::cli::{Cli, Commands};
use crate::config::{StatePaths, apply_overrides, load_config};
use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, print_result};
use crate::storage::FileStorage;

/// Builds the client for this invocation and restores its session.
pub fn build_client(cli: &Cli) -> Result<Client> {
	let paths = StatePaths::resolve(cli.config.as_deref(), cli.data_dir.as_deref());
	let config = apply_overrides(load_config(&paths.config)?, cli);
	tracing::debug!(config = %paths.config.display(), session = %paths.session.display(), "resolved paths");

	let client = Client::builder(config)
		.with_storage(Arc::new(FileStorage::new(&paths.session)))
		.build()
		.context("failed to build HTTP client")?;

	if client.session().restore()? {
		tracing::info!("using stored session");
	}
	Ok(client)
}

pub async fn dispatch(cli: Cli) -> Result<()> {
	let started = Instant::now();
	let format = cli.format;
	let name = cli.command.name();
	let client = build_client(&cli)?;

	match &cli.command {
		Commands::Request(cmd) => emit(name, request::run(&client, cmd).await?, started, format),
		Commands::Login(args) => emit(name, session::login(&client, args).await?, started, format),
		Commands::Logout => emit(name, session::logout(&client).await, started, format),
		Commands::Whoami => emit(name, session::whoami(&client).await?, started, format),
		Commands::Status => emit(name, session::status(&client), started, format),
		Commands::Queue(args) => emit(name, offline::queue(&client, args)?, started, format),
		Commands::Sync => emit(name, offline::sync(&client).await, started, format),
	}
	Ok(())
}

fn emit<T: Serialize>(command: &str, data: T, started: Instant, format: OutputFormat) {
	let result = ResultBuilder::new(command)
		.data(data)
		.timings(started.elapsed())
		.build();
	print_result(&result, format);
}
