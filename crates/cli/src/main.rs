use clap::Parser;
use fk_cli::cli::Cli;
use fk_cli::commands;
use fk_cli::error::CliError;
use fk_cli::logging;
use fk_cli::output::{self, CommandResult, OutputFormat, ResultBuilder};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;
	let command = cli.command.name();

	if let Err(err) = commands::dispatch(cli).await {
		handle_error(command, err, format);
		std::process::exit(1);
	}
}

fn handle_error(command: &str, err: CliError, format: OutputFormat) {
	let error = err.to_command_error();

	// Humans read stderr; scripts read the envelope on stdout.
	output::print_error_stderr(&error);

	if format != OutputFormat::Text {
		let result: CommandResult<()> = ResultBuilder::new(command).error(error).build();
		output::print_result(&result, format);
	}
}
