use colored::Colorize;
use taxon::commands::command_argument_builder;
use taxon::handlers::{
    CommandStatus, handle_ancestors, handle_nodes, handle_reconcile, handle_run, handle_sources,
    handle_verify,
};
use tracing::Level;

fn init_tracing(quiet: bool, verbose: bool) {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let chosen_command = command_argument_builder().get_matches();
    init_tracing(
        chosen_command.get_flag("quiet"),
        chosen_command.get_flag("verbose"),
    );

    let result = match chosen_command.subcommand() {
        Some(("ancestors", primary_command)) => handle_ancestors(primary_command).await,
        Some(("nodes", primary_command)) => handle_nodes(primary_command).await,
        Some(("reconcile", primary_command)) => handle_reconcile(primary_command),
        Some(("verify", primary_command)) => handle_verify(primary_command),
        Some(("sources", primary_command)) => handle_sources(primary_command),
        Some(("run", primary_command)) => handle_run(primary_command),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    match result {
        Ok(CommandStatus::Passed) => {}
        Ok(CommandStatus::Failed) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }
}
