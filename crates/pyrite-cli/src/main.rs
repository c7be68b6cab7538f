use atty::Stream;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use pyrite_core::{
    AddRequest, CommandContext, CommandStatus, ConfigAction, ExecutionOutcome, GlobalOptions,
    RemoveRequest, SyncRequest, UpdateRequest, UseRequest,
};
use serde_json::Value;

mod cli;
mod style;

use cli::{Command, ConfigCommand, PyriteCli};
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = PyriteCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
    };

    let mut ctx = CommandContext::new(global).map_err(|err| eyre!("{err:?}"))?;
    let outcome = dispatch(&mut ctx, &cli.command).map_err(|err| eyre!("{err:?}"))?;
    let code = emit_output(&cli, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("pyrite={level},pyrite_core={level},pyrite_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn dispatch(ctx: &mut CommandContext, command: &Command) -> anyhow::Result<ExecutionOutcome> {
    match command {
        Command::Lock => pyrite_core::project_lock(ctx),
        Command::Sync {
            clean,
            dry_run,
            workers,
        } => pyrite_core::project_sync(
            ctx,
            &SyncRequest {
                clean: *clean,
                dry_run: *dry_run,
                workers: *workers,
            },
        ),
        Command::Add { specs } => pyrite_core::project_add(
            ctx,
            &AddRequest {
                specs: specs.clone(),
            },
        ),
        Command::Remove { names } => pyrite_core::project_remove(
            ctx,
            &RemoveRequest {
                names: names.clone(),
            },
        ),
        Command::Update { names } => pyrite_core::project_update(
            ctx,
            &UpdateRequest {
                names: names.clone(),
            },
        ),
        Command::List => pyrite_core::project_list(ctx),
        Command::Use { selector } => pyrite_core::python_use(
            ctx,
            &UseRequest {
                selector: selector.clone(),
            },
        ),
        Command::Config { action } => {
            let action = match action {
                ConfigCommand::List => ConfigAction::List,
                ConfigCommand::Get { key } => ConfigAction::Get { key: key.clone() },
                ConfigCommand::Set { key, value, global } => ConfigAction::Set {
                    key: key.clone(),
                    value: value.clone(),
                    global: *global,
                },
            };
            pyrite_core::config_command(ctx, &action)
        }
    }
}

fn emit_output(cli: &PyriteCli, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.status.exit_code();
    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));

    if cli.json {
        let payload = pyrite_core::to_json_response(cli.command.name(), outcome, code);
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if !cli.quiet {
        println!(
            "{}",
            style.status(outcome.status, &format!("pyrite {}: {}", cli.command.name(), outcome.message))
        );
        if let Some(hint) = hint_from_details(&outcome.details) {
            println!("{}", style.info(&format!("Hint: {hint}")));
        }
        if outcome.status != CommandStatus::Ok {
            if let Some(failed) = outcome.details.get("failed").and_then(Value::as_array) {
                for failure in failed {
                    let package = failure["package"].as_str().unwrap_or("?");
                    let reason = failure["reason"].as_str().unwrap_or("unknown");
                    println!("  {package}: {reason}");
                }
            }
        }
    }

    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}
