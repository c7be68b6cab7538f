use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "pyrite",
    version,
    about = "Python dependency locking and environment sync",
    propagate_version = true
)]
pub struct PyriteCli {
    /// Emit machine-readable JSON instead of status lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Enable full trace logging
    #[arg(long, global = true)]
    pub trace: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve the project's dependencies and write pyrite.lock
    Lock,
    /// Reconcile __pypackages__ with pyrite.lock
    Sync {
        /// Also remove installed packages that are not locked
        #[arg(long)]
        clean: bool,
        /// Show the plan without applying it
        #[arg(long)]
        dry_run: bool,
        /// Maximum parallel package operations
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
    /// Add requirements to the project and re-lock
    Add {
        /// Requirement specifiers, e.g. `requests>=2.19` or `demo[extra]`
        #[arg(required = true)]
        specs: Vec<String>,
    },
    /// Remove requirements from the project and re-lock
    Remove {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Re-resolve locked versions (all, or just the named packages)
    Update { names: Vec<String> },
    /// Show the locked dependency graph
    List,
    /// Select the interpreter this project runs on
    Use {
        /// Interpreter path or version, e.g. `3.11` or `/usr/bin/python3`
        selector: String,
    },
    /// Read or write pyrite configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show every config key with its winning scope
    List,
    /// Print one config value (project scope overrides global)
    Get { key: String },
    /// Write one config value
    Set {
        key: String,
        value: String,
        /// Write to the user-level scope instead of the project
        #[arg(short, long)]
        global: bool,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Sync { .. } => "sync",
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Update { .. } => "update",
            Self::List => "list",
            Self::Use { .. } => "use",
            Self::Config { .. } => "config",
        }
    }
}
