#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

mod commands;
mod config;
mod context;
mod outcome;
mod python;
mod repository;
mod sync;

pub use commands::{
    config_command, project_add, project_list, project_lock, project_remove, project_sync,
    project_update, python_use, AddRequest, ConfigAction, RemoveRequest, SyncRequest,
    UpdateRequest, UseRequest,
};
pub use config::{ConfigScope, ConfigStore, GlobalOptions};
pub use context::CommandContext;
pub use outcome::{to_json_response, CommandStatus, ExecutionOutcome};
pub use python::{
    discover_interpreters, floor_violation, select_interpreter, DiscoveredInterpreter,
    Environment, EnvironmentError, Interpreter, InterpreterSelector,
};
pub use repository::PyPiRepository;
pub use sync::{
    build_plan, execute_plan, scan_installed, InstalledRecord, Installer, SyncFailure,
    SyncOperationKind, SyncOptions, SyncPlan, SyncReport, WheelInstaller,
};
