pub mod discovery;
pub mod environment;

pub use discovery::{
    discover_interpreters, select_interpreter, DiscoveredInterpreter, EnvironmentError,
    InterpreterSelector,
};
pub use environment::{floor_violation, probe_interpreter, Environment, Interpreter};
