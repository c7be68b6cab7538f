use anyhow::Result;
use serde_json::json;

use crate::config::{ConfigScope, ConfigStore};
use crate::context::CommandContext;
use crate::outcome::ExecutionOutcome;

#[derive(Clone, Debug)]
pub enum ConfigAction {
    List,
    Get { key: String },
    Set {
        key: String,
        value: String,
        global: bool,
    },
}

/// Reads or writes the layered config. `set` targets project scope unless
/// `--global` is passed; `get` answers from the merged view.
///
/// # Errors
/// Returns an error only on unexpected faults; expected failures are
/// reported through the outcome status.
pub fn config_command(ctx: &mut CommandContext, action: &ConfigAction) -> Result<ExecutionOutcome> {
    config_with(ctx.config_mut(), action)
}

pub(crate) fn config_with(
    store: &mut ConfigStore,
    action: &ConfigAction,
) -> Result<ExecutionOutcome> {
    match action {
        ConfigAction::List => {
            let entries = store.entries();
            let rows: serde_json::Map<String, serde_json::Value> = entries
                .iter()
                .map(|(key, (value, scope))| {
                    (
                        key.clone(),
                        json!({ "value": value, "scope": scope.as_str() }),
                    )
                })
                .collect();
            Ok(ExecutionOutcome::success(
                format!("{} config entr(ies)", rows.len()),
                serde_json::Value::Object(rows),
            ))
        }
        ConfigAction::Get { key } => match store.scoped(key) {
            Some((value, scope)) => Ok(ExecutionOutcome::success(
                value.to_string(),
                json!({ "key": key, "value": value, "scope": scope.as_str() }),
            )),
            None => Ok(ExecutionOutcome::user_error(
                format!("no config key `{key}`"),
                json!({ "key": key }),
            )),
        },
        ConfigAction::Set { key, value, global } => {
            let scope = if *global {
                ConfigScope::Global
            } else {
                ConfigScope::Project
            };
            match store.set(key, value, scope) {
                Ok(()) => Ok(ExecutionOutcome::success(
                    format!("set {key} ({})", scope.as_str()),
                    json!({ "key": key, "value": value, "scope": scope.as_str() }),
                )),
                Err(err) => Ok(ExecutionOutcome::user_error(
                    err.to_string(),
                    json!({ "key": key }),
                )),
            }
        }
    }
}
