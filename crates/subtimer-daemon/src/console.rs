//! Line-oriented command console
//!
//! Turns text commands such as `start build 5m 4m` or `extend build -30s`
//! into coordinator calls and renders the outcome as JSON.

use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

use subtimer_core::models::{TimeoutSpec, WarningPolicy};

use crate::config::{ConfigManager, ConfigManagerError};
use crate::timeout::{TimeoutCoordinator, TimeoutHandler};

/// Command parse error
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

/// Console error
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigManagerError),
}

pub type Result<T> = std::result::Result<T, ConsoleError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `start <id> <duration> [warning-offset|none]`
    Start {
        id: String,
        duration_ms: i64,
        warning: WarningArg,
    },
    /// `extend <id> <±delta>`
    Extend { id: String, delta_ms: i64 },
    Clear { id: String },
    ClearAll,
    Remaining { id: String },
    Status { id: String },
    List,
    /// Stored config plus the settings the running coordinator uses
    Config,
    ResetConfig,
    /// `warning none | fraction <f> | lead <duration>`
    Warning(WarningPolicy),
    Dispose,
    Quit,
}

/// Warning offset as given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningArg {
    /// Derive from the configured policy
    Default,
    Disabled,
    Offset(i64),
}

/// Parse `1500`, `1500ms`, `90s`, `5m`, optionally signed
pub fn parse_duration_ms(input: &str) -> std::result::Result<i64, CommandError> {
    let invalid = || CommandError::InvalidDuration(input.to_string());

    let (sign, body) = match input.as_bytes().first() {
        Some(b'-') => (-1, &input[1..]),
        Some(b'+') => (1, &input[1..]),
        _ => (1, input),
    };

    let (digits, scale) = if let Some(digits) = body.strip_suffix("ms") {
        (digits, 1)
    } else if let Some(digits) = body.strip_suffix('s') {
        (digits, 1000)
    } else if let Some(digits) = body.strip_suffix('m') {
        (digits, 60_000)
    } else {
        (body, 1)
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let value: i64 = digits.parse().map_err(|_| invalid())?;
    value
        .checked_mul(scale)
        .map(|ms| ms * sign)
        .ok_or_else(invalid)
}

fn next_arg<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> std::result::Result<&'a str, CommandError> {
    parts.next().ok_or(CommandError::MissingArgument(name))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let name = parts.next().ok_or(CommandError::Empty)?;

        let command = match name {
            "start" => {
                let id = next_arg(&mut parts, "id")?;
                let duration_ms = parse_duration_ms(next_arg(&mut parts, "duration")?)?;
                let warning = match parts.next() {
                    None => WarningArg::Default,
                    Some("none") => WarningArg::Disabled,
                    Some(offset) => WarningArg::Offset(parse_duration_ms(offset)?),
                };
                Command::Start {
                    id: id.to_string(),
                    duration_ms,
                    warning,
                }
            }
            "extend" => {
                let id = next_arg(&mut parts, "id")?;
                let delta_ms = parse_duration_ms(next_arg(&mut parts, "delta")?)?;
                Command::Extend {
                    id: id.to_string(),
                    delta_ms,
                }
            }
            "clear" => Command::Clear {
                id: next_arg(&mut parts, "id")?.to_string(),
            },
            "clear-all" => Command::ClearAll,
            "remaining" => Command::Remaining {
                id: next_arg(&mut parts, "id")?.to_string(),
            },
            "status" => Command::Status {
                id: next_arg(&mut parts, "id")?.to_string(),
            },
            "list" => Command::List,
            "config" => Command::Config,
            "reset-config" => Command::ResetConfig,
            "warning" => {
                let policy = match parts.next() {
                    Some("none") => WarningPolicy::None,
                    Some("fraction") => {
                        let raw = next_arg(&mut parts, "fraction")?;
                        let fraction = raw
                            .parse::<f64>()
                            .map_err(|_| CommandError::InvalidNumber(raw.to_string()))?;
                        WarningPolicy::Fraction { fraction }
                    }
                    Some("lead") => {
                        let raw = next_arg(&mut parts, "lead")?;
                        WarningPolicy::Lead {
                            lead_ms: parse_duration_ms(raw)?,
                        }
                    }
                    Some(other) => {
                        return Err(CommandError::UnexpectedArgument(other.to_string()))
                    }
                    None => return Err(CommandError::MissingArgument("policy")),
                };
                Command::Warning(policy)
            }
            "dispose" => Command::Dispose,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        if let Some(extra) = parts.next() {
            return Err(CommandError::UnexpectedArgument(extra.to_string()));
        }

        Ok(command)
    }
}

/// Logs coordinator callbacks; the console's only notification target
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

impl TimeoutHandler for LogHandler {
    fn on_timeout(&self, id: &str) {
        tracing::info!("[{}] timed out", id);
    }

    fn on_warning(&self, id: &str, remaining_ms: i64) {
        tracing::info!("[{}] warning: {}ms remaining", id, remaining_ms);
    }

    fn on_extended(&self, id: &str, new_total_ms: i64) {
        tracing::info!("[{}] total duration now {}ms", id, new_total_ms);
    }
}

/// Executes parsed commands against a coordinator
pub struct Console {
    coordinator: TimeoutCoordinator,
    config: Arc<ConfigManager>,
    handler: Arc<dyn TimeoutHandler>,
}

impl Console {
    pub fn new(coordinator: TimeoutCoordinator, config: Arc<ConfigManager>) -> Self {
        Self {
            coordinator,
            config,
            handler: Arc::new(LogHandler),
        }
    }

    pub async fn execute(&self, command: Command) -> Result<Value> {
        let reply = match command {
            Command::Start {
                id,
                duration_ms,
                warning,
            } => {
                let warning_offset_ms = match warning {
                    WarningArg::Default => {
                        let policy = self.config.get().await.coordinator.warning;
                        policy.offset_for(duration_ms)
                    }
                    WarningArg::Disabled => None,
                    WarningArg::Offset(offset) => Some(offset),
                };
                let spec = TimeoutSpec {
                    total_duration_ms: duration_ms,
                    warning_offset_ms,
                };

                self.coordinator
                    .start(id.clone(), spec, self.handler.clone())
                    .await;

                json!({
                    "id": id,
                    "status": "started",
                    "total_duration_ms": duration_ms,
                    "warning_offset_ms": warning_offset_ms,
                })
            }
            Command::Extend { id, delta_ms } => {
                let extended = self.coordinator.extend(&id, delta_ms, None).await;
                json!({
                    "id": id,
                    "extended": extended,
                    "remaining_ms": self.coordinator.time_remaining(&id).await,
                })
            }
            Command::Clear { id } => {
                let cleared = self.coordinator.clear(&id).await;
                json!({ "id": id, "cleared": cleared })
            }
            Command::ClearAll => {
                json!({ "cleared": self.coordinator.clear_all().await })
            }
            Command::Remaining { id } => {
                let remaining_ms = self.coordinator.time_remaining(&id).await;
                json!({ "id": id, "remaining_ms": remaining_ms })
            }
            Command::Status { id } => {
                let status = self.coordinator.status(&id).await;
                json!({ "id": id, "status": status })
            }
            Command::List => {
                let mut active = self.coordinator.active_timeouts().await;
                active.sort();
                json!({ "active": active })
            }
            Command::Config => json!({
                "config": self.config.get().await,
                "coordinator": self.coordinator.config(),
            }),
            Command::ResetConfig => json!({ "config": self.config.reset_to_default().await? }),
            Command::Warning(policy) => {
                let config = self.config.set_warning_policy(policy).await?;
                json!({ "warning": config.coordinator.warning })
            }
            Command::Dispose => {
                self.coordinator.dispose().await;
                json!({ "status": "disposed" })
            }
            Command::Quit => json!({ "status": "bye" }),
        };

        Ok(reply)
    }
}
