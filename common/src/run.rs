use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
};

use serde::{Deserialize, Serialize};
use tokio::{fs::File, process::Command};
use tracing::debug;

use crate::{error::ReportError, util::fill_placeholders};

/// Parameters of one invocation of the external sort tester
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunParams {
    pub trials: u32,
    pub initial_length: u64,
    pub length_increment: u64,
    pub max_length: u64,
    pub min_value: i64,
    pub max_value: i64,
    pub mode: String,
    pub output: PathBuf,
}

impl RunParams {
    pub fn validate(&self) -> Result<(), ReportError> {
        let problem = if self.trials == 0 {
            Some("trials must be at least 1".to_owned())
        } else if self.length_increment == 0 {
            Some("length_increment must be positive".to_owned())
        } else if self.initial_length > self.max_length {
            Some(format!(
                "initial_length {} exceeds max_length {}",
                self.initial_length, self.max_length
            ))
        } else if self.min_value > self.max_value {
            Some(format!(
                "min_value {} exceeds max_value {}",
                self.min_value, self.max_value
            ))
        } else {
            None
        };
        match problem {
            Some(problem) => Err(ReportError::Config(format!(
                "Run for {}: {problem}",
                self.output.display()
            ))),
            None => Ok(()),
        }
    }

    /// Value of a template placeholder
    pub fn lookup(&self, name: &str) -> Option<String> {
        Some(match name {
            "trials" => self.trials.to_string(),
            "initial_length" => self.initial_length.to_string(),
            "length_increment" => self.length_increment.to_string(),
            "max_length" => self.max_length.to_string(),
            "min_value" => self.min_value.to_string(),
            "max_value" => self.max_value.to_string(),
            "mode" => self.mode.clone(),
            "output" => self.output.to_string_lossy().into_owned(),
            _ => return None,
        })
    }

    pub fn render(&self, template: &CommandTemplate) -> Result<Invocation, ReportError> {
        let args = template
            .args
            .iter()
            .map(|arg| fill_placeholders(arg, |name| self.lookup(name)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Invocation {
            program: template.program.clone(),
            args,
            output: self.output.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn default_args() -> Vec<String> {
        [
            "--trials",
            "{trials}",
            "--initial-length",
            "{initial_length}",
            "--length-increment",
            "{length_increment}",
            "--max-length",
            "{max_length}",
            "--min-value",
            "{min_value}",
            "--max-value",
            "{max_value}",
            "--mode",
            "{mode}",
            "--output",
            "{output}",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect()
    }

    pub fn new(program: impl Into<String>, args: Option<Vec<String>>) -> Self {
        CommandTemplate {
            program: program.into(),
            args: args.unwrap_or_else(Self::default_args),
        }
    }
}

/// A rendered command line, ready to launch
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub output: PathBuf,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    /// `code` is `None` when the process was killed by a signal
    Failed { code: Option<i32> },
    LaunchFailed { reason: String },
    /// Not launched because an earlier run failed
    Skipped,
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Succeeded)
    }

    pub fn describe(&self) -> String {
        match self {
            RunStatus::Succeeded => "succeeded".to_owned(),
            RunStatus::Failed { code: Some(code) } => format!("exit code {code}"),
            RunStatus::Failed { code: None } => "terminated by signal".to_owned(),
            RunStatus::LaunchFailed { reason } => format!("could not launch: {reason}"),
            RunStatus::Skipped => "skipped after an earlier failure".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub index: usize,
    pub params: RunParams,
    #[serde(flatten)]
    pub status: RunStatus,
    pub elapsed_ms: u64,
}

/// Starts one external process and waits for it
#[async_trait::async_trait]
pub trait Launcher: Send + Sync {
    /// Returns the exit code, `None` if the process died from a signal.
    /// An `Err` means the process could not be started at all.
    async fn launch(&self, invocation: &Invocation) -> std::io::Result<Option<i32>>;
}

#[derive(Debug, Default, Clone)]
pub struct ProcessLauncher {
    pub env: HashMap<String, String>,
    /// Write the child's stdout into the run's output file
    pub capture_stdout: bool,
}

impl ProcessLauncher {
    async fn stdout_for(&self, output: &Path) -> std::io::Result<Stdio> {
        if self.capture_stdout {
            let file = File::create(output).await?;
            Ok(file.into_std().await.into())
        } else {
            Ok(Stdio::null())
        }
    }
}

#[async_trait::async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, invocation: &Invocation) -> std::io::Result<Option<i32>> {
        debug!("Launching {invocation}");
        let stdout = self.stdout_for(&invocation.output).await?;
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(stdout)
            .kill_on_drop(true)
            .status()
            .await?;
        Ok(status.code())
    }
}
