use std::process::Stdio;
use std::sync::Arc;

use serde_json::Value;
use tokio::process::Command;

use crate::config::{JobDef, JobDefMap};
use crate::error::DispatchError;

/// Output of a command that exited successfully
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub job_type: String,
    pub jid: String,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// Runs the configured command for each job.
///
/// The job's arguments are encoded as one JSON array and passed to the command
/// as its last argument. The command is started directly, without a shell, and
/// awaited; nothing is retried here.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    jobs: Arc<JobDefMap>,
}

impl Dispatcher {
    pub fn new(jobs: JobDefMap) -> Self {
        Self {
            jobs: Arc::new(jobs),
        }
    }

    /// Job types this dispatcher can run, in name order.
    pub fn job_types(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    pub fn definition(&self, job_type: &str) -> Option<&JobDef> {
        self.jobs.get(job_type)
    }

    /// Full argument vector for a job: the definition's command followed by the payload.
    ///
    /// The first element is always a non-empty executable.
    pub fn build_command(
        &self,
        job_type: &str,
        jid: &str,
        args: &[Value],
    ) -> Result<Vec<String>, DispatchError> {
        let payload = serde_json::to_string(args).map_err(|source| {
            tracing::error!(job_type, jid, error = %source, "Failed to encode job arguments");
            DispatchError::Serialization {
                job_type: job_type.to_string(),
                jid: jid.to_string(),
                source,
            }
        })?;

        let def = self.definition(job_type).ok_or_else(|| {
            tracing::error!(job_type, jid, "No command configured for job type");
            DispatchError::UnknownJobType {
                job_type: job_type.to_string(),
                jid: jid.to_string(),
            }
        })?;

        if def.program().is_empty() {
            tracing::error!(job_type, jid, "Job type has an empty command");
            return Err(DispatchError::EmptyCommand {
                job_type: job_type.to_string(),
                jid: jid.to_string(),
            });
        }

        let mut argv = Vec::with_capacity(def.command.len() + 1);
        argv.extend(def.command.iter().cloned());
        argv.push(payload);
        Ok(argv)
    }

    /// Run one job and wait for its command to exit.
    pub async fn perform(
        &self,
        job_type: &str,
        jid: &str,
        args: &[Value],
    ) -> Result<ExecutionResult, DispatchError> {
        let argv = self.build_command(job_type, jid, args)?;

        tracing::info!(job_type, jid, command = ?argv, "Working on job");

        let result = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        Self::process_output(job_type, jid, result)
    }

    fn process_output(
        job_type: &str,
        jid: &str,
        result: Result<std::process::Output, std::io::Error>,
    ) -> Result<ExecutionResult, DispatchError> {
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(job_type, jid, error = %e, "Failed to start command");
                return Err(DispatchError::Spawn {
                    job_type: job_type.to_string(),
                    jid: jid.to_string(),
                    source: e,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code();

        if !stdout.is_empty() {
            tracing::debug!(job_type, jid, stdout = %stdout.trim_end(), "Command output");
        }

        if !output.status.success() {
            tracing::error!(
                job_type,
                jid,
                exit_code = ?exit_code,
                stderr = %stderr.trim_end(),
                "Job failed"
            );
            return Err(DispatchError::Exit {
                job_type: job_type.to_string(),
                jid: jid.to_string(),
                code: exit_code,
                stderr: stderr.trim_end().to_string(),
            });
        }

        tracing::info!(job_type, jid, exit_code = ?exit_code, "Completed job");

        Ok(ExecutionResult {
            job_type: job_type.to_string(),
            jid: jid.to_string(),
            exit_code,
            stdout: if stdout.is_empty() { None } else { Some(stdout) },
            stderr: if stderr.is_empty() { None } else { Some(stderr) },
        })
    }
}
