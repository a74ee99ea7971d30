use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Jobs file read when no path is given on the command line.
pub const DEFAULT_JOBS_FILE: &str = "jobs.toml";

/// Largest accepted queue weight.
pub const MAX_QUEUE_WEIGHT: u32 = 1000;

/// A job type and the command that runs it.
///
/// The job's JSON-encoded arguments are appended to `command` as the last
/// argument when the job is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobDef {
    /// Job type, as enqueued on the broker
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    /// Executable followed by its fixed arguments
    #[serde(rename = "Cmd", alias = "cmd")]
    pub command: Vec<String>,
}

impl JobDef {
    pub fn new(name: impl Into<String>, command: &[&str]) -> Self {
        Self {
            name: name.into(),
            command: command.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Executable path. Empty only for definitions that never passed validation.
    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    /// Fixed arguments passed before the job payload.
    pub fn fixed_args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }
}

/// Job definitions keyed by job type. Built once at startup, read-only after.
pub type JobDefMap = BTreeMap<String, JobDef>;

/// Worker pool settings, read from the optional `[worker]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerSettings {
    /// Number of jobs processed at the same time
    pub concurrency: usize,
    /// Queue name to polling weight. Higher weight is polled first more often.
    pub queues: BTreeMap<String, u32>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            queues: BTreeMap::from([
                ("critical".to_string(), 3),
                ("default".to_string(), 2),
                ("bulk".to_string(), 1),
            ]),
        }
    }
}

impl WorkerSettings {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_queue(mut self, name: impl Into<String>, weight: u32) -> Self {
        self.queues.insert(name.into(), weight);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidWorker(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.queues.is_empty() {
            return Err(ConfigError::InvalidWorker(
                "at least one queue is required".to_string(),
            ));
        }
        for (name, weight) in &self.queues {
            if *weight == 0 || *weight > MAX_QUEUE_WEIGHT {
                return Err(ConfigError::InvalidWorker(format!(
                    "queue {name:?} has weight {weight}, expected 1..={MAX_QUEUE_WEIGHT}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawJobsFile {
    #[serde(default)]
    worker: WorkerSettings,
    #[serde(rename = "Jobs", alias = "jobs", default)]
    jobs: Vec<JobDef>,
}

/// Parsed and validated jobs file.
#[derive(Debug, Clone)]
pub struct JobsFile {
    pub jobs: JobDefMap,
    pub worker: WorkerSettings,
}

impl JobsFile {
    /// Parse a jobs file from a TOML string.
    ///
    /// When the same job name appears more than once the last entry wins.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let raw: RawJobsFile = toml::from_str(toml_str)?;
        raw.worker.validate()?;

        let mut jobs = JobDefMap::new();
        for def in raw.jobs {
            if def.program().is_empty() {
                return Err(ConfigError::EmptyCommand { name: def.name });
            }
            if let Some(previous) = jobs.insert(def.name.clone(), def) {
                tracing::warn!(
                    job_type = %previous.name,
                    replaced = ?previous.command,
                    "Duplicate job definition, keeping the last one"
                );
            }
        }

        Ok(Self {
            jobs,
            worker: raw.worker,
        })
    }

    /// Load and validate a jobs file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file = Self::from_toml(&content)?;

        if file.jobs.is_empty() {
            tracing::warn!(path = %path.display(), "No job definitions loaded");
        }
        tracing::info!(
            path = %path.display(),
            count = file.jobs.len(),
            jobs = ?file.jobs.values().collect::<Vec<_>>(),
            "Loaded job definitions"
        );

        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_settings_default() {
        let cfg = WorkerSettings::default();
        assert_eq!(cfg.concurrency, 4);
        assert_eq!(cfg.queues.len(), 3);
        assert_eq!(cfg.queues["critical"], 3);
        assert_eq!(cfg.queues["default"], 2);
        assert_eq!(cfg.queues["bulk"], 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn worker_settings_reject_zero_concurrency() {
        let cfg = WorkerSettings::default().with_concurrency(0);
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidWorker(_))));
    }

    #[test]
    fn worker_settings_reject_zero_weight() {
        let cfg = WorkerSettings::default().with_queue("idle", 0);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("idle"));
    }

    #[test]
    fn worker_settings_weight_bounds() {
        let max = WorkerSettings::default().with_queue("busy", MAX_QUEUE_WEIGHT);
        assert!(max.validate().is_ok());

        let huge = WorkerSettings::default().with_queue("busy", 4_000_000_000);
        let err = huge.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWorker(_)));
        assert!(err.to_string().contains("busy"));
    }

    #[test]
    fn worker_settings_reject_empty_queues() {
        let cfg = WorkerSettings {
            concurrency: 1,
            queues: BTreeMap::new(),
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidWorker(_))));
    }

    #[test]
    fn job_def_program_and_args() {
        let def = JobDef::new("resize", &["/bin/resize", "--fast", "-q"]);
        assert_eq!(def.program(), "/bin/resize");
        assert_eq!(def.fixed_args(), &["--fast".to_string(), "-q".to_string()]);

        let bare = JobDef::new("noop", &["true"]);
        assert_eq!(bare.program(), "true");
        assert!(bare.fixed_args().is_empty());
    }

    #[test]
    fn from_toml_reads_worker_table() {
        let file = JobsFile::from_toml(
            r#"
            [worker]
            concurrency = 8

            [worker.queues]
            high = 5
            low = 1
            "#,
        )
        .unwrap();
        assert!(file.jobs.is_empty());
        assert_eq!(file.worker.concurrency, 8);
        assert_eq!(file.worker.queues.len(), 2);
        assert_eq!(file.worker.queues["high"], 5);
    }

    #[test]
    fn from_toml_partial_worker_table_keeps_default_queues() {
        let file = JobsFile::from_toml("[worker]\nconcurrency = 2\n").unwrap();
        assert_eq!(file.worker.concurrency, 2);
        assert_eq!(file.worker.queues, WorkerSettings::default().queues);
    }

    #[test]
    fn from_toml_rejects_blank_executable() {
        let err = JobsFile::from_toml(
            r#"
            [[Jobs]]
            Name = "blank"
            Cmd = [""]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCommand { ref name } if name == "blank"));
    }

    #[test]
    fn from_toml_accepts_lowercase_keys() {
        let file = JobsFile::from_toml(
            r#"
            [[jobs]]
            name = "echo"
            cmd = ["echo", "-n"]
            "#,
        )
        .unwrap();
        assert_eq!(file.jobs.len(), 1);
        assert_eq!(file.jobs["echo"], JobDef::new("echo", &["echo", "-n"]));
    }

    #[test]
    fn from_toml_rejects_unknown_tables_and_fields() {
        let misspelled_table = JobsFile::from_toml("[[Job]]\nName = \"echo\"\nCmd = [\"echo\"]\n");
        assert!(matches!(misspelled_table, Err(ConfigError::Parse(_))));

        let misspelled_field = JobsFile::from_toml("[[Jobs]]\nName = \"echo\"\nCommand = [\"echo\"]\n");
        assert!(matches!(misspelled_field, Err(ConfigError::Parse(_))));

        let unknown_setting = JobsFile::from_toml("[worker]\nworkers = 2\n");
        assert!(matches!(unknown_setting, Err(ConfigError::Parse(_))));
    }
}
