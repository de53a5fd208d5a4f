use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "edu-sandbox", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<PathBuf>,

    /// Path to the problem definition (test cases and time limit)
    #[arg(long = "problem", short = 'p')]
    pub problem_path: PathBuf,

    /// Number of concurrent evaluation workers
    #[arg(long = "threads", short = 't', default_value_t = 2)]
    pub threads: u8,

    /// Source files to evaluate
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,
}

impl CliArgs {
    /// Load the configuration from the specified file
    ///
    /// Without `--config`, `config.json` in the platform config directory is
    /// used when present, otherwise the built-in defaults.
    pub fn to_config(&self) -> anyhow::Result<Config> {
        match &self.config_path {
            Some(path) => Config::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Config::from_file(&path),
                _ => Ok(Config::default()),
            },
        }
    }

    /// Load the problem the submissions are judged against
    pub fn load_problem(&self) -> anyhow::Result<ProblemConfig> {
        let file = std::fs::File::open(&self.problem_path)
            .with_context(|| format!("cannot open problem {}", self.problem_path.display()))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("malformed problem {}", self.problem_path.display()))
    }
}

fn default_config_path() -> Option<PathBuf> {
    use directories::ProjectDirs;

    ProjectDirs::from("", "", "edu-sandbox").map(|dirs| dirs.config_dir().join("config.json"))
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub sandbox: SandboxConfig,
    pub toolchain: ToolchainConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("cannot open config {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("malformed config {}", path.display()))
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SandboxConfig {
    /// Directory under which every evaluation gets its own workspace
    pub workspace_root: PathBuf,
    /// Used when a problem does not set a positive time limit
    pub default_time_limit: Second,
    /// Hard ceiling for any per-test deadline
    pub max_time_limit: Second,
    /// Build deadline; shares the per-test deadline when unset
    pub compile_time_limit: Option<Second>,
    /// Cap on captured stdout/stderr per child process
    pub max_output_bytes: usize,
    /// Leftover workspaces older than this are swept at startup
    pub stale_workspace_age: Option<Second>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("go-sandbox"),
            default_time_limit: Second(5),
            max_time_limit: Second(10),
            compile_time_limit: None,
            max_output_bytes: 1 << 20,
            stale_workspace_age: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ToolchainConfig {
    pub name: String,
    pub file_name: String,
    pub executable_name: String,
    /// Build command; `%INPUT%` and `%OUTPUT%` are substituted per argument
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            name: "Go".to_string(),
            file_name: "main.go".to_string(),
            executable_name: "program".to_string(),
            command: ["go", "build", "-o", "%OUTPUT%", "%INPUT%"]
                .into_iter()
                .map(String::from)
                .collect(),
            env: BTreeMap::new(),
        }
    }
}

impl ToolchainConfig {
    /// File name of the compiled artifact inside the workspace
    pub fn artifact_name(&self) -> String {
        if cfg!(windows) {
            format!("{}.exe", self.executable_name)
        } else {
            self.executable_name.clone()
        }
    }
}

/// A problem as handed over by the owning service
#[derive(Deserialize, Debug, Clone)]
pub struct ProblemConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// JSON-encoded array of test cases
    pub test_cases: String,
    /// Seconds; zero or negative selects the default
    #[serde(default)]
    pub time_limit: i64,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Second(pub u64);

impl From<Second> for Duration {
    fn from(value: Second) -> Self {
        Duration::from_secs(value.0)
    }
}
