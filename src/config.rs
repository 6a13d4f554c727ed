use clap::Parser;
use serde::Deserialize;

use crate::engine::EngineCommand;
use crate::model::Language;
use crate::queue::STATUS_QUEUE;
use crate::worker::JobKind;

#[derive(Parser)]
#[command(name = "snippet-runner", version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Serve HTTP only, without polling the job queues
    #[arg(long = "no-consumers", default_value_t = false)]
    pub no_consumers: bool,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> std::io::Result<Config> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub services: ServicesConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub status: StatusConfig,
    pub work_dir: Option<String>,
    pub languages: Vec<LanguageConfig>,
}

#[derive(Deserialize, Debug)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

#[derive(Deserialize, Debug)]
pub struct ServicesConfig {
    pub asset_url: String,
    pub rule_url: String,
    pub snippet_manager_url: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct QueueConfig {
    /// In-process lists are used when absent
    pub redis_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub format_queue: Option<String>,
    pub sca_queue: Option<String>,
    pub sca_unique_queue: Option<String>,
    pub status_queue: Option<String>,
}

impl QueueConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms.unwrap_or(1000))
    }

    pub fn key(&self, kind: JobKind) -> String {
        let configured = match kind {
            JobKind::Format => &self.format_queue,
            JobKind::Sca => &self.sca_queue,
            JobKind::ScaUnique => &self.sca_unique_queue,
        };
        configured
            .clone()
            .unwrap_or_else(|| kind.default_queue().to_string())
    }

    pub fn status_key(&self) -> String {
        self.status_queue
            .clone()
            .unwrap_or_else(|| STATUS_QUEUE.to_string())
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct StatusConfig {
    #[serde(default)]
    pub sink: StatusSink,
}

#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum StatusSink {
    #[default]
    Queue,
    Http,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LanguageConfig {
    pub name: Language,
    pub lexer_rules: String,
    pub format_rules: String,
    pub sca_rules: String,
    pub timeout_ms: Option<u64>,
    pub command: EngineCommand,
}
