use std::{
    collections::HashSet,
    env,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, anyhow, bail};
use config::{Config, Environment, File};
use reqwest::Url;
use serde::Deserialize;

use crate::{
    agent::{AgentType, Language},
    capabilities::AvailabilityEntry,
    panel::{Panel, default_panels},
    workflow::WorkflowSettings,
};

const DEFAULT_CONFIG_PATH: &str = "config/app_config.toml";
const DEFAULT_SERVICE_URL: &str = "http://localhost:8000";
const DEFAULT_SERVICE_TIMEOUT_SECONDS: u64 = 180;
const DEFAULT_USER_AGENT: &str = "qagen/0.1";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:9000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;
const DEFAULT_GENERATION_TIMEOUT_SECONDS: u64 = 120;
const DEFAULT_REVEAL_DELAY_MS: u64 = 100;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub base_url: Url,
    pub timeout: Duration,
    pub user_agent: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Largest requirement document accepted over HTTP, before base64 encoding.
    pub max_upload_bytes: usize,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub workflow: WorkflowSettings,
    pub artifacts_dir: PathBuf,
    pub availability: Vec<AvailabilityEntry>,
    pub panels: Vec<Panel>,
}

impl AppConfig {
    /// Reads the TOML file (optional unless given explicitly), then applies
    /// `QAGEN__SECTION__KEY` environment overrides.
    pub fn load(path_override: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = match path_override {
            Some(path) => path.to_path_buf(),
            None => env::var("APP_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        let raw = Config::builder()
            .add_source(File::from(config_path.as_path()).required(path_override.is_some()))
            .add_source(
                Environment::with_prefix("QAGEN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read config file {:?}", config_path))?;

        Self::from_raw(raw).with_context(|| format!("invalid config in {:?}", config_path))
    }

    fn from_raw(raw: Config) -> anyhow::Result<Self> {
        let file_config: FileConfig = raw.try_deserialize()?;

        let artifacts_dir = if let Some(dir) = &file_config.artifacts_dir {
            PathBuf::from(dir)
        } else if let Ok(dir) = env::var("ARTIFACTS_DIR") {
            PathBuf::from(dir)
        } else {
            env::current_dir()?.join("artifacts")
        };

        let service = file_config.service.unwrap_or_default().into_domain()?;
        let server = file_config.server.unwrap_or_default().into_domain()?;
        let workflow = file_config.workflow.unwrap_or_default().into_domain();

        let availability = file_config
            .availability
            .into_iter()
            .map(FileAvailabilityEntry::into_domain)
            .collect::<anyhow::Result<Vec<_>>>()?;

        let panels = if file_config.panels.is_empty() {
            default_panels()
        } else {
            let panels = file_config
                .panels
                .into_iter()
                .map(FilePanel::into_domain)
                .collect::<anyhow::Result<Vec<_>>>()?;
            ensure_unique_ids(&panels)?;
            panels
        };

        Ok(Self {
            service,
            server,
            workflow,
            artifacts_dir,
            availability,
            panels,
        })
    }
}

fn ensure_unique_ids(panels: &[Panel]) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for panel in panels {
        if !seen.insert(panel.id.as_str()) {
            bail!("duplicate panel id: {}", panel.id);
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    artifacts_dir: Option<String>,
    #[serde(default)]
    service: Option<FileServiceConfig>,
    #[serde(default)]
    server: Option<FileServerConfig>,
    #[serde(default)]
    workflow: Option<FileWorkflowConfig>,
    #[serde(default)]
    availability: Vec<FileAvailabilityEntry>,
    #[serde(default)]
    panels: Vec<FilePanel>,
}

#[derive(Debug, Deserialize, Default)]
struct FileServiceConfig {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
    #[serde(default)]
    user_agent: Option<String>,
}

impl FileServiceConfig {
    fn into_domain(self) -> anyhow::Result<ServiceConfig> {
        let base_url_str = self
            .base_url
            .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string());
        let base_url = Url::parse(&base_url_str)
            .with_context(|| format!("failed to parse service.base_url: {}", base_url_str))?;
        if base_url.cannot_be_a_base() {
            bail!("service.base_url must be an http(s) url: {}", base_url_str);
        }

        let timeout_seconds = self
            .timeout_seconds
            .unwrap_or(DEFAULT_SERVICE_TIMEOUT_SECONDS)
            .max(1);

        Ok(ServiceConfig {
            base_url,
            timeout: Duration::from_secs(timeout_seconds),
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileServerConfig {
    #[serde(default)]
    bind_addr: Option<String>,
    #[serde(default)]
    max_upload_bytes: Option<usize>,
}

impl FileServerConfig {
    fn into_domain(self) -> anyhow::Result<ServerConfig> {
        let bind_addr_str = self
            .bind_addr
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .with_context(|| format!("failed to parse server.bind_addr: {}", bind_addr_str))?;

        let max_upload_bytes = self.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        if max_upload_bytes == 0 {
            bail!("server.max_upload_bytes must be greater than zero");
        }

        Ok(ServerConfig {
            bind_addr,
            max_upload_bytes,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileWorkflowConfig {
    #[serde(default)]
    generation_timeout_seconds: Option<u64>,
    #[serde(default)]
    reveal_delay_ms: Option<u64>,
}

impl FileWorkflowConfig {
    fn into_domain(self) -> WorkflowSettings {
        // 0 turns the generation timeout off.
        let timeout_seconds = self
            .generation_timeout_seconds
            .unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECONDS);

        WorkflowSettings {
            generation_timeout: (timeout_seconds > 0).then(|| Duration::from_secs(timeout_seconds)),
            reveal_delay: Duration::from_millis(
                self.reveal_delay_ms.unwrap_or(DEFAULT_REVEAL_DELAY_MS),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileAvailabilityEntry {
    agent: String,
    #[serde(default)]
    language: Option<String>,
    enabled: bool,
}

impl FileAvailabilityEntry {
    fn into_domain(self) -> anyhow::Result<AvailabilityEntry> {
        let agent: AgentType = self.agent.parse()?;
        let language = parse_language(self.language.as_deref())?;
        Ok(AvailabilityEntry::new(agent, language, self.enabled))
    }
}

#[derive(Debug, Deserialize)]
struct FilePanel {
    id: String,
    #[serde(default)]
    label: Option<String>,
    title: String,
    agent: String,
    #[serde(default)]
    language: Option<String>,
}

impl FilePanel {
    fn into_domain(self) -> anyhow::Result<Panel> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(anyhow!("panel id must not be empty"));
        }
        let agent: AgentType = self.agent.parse()?;
        let language = parse_language(self.language.as_deref())?;
        let label = self.label.unwrap_or_else(|| self.title.clone());

        Ok(Panel::new(id, label, self.title, agent, language))
    }
}

/// Accepts "none" and empty strings as the language-independent entry.
fn parse_language(value: Option<&str>) -> anyhow::Result<Option<Language>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("none") => Ok(None),
        Some(value) => Ok(Some(value.parse()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> anyhow::Result<AppConfig> {
        let raw = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        AppConfig::from_raw(raw)
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = from_toml("artifacts_dir = \"out\"").unwrap();

        assert_eq!(config.service.base_url.as_str(), "http://localhost:8000/");
        assert_eq!(config.service.timeout, Duration::from_secs(180));
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.server.max_upload_bytes, 32 * 1024 * 1024);
        assert_eq!(config.workflow.generation_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.workflow.reveal_delay, Duration::from_millis(100));
        assert_eq!(config.artifacts_dir, PathBuf::from("out"));
        assert!(config.availability.is_empty());
        assert_eq!(config.panels, default_panels());
    }

    #[test]
    fn sections_override_defaults() {
        let config = from_toml(
            r#"
            artifacts_dir = "generated"

            [service]
            base_url = "http://qa-backend:8000/api/"
            timeout_seconds = 30

            [server]
            bind_addr = "0.0.0.0:9100"
            max_upload_bytes = 1048576

            [workflow]
            generation_timeout_seconds = 0
            reveal_delay_ms = 250

            [[availability]]
            agent = "api"
            language = "none"
            enabled = true

            [[availability]]
            agent = "selenium"
            language = "java"
            enabled = true

            [[panels]]
            id = "bdd"
            title = "BDD Writer"
            agent = "gherkin"
            "#,
        )
        .unwrap();

        assert_eq!(config.service.base_url.as_str(), "http://qa-backend:8000/api/");
        assert_eq!(config.service.timeout, Duration::from_secs(30));
        assert_eq!(config.server.bind_addr.port(), 9100);
        assert_eq!(config.server.max_upload_bytes, 1024 * 1024);
        assert_eq!(config.workflow.generation_timeout, None);
        assert_eq!(config.workflow.reveal_delay, Duration::from_millis(250));
        assert_eq!(
            config.availability,
            vec![
                AvailabilityEntry::new(AgentType::Api, None, true),
                AvailabilityEntry::new(AgentType::Selenium, Some(Language::Java), true),
            ]
        );
        assert_eq!(config.panels.len(), 1);
        assert_eq!(config.panels[0].label, "BDD Writer");
    }

    #[test]
    fn rejects_unknown_agent() {
        let err = from_toml(
            r#"
            [[availability]]
            agent = "cypress"
            enabled = true
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cypress"));
    }

    #[test]
    fn rejects_duplicate_panel_ids() {
        let err = from_toml(
            r#"
            [[panels]]
            id = "one"
            title = "First"
            agent = "gherkin"

            [[panels]]
            id = "one"
            title = "Second"
            agent = "api"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate panel id"));
    }

    #[test]
    fn rejects_zero_upload_limit() {
        let err = from_toml("[server]\nmax_upload_bytes = 0").unwrap_err();
        assert!(err.to_string().contains("max_upload_bytes"));
    }

    #[test]
    fn rejects_bad_bind_addr() {
        assert!(from_toml("[server]\nbind_addr = \"not-an-addr\"").is_err());
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qagen.toml");
        std::fs::write(
            &path,
            "artifacts_dir = \"saved\"\n[service]\nbase_url = \"http://127.0.0.1:8123\"\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.service.base_url.port(), Some(8123));
        assert_eq!(config.artifacts_dir, PathBuf::from("saved"));
    }

    #[test]
    fn load_fails_for_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
