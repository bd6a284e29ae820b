use config::{Config, ConfigError, Environment, File};
use devicepass_types::GitRepo;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::device_auth::GrantRequirements;
use crate::poller::PollPolicy;

/// Repository the device is bound to.
#[derive(Debug, Deserialize, Clone)]
pub struct GitConfig {
    pub owner: String,
    pub repo: String,
}

impl GitConfig {
    pub fn repo(&self) -> GitRepo {
        GitRepo {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
        }
    }
}

/// Hosting platform endpoints.
#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_login_url() -> String {
    "https://github.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            login_url: default_login_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GithubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Pairing protocol settings
#[derive(Debug, Deserialize, Clone)]
pub struct PairingConfig {
    /// Web client that opens the deep links
    #[serde(default = "default_client_root")]
    pub client_root: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Deadline for anything that waits on the operator
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Deployment environment holding the secrets
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_master_secret_name")]
    pub master_secret_name: String,
    #[serde(default = "default_pepper_secret_name")]
    pub pepper_secret_name: String,
    /// Comma-separated scopes the operator must grant
    #[serde(default = "default_required_scopes")]
    pub required_scopes: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// PBKDF2 rounds for envelope keys
    #[serde(default = "default_kdf_rounds")]
    pub kdf_rounds: u32,
}

fn default_client_root() -> String {
    "https://pass.tvquizphd.com".to_string()
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_deadline_secs() -> u64 {
    15 * 60
}

fn default_environment() -> String {
    "secret-tv-access".to_string()
}

fn default_master_secret_name() -> String {
    "MASTER_PASS".to_string()
}

fn default_pepper_secret_name() -> String {
    "PEPPER".to_string()
}

fn default_required_scopes() -> String {
    "public_repo,project".to_string()
}

fn default_token_type() -> String {
    "bearer".to_string()
}

fn default_kdf_rounds() -> u32 {
    crate::crypto::DEFAULT_KDF_ROUNDS
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            client_root: default_client_root(),
            poll_interval_secs: default_poll_interval_secs(),
            deadline_secs: default_deadline_secs(),
            environment: default_environment(),
            master_secret_name: default_master_secret_name(),
            pepper_secret_name: default_pepper_secret_name(),
            required_scopes: default_required_scopes(),
            token_type: default_token_type(),
            kdf_rounds: default_kdf_rounds(),
        }
    }
}

impl PairingConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Interval and deadline for mailbox and installation polling.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(Duration::from_secs(self.poll_interval_secs), self.deadline())
    }

    pub fn grant_requirements(&self) -> GrantRequirements {
        GrantRequirements {
            scopes: self
                .required_scopes
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            token_type: self.token_type.clone(),
        }
    }

    /// `{root}/{page}{query}`
    pub fn deep_link(&self, page: &str, query: &str) -> String {
        format!("{}/{}{}", self.client_root.trim_end_matches('/'), page, query)
    }
}

/// Wiki checkout used as the pairing mailbox
#[derive(Debug, Deserialize, Clone)]
pub struct WikiConfig {
    #[serde(default = "default_home")]
    pub home: String,
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
}

fn default_home() -> String {
    "Home.md".to_string()
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("tmp")
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            home: default_home(),
            tmp_dir: default_tmp_dir(),
        }
    }
}

/// Root configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub git: GitConfig,
    /// Production runs sync the wiki and never write `.env`
    #[serde(default)]
    pub production: bool,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub pairing: PairingConfig,
    #[serde(default)]
    pub wiki: WikiConfig,
}

impl Settings {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::layered()?.try_deserialize()
    }

    /// Whether the layered sources mark this as a production run.
    ///
    /// Read before `.env` is loaded, so it needs no other section.
    pub fn is_production() -> Result<bool, ConfigError> {
        Ok(production_flag(&Self::layered()?))
    }

    fn layered() -> Result<Config, ConfigError> {
        Self::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g. DEVICEPASS_GIT__OWNER, DEVICEPASS_PAIRING__DEADLINE_SECS
            .add_source(
                Environment::with_prefix("DEVICEPASS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
    }

    fn builder() -> config::ConfigBuilder<config::builder::DefaultState> {
        Config::builder()
    }
}

fn production_flag(config: &Config) -> bool {
    config.get_bool("production").unwrap_or(false)
}

/// Secrets for one activation, passed in explicitly by the caller.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ActivationConfig {
    pub client_id: String,
    pub master_pass: String,
    /// Owner token used for boards and secrets until the operator's grant arrives
    pub owner_token: String,
}

impl std::fmt::Debug for ActivationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationConfig")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Write `KEY="value"` lines, replacing any existing file.
pub fn write_env_file(path: &Path, entries: &[(&str, &str)]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    for (key, value) in entries {
        writeln!(file, "{}=\"{}\"", key, value.replace('"', "\\\""))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(text: &str) -> Settings {
        Settings::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = from_toml("[git]\nowner = \"octo\"\nrepo = \"device\"\n");
        assert!(!settings.production);
        assert_eq!(settings.pairing.client_root, "https://pass.tvquizphd.com");
        assert_eq!(settings.pairing.environment, "secret-tv-access");
        assert_eq!(settings.pairing.deadline(), Duration::from_secs(900));
        assert_eq!(settings.wiki.home, "Home.md");
        assert_eq!(settings.github.api_url, "https://api.github.com");

        let requirements = settings.pairing.grant_requirements();
        assert_eq!(requirements.scopes, vec!["public_repo", "project"]);
        assert_eq!(requirements.token_type, "bearer");
    }

    #[test]
    fn test_missing_git_section_is_an_error() {
        let result = Settings::builder()
            .add_source(File::from_str("production = true", FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize::<Settings>();
        assert!(result.is_err());
    }

    #[test]
    fn test_production_flag_from_any_layer() {
        let local = Settings::builder()
            .add_source(File::from_str("[git]\nowner = \"octo\"\n", FileFormat::Toml))
            .add_source(File::from_str("production = true", FileFormat::Toml))
            .build()
            .unwrap();
        assert!(production_flag(&local));

        let unset = Settings::builder()
            .add_source(File::from_str("[wiki]\nhome = \"Home.md\"\n", FileFormat::Toml))
            .build()
            .unwrap();
        assert!(!production_flag(&unset));
    }

    #[test]
    fn test_deep_link() {
        let pairing = PairingConfig {
            client_root: "https://pass.example/".into(),
            ..Default::default()
        };
        assert_eq!(
            pairing.deep_link("activate", "?salt=AQ"),
            "https://pass.example/activate?salt=AQ"
        );
    }

    #[test]
    fn test_write_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        write_env_file(&path, &[("PEPPER", "abc"), ("GITHUB_TOKEN", "gho_\"x")]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "PEPPER=\"abc\"\nGITHUB_TOKEN=\"gho_\\\"x\"\n");
    }

    #[test]
    fn test_activation_debug_hides_secrets() {
        let activation = ActivationConfig {
            client_id: "Iv1.abc".into(),
            master_pass: "hunter2".into(),
            owner_token: "ghp_x".into(),
        };
        let shown = format!("{activation:?}");
        assert!(shown.contains("Iv1.abc"));
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("ghp_x"));
    }
}
