//! Server configuration.
//!
//! Loaded from `perod.toml` (path via `--config` / `PEROD_CONFIG`) with
//! environment-variable overrides per field. Each integration unit has its
//! own optional section; a unit whose section is absent or incomplete simply
//! fails its factory at discovery time and the rest of the surface comes up
//! without it.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_SERVER_NAME: &str = "Pero Relay";
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 8000;
const DEFAULT_APPSTORE_BASE_URL: &str = "https://api.appstoreconnect.apple.com/v1";
const DEFAULT_GCS_BASE_URL: &str = "https://storage.googleapis.com/storage/v1";
const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_SSH_TIMEOUT_SECS: u64 = 30;

// ─── Integration sections ────────────────────────────────────────────────────

/// `[appstore]` — App Store Connect API access.
///
/// Token minting (ES256 key signing) happens outside the daemon; the config
/// carries a pre-minted bearer token.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppStoreConfig {
    pub bearer_token: String,
    #[serde(default = "default_appstore_base_url")]
    pub base_url: String,
    /// Vendor number for the sales/finance reporting endpoints. Optional;
    /// the analytics tools answer with a configuration hint when unset.
    #[serde(default)]
    pub vendor_number: Option<String>,
}

fn default_appstore_base_url() -> String {
    DEFAULT_APPSTORE_BASE_URL.to_string()
}

/// `[googleplay]` — Google Play financial/sales report access.
///
/// Reports live in a per-developer GCS bucket (`pubsite_prod_rev_*`); the
/// config carries a pre-minted OAuth access token with read-only storage
/// scope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GooglePlayConfig {
    pub access_token: String,
    pub bucket: String,
    pub package_name: String,
    #[serde(default = "default_gcs_base_url")]
    pub base_url: String,
}

fn default_gcs_base_url() -> String {
    DEFAULT_GCS_BASE_URL.to_string()
}

/// `[ssh]` — remote shell target.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SshConfig {
    pub host: String,
    pub username: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Path to the private key file. Password auth is not supported — the
    /// daemon shells out to the system `ssh` in batch mode.
    pub identity_file: Option<String>,
    #[serde(default = "default_ssh_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_ssh_timeout_secs() -> u64 {
    DEFAULT_SSH_TIMEOUT_SECS
}

// ─── Top level ───────────────────────────────────────────────────────────────

/// `[server]` — identity and HTTP bind settings. Every field is optional;
/// command-line flags take precedence, these take precedence over the
/// built-in defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSection {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub appstore: Option<AppStoreConfig>,
    pub googleplay: Option<GooglePlayConfig>,
    pub ssh: Option<SshConfig>,
}

impl ServerConfig {
    /// Load from a TOML file, then apply environment overrides. A missing
    /// file is not an error — env-only configuration is fine.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?
            }
            Some(path) => {
                debug!(path = %path.display(), "config file not found — using env only");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Environment variables override (or stand in for) file sections.
    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("APP_STORE_BEARER_TOKEN") {
            let base_url = self
                .appstore
                .as_ref()
                .map(|a| a.base_url.clone())
                .unwrap_or_else(default_appstore_base_url);
            let vendor_number = std::env::var("APP_STORE_VENDOR_NUMBER")
                .ok()
                .or_else(|| self.appstore.as_ref().and_then(|a| a.vendor_number.clone()));
            self.appstore = Some(AppStoreConfig {
                bearer_token: token,
                base_url,
                vendor_number,
            });
        } else if let (Some(appstore), Ok(vendor)) =
            (self.appstore.as_mut(), std::env::var("APP_STORE_VENDOR_NUMBER"))
        {
            appstore.vendor_number = Some(vendor);
        }

        if let (Ok(token), Ok(bucket), Ok(package)) = (
            std::env::var("GOOGLE_PLAY_ACCESS_TOKEN"),
            std::env::var("GOOGLE_PLAY_BUCKET"),
            std::env::var("GOOGLE_PLAY_PACKAGE_NAME"),
        ) {
            let base_url = self
                .googleplay
                .as_ref()
                .map(|g| g.base_url.clone())
                .unwrap_or_else(default_gcs_base_url);
            self.googleplay = Some(GooglePlayConfig {
                access_token: token,
                bucket,
                package_name: package,
                base_url,
            });
        }

        if let (Ok(host), Ok(username)) = (std::env::var("SSH_HOST"), std::env::var("SSH_USERNAME")) {
            let port = std::env::var("SSH_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SSH_PORT);
            let timeout_secs = std::env::var("SSH_TIMEOUT")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(DEFAULT_SSH_TIMEOUT_SECS);
            self.ssh = Some(SshConfig {
                host,
                username,
                port,
                identity_file: std::env::var("SSH_PRIVATE_KEY_PATH").ok(),
                timeout_secs,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_reads_file_and_tolerates_missing_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[ssh]\nhost = \"build.example.com\"\nusername = \"ci\""
        )
        .expect("write config");

        let config = ServerConfig::load(Some(file.path())).expect("load from file");
        assert_eq!(config.ssh.expect("ssh section").host, "build.example.com");

        let missing = Path::new("/nonexistent/perod.toml");
        let config = ServerConfig::load(Some(missing)).expect("missing file is not an error");
        assert!(config.ssh.is_none() || std::env::var("SSH_HOST").is_ok());
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
            [appstore]
            bearer_token = "tok"

            [ssh]
            host = "build.example.com"
            username = "ci"
        "#;
        let config: ServerConfig = toml::from_str(raw).expect("valid toml");
        let appstore = config.appstore.expect("appstore section");
        assert_eq!(appstore.bearer_token, "tok");
        assert_eq!(appstore.base_url, DEFAULT_APPSTORE_BASE_URL);
        let ssh = config.ssh.expect("ssh section");
        assert_eq!(ssh.port, DEFAULT_SSH_PORT);
        assert!(config.googleplay.is_none(), "absent section stays None");
    }
}
