use std::env;
use std::path::PathBuf;
use std::time::Duration;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone)]
pub struct Config {
    pub client: ClientConfig,
    pub chat: ChatConfig,
    pub documents: DocumentsConfig,
    pub theme: ThemeConfig,
    pub logging: LoggingConfig,
}

/// Connection settings for the backend API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Extra attempts for read queries (health, document list, settings).
    pub read_retries: u32,
    pub token_file: Option<PathBuf>,
    pub api_token: Option<String>,
    pub login_route: String,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub rag_only: bool,
}

#[derive(Debug, Clone)]
pub struct DocumentsConfig {
    pub filter_debounce_ms: u64,
    pub upload_reset_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ThemeConfig {
    pub file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub json: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
            read_retries: 1,
            token_file: None,
            api_token: None,
            login_route: "/login".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DocumentsConfig {
    pub fn filter_debounce(&self) -> Duration {
        Duration::from_millis(self.filter_debounce_ms)
    }

    pub fn upload_reset(&self) -> Duration {
        Duration::from_millis(self.upload_reset_ms)
    }
}

impl LoggingConfig {
    /// Read on its own so logging can be up before the rest of the config.
    pub fn from_env() -> Self {
        Self {
            json: parse_env_or("ATLAS_LOG_JSON", false),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let client_defaults = ClientConfig::default();

        Self {
            client: ClientConfig {
                base_url: non_empty_env("ATLAS_API_URL").unwrap_or(client_defaults.base_url),
                timeout_secs: parse_env_or("ATLAS_TIMEOUT_SECS", client_defaults.timeout_secs),
                read_retries: parse_env_or("ATLAS_READ_RETRIES", client_defaults.read_retries),
                token_file: non_empty_env("ATLAS_TOKEN_FILE").map(PathBuf::from),
                api_token: non_empty_env("ATLAS_API_TOKEN"),
                login_route: non_empty_env("ATLAS_LOGIN_ROUTE")
                    .unwrap_or(client_defaults.login_route),
            },
            chat: ChatConfig {
                rag_only: parse_env_or("ATLAS_RAG_ONLY", true),
            },
            documents: DocumentsConfig {
                filter_debounce_ms: parse_env_or("ATLAS_FILTER_DEBOUNCE_MS", 300),
                upload_reset_ms: parse_env_or("ATLAS_UPLOAD_RESET_MS", 2000),
            },
            theme: ThemeConfig {
                file: non_empty_env("ATLAS_THEME_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(".atlas-theme.json")),
            },
            logging: LoggingConfig::from_env(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "ATLAS_API_URL",
        "ATLAS_TIMEOUT_SECS",
        "ATLAS_READ_RETRIES",
        "ATLAS_TOKEN_FILE",
        "ATLAS_API_TOKEN",
        "ATLAS_LOGIN_ROUTE",
        "ATLAS_RAG_ONLY",
        "ATLAS_FILTER_DEBOUNCE_MS",
        "ATLAS_UPLOAD_RESET_MS",
        "ATLAS_THEME_FILE",
        "ATLAS_LOG_JSON",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::from_env();

        assert_eq!(config.client.base_url, "http://localhost:8000");
        assert_eq!(config.client.timeout_secs, 30);
        assert_eq!(config.client.read_retries, 1);
        assert!(config.client.token_file.is_none());
        assert_eq!(config.client.login_route, "/login");
        assert!(config.chat.rag_only);
        assert_eq!(config.documents.filter_debounce_ms, 300);
        assert_eq!(config.documents.upload_reset(), Duration::from_secs(2));
        assert!(!config.logging.json);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        std::env::set_var("ATLAS_API_URL", "https://atlas.example.com");
        std::env::set_var("ATLAS_READ_RETRIES", "3");
        std::env::set_var("ATLAS_RAG_ONLY", "false");
        std::env::set_var("ATLAS_TOKEN_FILE", "/tmp/atlas-token");

        let config = Config::from_env();
        assert_eq!(config.client.base_url, "https://atlas.example.com");
        assert_eq!(config.client.read_retries, 3);
        assert!(!config.chat.rag_only);
        assert_eq!(
            config.client.token_file,
            Some(PathBuf::from("/tmp/atlas-token"))
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_value_falls_back_to_default() {
        clear_env();
        std::env::set_var("ATLAS_TIMEOUT_SECS", "soon");
        let config = Config::from_env();
        assert_eq!(config.client.timeout_secs, 30);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_blank_url_is_ignored() {
        clear_env();
        std::env::set_var("ATLAS_API_URL", "   ");
        let config = Config::from_env();
        assert_eq!(config.client.base_url, "http://localhost:8000");
        clear_env();
    }
}
