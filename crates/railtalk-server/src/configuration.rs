use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use railtalk::providers::configs::{GeminiProviderConfig, OpenAiProviderConfig, ProviderConfig};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

// No Debug: the api key must not end up in logs
#[derive(Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    Gemini {
        #[serde(default = "default_gemini_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_gemini_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    // Convert to the railtalk ProviderConfig
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::Gemini {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Gemini(GeminiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PromptSettings {
    /// Template file replacing the built-in system prompt
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub prompt: PromptSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Provider defaults, the hosts and models depend on the type
            .set_default("provider.type", "gemini")?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("RAILTALK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Handle missing field errors specially
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `api_key`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .split('`')
                        .next()
                        .unwrap_or_default();
                    let env_var = to_env_var(&qualified_field(field));
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

/// serde only names the leaf of a missing field
fn qualified_field(field: &str) -> String {
    match field {
        "api_key" | "type" => format!("provider.{}", field),
        other => other.to_string(),
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_gemini_host() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("RAILTALK_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("RAILTALK_PROVIDER__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3001);
        assert!(settings.prompt.path.is_none());

        if let ProviderSettings::Gemini {
            host,
            api_key,
            model,
            temperature,
            max_tokens,
        } = settings.provider
        {
            assert_eq!(host, "https://generativelanguage.googleapis.com");
            assert_eq!(api_key, "test-key");
            assert_eq!(model, "gemini-2.5-flash");
            assert_eq!(temperature, None);
            assert_eq!(max_tokens, None);
        } else {
            panic!("Expected Gemini provider");
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_openai_settings() {
        clean_env();
        env::set_var("RAILTALK_PROVIDER__TYPE", "openai");
        env::set_var("RAILTALK_PROVIDER__API_KEY", "sk-test");
        env::set_var("RAILTALK_PROVIDER__TEMPERATURE", "0.7");
        env::set_var("RAILTALK_PROVIDER__MAX_TOKENS", "2000");

        let settings = Settings::new().unwrap();
        if let ProviderSettings::OpenAi {
            host,
            model,
            temperature,
            max_tokens,
            ..
        } = settings.provider
        {
            assert_eq!(host, "https://api.openai.com");
            assert_eq!(model, "gpt-4o");
            assert_eq!(temperature, Some(0.7));
            assert_eq!(max_tokens, Some(2000));
        } else {
            panic!("Expected OpenAI provider");
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("RAILTALK_SERVER__HOST", "0.0.0.0");
        env::set_var("RAILTALK_SERVER__PORT", "8080");
        env::set_var("RAILTALK_PROVIDER__API_KEY", "test-key");
        env::set_var("RAILTALK_PROVIDER__HOST", "http://localhost:9000");
        env::set_var("RAILTALK_PROVIDER__MODEL", "gemini-2.5-pro");
        env::set_var("RAILTALK_PROMPT__PATH", "/etc/railtalk/system.md");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(
            settings.server.socket_addr().unwrap().to_string(),
            "0.0.0.0:8080"
        );
        assert_eq!(
            settings.prompt.path,
            Some(PathBuf::from("/etc/railtalk/system.md"))
        );

        let config = settings.provider.into_config();
        assert_eq!(config.model(), "gemini-2.5-pro");
        if let ProviderConfig::Gemini(config) = config {
            assert_eq!(config.host, "http://localhost:9000");
        } else {
            panic!("Expected Gemini provider");
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_api_key() {
        clean_env();

        match Settings::new() {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert_eq!(env_var, "RAILTALK_PROVIDER__API_KEY");
            }
            Err(other) => panic!("Expected MissingEnvVar, got {}", other),
            Ok(_) => panic!("Expected an error"),
        }
    }

    #[test]
    #[serial]
    fn test_unknown_provider_type() {
        clean_env();
        env::set_var("RAILTALK_PROVIDER__TYPE", "ollama");
        env::set_var("RAILTALK_PROVIDER__API_KEY", "test-key");

        assert!(matches!(Settings::new(), Err(ConfigError::Other(_))));

        clean_env();
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3001,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3001");

        let bad = ServerSettings {
            host: "not a host".to_string(),
            port: 1,
        };
        assert!(bad.socket_addr().is_err());
    }
}
