use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a config key such as `provider.api_key` to its environment variable
pub fn to_env_var(field: &str) -> String {
    let field = field.trim_start_matches("railtalk.");
    format!("RAILTALK_{}", field.replace('.', "__").to_uppercase())
}
