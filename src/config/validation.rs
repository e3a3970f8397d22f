use crate::config::types::{
    CatalogConfig, CheckerConfig, Config, CreationConfig, OutputConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Upper bound on either worker pool
const MAX_WORKERS: usize = 256;

/// Upper bound on the per-host cooldown (10 minutes)
const MAX_COOLDOWN_MS: u64 = 600_000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_checker_config(&config.checker)?;
    validate_creation_config(&config.creation)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_catalog_config(&config.catalog)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_worker_count(name: &str, count: usize) -> Result<(), ConfigError> {
    if count < 1 || count > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "{} must be between 1 and {}, got {}",
            name, MAX_WORKERS, count
        )));
    }
    Ok(())
}

fn validate_timeout(name: &str, millis: u64) -> Result<(), ConfigError> {
    if millis == 0 {
        return Err(ConfigError::Validation(format!("{} must be > 0", name)));
    }
    Ok(())
}

/// Validates checker configuration
fn validate_checker_config(config: &CheckerConfig) -> Result<(), ConfigError> {
    validate_worker_count("checker.worker_count", config.worker_count)?;

    if config.host_cooldown_ms > MAX_COOLDOWN_MS {
        return Err(ConfigError::Validation(format!(
            "host_cooldown_ms must be <= {}ms, got {}ms",
            MAX_COOLDOWN_MS, config.host_cooldown_ms
        )));
    }

    validate_timeout("connect_timeout_ms", config.connect_timeout_ms)?;
    validate_timeout("response_timeout_ms", config.response_timeout_ms)?;
    validate_timeout("download_timeout_ms", config.download_timeout_ms)?;

    Ok(())
}

/// Validates run creation configuration
fn validate_creation_config(config: &CreationConfig) -> Result<(), ConfigError> {
    validate_worker_count("creation.worker_count", config.worker_count)?;

    if config.sample_size < 1 {
        return Err(ConfigError::Validation(format!(
            "sample_size must be >= 1, got {}",
            config.sample_size
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_catalog_config(config: &CatalogConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "catalog path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.report_path.is_empty() {
        return Err(ConfigError::Validation(
            "report_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => {
            return Err(ConfigError::Validation(format!(
                "Invalid email format: '{}'",
                email
            )))
        }
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
