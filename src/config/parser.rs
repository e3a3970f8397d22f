use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Every batch records the hash of the configuration it ran with.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[checker]
worker-count = 16
host-cooldown-ms = 2000
connect-timeout-ms = 5000

[creation]
worker-count = 4
sample-size = 100

[user-agent]
crawler-name = "TestChecker"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[catalog]
path = "./catalog.json"

[output]
database-path = "./test.db"
report-path = "./report.md"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.checker.worker_count, 16);
        assert_eq!(config.checker.host_cooldown(), Duration::from_secs(2));
        assert_eq!(config.checker.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.creation.sample_size, 100);
        assert_eq!(config.user_agent.crawler_name, "TestChecker");
        assert_eq!(config.catalog.path, "./catalog.json");
    }

    #[test]
    fn test_timeouts_default_when_omitted() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.checker.response_timeout(), Duration::from_secs(30));
        assert_eq!(config.checker.download_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_missing_section() {
        let content = VALID_CONFIG.replace("[catalog]\npath = \"./catalog.json\"\n", "");
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = VALID_CONFIG.replace("worker-count = 16", "worker-count = 0");
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        assert_ne!(
            compute_config_hash(file1.path()).unwrap(),
            compute_config_hash(file2.path()).unwrap()
        );
    }

    #[test]
    fn test_load_config_with_hash() {
        let file = create_temp_config(VALID_CONFIG);
        let (config, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(config.creation.worker_count, 4);
        assert_eq!(hash, compute_config_hash(file.path()).unwrap());
    }
}
