use crate::errors::{AppError, AppResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Directory roots and limits. Paths left unset are derived from `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub document_file: Option<PathBuf>,
    pub uploads_dir: Option<PathBuf>,
    pub public_dir: PathBuf,
    pub admin_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            document_file: None,
            uploads_dir: None,
            public_dir: PathBuf::from("public"),
            admin_dir: PathBuf::from("admin"),
            log_dir: None,
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl AppConfig {
    /// Defaults, then the YAML file at `path` if it exists, then `TIMELINE_*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_yaml_file(path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path).map_err(|error| AppError::Io(error.to_string()))?;
        Self::from_yaml_str(&raw)
            .map_err(|error| AppError::Validation(format!("{}: {}", path.display(), error)))
    }

    pub fn from_yaml_str(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(AppError::from)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = read("TIMELINE_DATA_DIR") {
            self.data_dir = PathBuf::from(value);
        }
        if let Some(value) = read("TIMELINE_DOCUMENT_FILE") {
            self.document_file = Some(PathBuf::from(value));
        }
        if let Some(value) = read("TIMELINE_UPLOADS_DIR") {
            self.uploads_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = read("TIMELINE_PUBLIC_DIR") {
            self.public_dir = PathBuf::from(value);
        }
        if let Some(value) = read("TIMELINE_ADMIN_DIR") {
            self.admin_dir = PathBuf::from(value);
        }
        if let Some(value) = read("TIMELINE_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = read("TIMELINE_PORT") {
            self.port = parse_env("TIMELINE_PORT", &value).map_err(invalid_setting)?;
        }
        if let Some(value) = read("TIMELINE_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_env("TIMELINE_MAX_UPLOAD_BYTES", &value).map_err(invalid_setting)?;
        }
        Ok(())
    }

    pub fn document_path(&self) -> PathBuf {
        self.document_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("timeline.json"))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.uploads_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("uploads"))
    }

    pub fn public_path(&self) -> PathBuf {
        self.public_dir.clone()
    }

    pub fn admin_path(&self) -> PathBuf {
        self.admin_dir.clone()
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| self.data_dir.join("logs"))
    }
}

fn parse_env<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("{} has invalid value '{}'", key, value))
}

fn invalid_setting(error: anyhow::Error) -> AppError {
    AppError::Validation(format!("{:#}", error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn derived_paths_follow_data_dir() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[("TIMELINE_DATA_DIR", "/srv/timeline")]))
            .expect("env applied");
        assert_eq!(config.document_path(), PathBuf::from("/srv/timeline/timeline.json"));
        assert_eq!(config.uploads_path(), PathBuf::from("/srv/timeline/uploads"));
        assert_eq!(config.log_path(), PathBuf::from("/srv/timeline/logs"));
        assert_eq!(config.public_path(), PathBuf::from("public"));
    }

    #[test]
    fn yaml_overrides_then_env_overrides() {
        let mut config = AppConfig::from_yaml_str(
            "dataDir: /var/lib/timeline\nuploadsDir: /mnt/uploads\nport: 8080\n",
        )
        .expect("yaml config");
        assert_eq!(config.port, 8080);
        assert_eq!(config.uploads_path(), PathBuf::from("/mnt/uploads"));
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);

        config
            .apply_env(env(&[("TIMELINE_PORT", "9090"), ("TIMELINE_MAX_UPLOAD_BYTES", "1024")]))
            .expect("env applied");
        assert_eq!(config.port, 9090);
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.document_path(), PathBuf::from("/var/lib/timeline/timeline.json"));
    }

    #[test]
    fn invalid_numeric_env_is_validation_error() {
        let mut config = AppConfig::default();
        let error = config
            .apply_env(env(&[("TIMELINE_PORT", "eighty")]))
            .expect_err("port rejected");
        assert!(matches!(error, AppError::Validation(ref message) if message.contains("TIMELINE_PORT")));
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = AppConfig::from_yaml_str("  \n").expect("empty yaml");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn malformed_yaml_file_names_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("timeline.yaml");
        fs::write(&path, "port: [not, a, number]\n").expect("write yaml");
        let error = AppConfig::from_yaml_file(&path).expect_err("malformed yaml");
        assert!(error.to_string().contains("timeline.yaml"));
    }
}
