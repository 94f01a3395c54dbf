use crate::config::{Config, ConfigError, ConfigResult, EngineKind};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// 配置管理器
#[derive(Clone)]
pub struct ConfigManager {
    path: PathBuf,
    config: Arc<RwLock<Config>>,
}

impl ConfigManager {
    /// 加载配置文件，不存在时写入默认配置
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let config = if path.exists() {
            info!("Loading config from {:?}", path);
            let content = tokio::fs::read_to_string(path).await?;
            let content = Self::expand_env_vars(&content)?;
            let config: Config = serde_json::from_str(&content)?;
            Self::validate(&config)?;
            config
        } else {
            info!("Config file not found, creating default config at {:?}", path);
            let default_config = Config::default();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let content = serde_json::to_string_pretty(&default_config)?;
            tokio::fs::write(path, &content).await?;
            default_config
        };

        Ok(Self {
            path: path.to_path_buf(),
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// 从默认位置加载配置
    pub async fn load_default() -> ConfigResult<Self> {
        let config_path = Self::default_config_path()?;
        Self::load(&config_path).await
    }

    /// 获取默认配置路径 (~/.cmdgate/config.json)
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        crate::default_config_path()
            .ok_or_else(|| ConfigError::InvalidPath("Could not find home directory".to_string()))
    }

    /// 当前配置的快照
    pub async fn snapshot(&self) -> Config {
        self.config.read().await.clone()
    }

    /// 保存配置到文件
    pub async fn save(&self) -> ConfigResult<()> {
        let config = self.config.read().await;
        let content = serde_json::to_string_pretty(&*config)?;
        drop(config);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, content).await?;
        info!("Config saved to {:?}", self.path);
        Ok(())
    }

    /// 更新配置并保存
    ///
    /// 修改先作用在副本上，校验通过后才替换当前配置；失败时配置保持不变。
    pub async fn update<F>(&self, f: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config) -> ConfigResult<()>,
    {
        let mut config = self.config.write().await;
        let mut next = config.clone();
        f(&mut next)?;
        Self::validate(&next)?;
        *config = next;
        drop(config);
        self.save().await
    }

    /// 验证配置
    pub fn validate(config: &Config) -> ConfigResult<()> {
        if config.server.port == 0 {
            return Err(ConfigError::Validation(
                "Server port cannot be 0".to_string(),
            ));
        }

        if config.session.cookie_name.is_empty() {
            return Err(ConfigError::Validation(
                "Session cookie_name cannot be empty".to_string(),
            ));
        }

        if config.session.ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "Session ttl_secs must be greater than 0".to_string(),
            ));
        }

        if config.session.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "Session sweep_interval_secs must be greater than 0".to_string(),
            ));
        }

        if config.engine.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Engine timeout_secs must be greater than 0".to_string(),
            ));
        }

        if config.engine.max_workers == 0 {
            return Err(ConfigError::Validation(
                "Engine max_workers must be greater than 0".to_string(),
            ));
        }

        if config.engine.kind == EngineKind::Process && config.engine.program.is_none() {
            return Err(ConfigError::Validation(
                "Process engine requires engine.program".to_string(),
            ));
        }

        Ok(())
    }

    /// 展开环境变量 ${VAR} 或 ${VAR:-default}
    fn expand_env_vars(content: &str) -> ConfigResult<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::Validation(format!("Invalid pattern: {}", e)))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let (Some(full_match), Some(var_expr)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            let var_expr = var_expr.as_str();

            let (var_name, default_value) = match var_expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (var_expr, None),
            };

            let replacement = match std::env::var(var_name) {
                Ok(val) => val,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    None => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
                },
            };

            result = result.replace(full_match.as_str(), &replacement);
        }

        Ok(result)
    }

    /// 获取配置文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let manager = ConfigManager::load(&config_path).await.unwrap();
        let config = manager.snapshot().await;

        assert!(config_path.exists());
        assert_eq!(config.server.port, 8820);
        assert_eq!(config.session.ttl_secs, 1800);
    }

    #[tokio::test]
    async fn test_load_existing_config_with_env() {
        std::env::set_var("CMDGATE_TEST_PORT", "9123");

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let content = r#"{
            "version": "0.1.0",
            "server": {"port": ${CMDGATE_TEST_PORT}, "host": "${CMDGATE_TEST_HOST:-0.0.0.0}", "cors": false},
            "session": {"cookie_name": "mgs", "ttl_secs": 30, "sweep_interval_secs": 5}
        }"#;
        tokio::fs::write(&config_path, content).await.unwrap();

        let manager = ConfigManager::load(&config_path).await.unwrap();
        let config = manager.snapshot().await;

        assert_eq!(config.server.port, 9123);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.session.cookie_name, "mgs");
    }

    #[test]
    fn test_env_var_missing() {
        let content = r#"{"key": "${CMDGATE_SURELY_UNSET_VAR}"}"#;
        let err = ConfigManager::expand_env_vars(content).unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarNotFound(name) if name == "CMDGATE_SURELY_UNSET_VAR"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(ConfigManager::validate(&config).is_err());

        config.server.port = 8080;
        assert!(ConfigManager::validate(&config).is_ok());

        config.engine.kind = EngineKind::Process;
        assert!(ConfigManager::validate(&config).is_err());

        config.engine.program = Some("/usr/bin/env".to_string());
        assert!(ConfigManager::validate(&config).is_ok());

        config.session.ttl_secs = 0;
        assert!(ConfigManager::validate(&config).is_err());
    }

    #[tokio::test]
    async fn test_update_persists() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let manager = ConfigManager::load(&config_path).await.unwrap();

        manager
            .update(|c| c.apply_override("session.ttl_secs=42").map(|_| ()))
            .await
            .unwrap();

        let reloaded = ConfigManager::load(&config_path).await.unwrap();
        assert_eq!(reloaded.snapshot().await.session.ttl_secs, 42);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_config_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let manager = ConfigManager::load(&config_path).await.unwrap();
        let before = manager.snapshot().await;

        // Valid field, invalid config.
        let err = manager
            .update(|c| {
                c.server.port = 0;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(manager.snapshot().await, before);

        // The closure itself fails part way through.
        let err = manager
            .update(|c| {
                c.apply_override("session.ttl_secs=5")?;
                c.apply_override("server.port=not-a-port")?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(manager.snapshot().await, before);

        let on_disk = ConfigManager::load(&config_path).await.unwrap();
        assert_eq!(on_disk.snapshot().await, before);
    }
}
