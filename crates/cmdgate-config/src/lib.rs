pub mod config;
pub mod manager;

pub use config::{
    Config, ConfigError, ConfigResult, EngineConfig, EngineKind, LogLevel, LoggingConfig,
    ServerConfig, SessionConfig,
};
pub use manager::ConfigManager;

use std::path::PathBuf;

/// 获取 cmdgate 配置目录路径
pub fn cmdgate_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".cmdgate"))
}

/// 获取默认配置文件路径
pub fn default_config_path() -> Option<PathBuf> {
    cmdgate_dir().map(|dir| dir.join("config.json"))
}

/// 展开路径中的 ~ 为用户主目录
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmdgate_dir() {
        let dir = cmdgate_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().to_string_lossy().contains(".cmdgate"));
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/.cmdgate/config.json");
        assert!(expanded.is_some());
        assert!(!expanded.unwrap().to_string_lossy().starts_with('~'));

        assert_eq!(expand_tilde("/etc/cmdgate.json"), Some(PathBuf::from("/etc/cmdgate.json")));
    }
}
