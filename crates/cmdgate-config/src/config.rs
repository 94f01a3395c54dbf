use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 主配置结构体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            engine: EngineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// 获取配置值的快捷方法
    pub fn get_value(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["version"] => Some(self.version.clone()),
            ["server", "port"] => Some(self.server.port.to_string()),
            ["server", "host"] => Some(self.server.host.clone()),
            ["server", "cors"] => Some(self.server.cors.to_string()),
            ["session", "cookie_name"] => Some(self.session.cookie_name.clone()),
            ["session", "ttl_secs"] => Some(self.session.ttl_secs.to_string()),
            ["session", "sweep_interval_secs"] => {
                Some(self.session.sweep_interval_secs.to_string())
            }
            ["engine", "kind"] => Some(self.engine.kind.to_string()),
            ["engine", "program"] => self.engine.program.clone(),
            ["engine", "timeout_secs"] => Some(self.engine.timeout_secs.to_string()),
            ["engine", "max_workers"] => Some(self.engine.max_workers.to_string()),
            ["logging", "level"] => Some(self.logging.level.to_string()),
            ["logging", "json"] => Some(self.logging.json.to_string()),
            _ => None,
        }
    }

    /// 设置配置值
    pub fn set_value(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["server", "port"] => {
                self.server.port = parse_field(value, "port number")?;
            }
            ["server", "host"] => {
                self.server.host = value.to_string();
            }
            ["server", "cors"] => {
                self.server.cors = parse_field(value, "boolean")?;
            }
            ["session", "cookie_name"] => {
                self.session.cookie_name = value.to_string();
            }
            ["session", "ttl_secs"] => {
                self.session.ttl_secs = parse_field(value, "number")?;
            }
            ["session", "sweep_interval_secs"] => {
                self.session.sweep_interval_secs = parse_field(value, "number")?;
            }
            ["engine", "kind"] => {
                self.engine.kind = value.parse()?;
            }
            ["engine", "program"] => {
                self.engine.program = Some(value.to_string());
            }
            ["engine", "timeout_secs"] => {
                self.engine.timeout_secs = parse_field(value, "number")?;
            }
            ["engine", "max_workers"] => {
                self.engine.max_workers = parse_field(value, "number")?;
            }
            ["logging", "level"] => {
                self.logging.level = value.parse()?;
            }
            ["logging", "json"] => {
                self.logging.json = parse_field(value, "boolean")?;
            }
            _ => return Err(ConfigError::KeyNotFound(key.to_string())),
        }
        Ok(())
    }

    /// 应用一条 `key=value` 形式的覆盖，返回被修改的键
    pub fn apply_override<'a>(&mut self, pair: &'a str) -> ConfigResult<&'a str> {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ConfigError::Validation(format!("Expected key=value, got: {}", pair)))?;
        let key = key.trim();
        self.set_value(key, value.trim())?;
        Ok(key)
    }
}

fn parse_field<T: std::str::FromStr>(value: &str, what: &str) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("Invalid {}: {}", what, value)))
}

/// Server 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8820,
            host: "127.0.0.1".to_string(),
            cors: true,
        }
    }
}

/// Session 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// 保存会话 ID 的 cookie 名称
    pub cookie_name: String,
    /// 空闲超过该时长（秒）的会话会被清理
    pub ttl_secs: u64,
    /// 清理任务的执行间隔（秒）
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sid".to_string(),
            ttl_secs: 1800,
            sweep_interval_secs: 60,
        }
    }
}

/// 命令引擎类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// In-process command registry
    #[default]
    Builtin,
    /// External program, one process per invocation
    Process,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Builtin => write!(f, "builtin"),
            EngineKind::Process => write!(f, "process"),
        }
    }
}

impl std::str::FromStr for EngineKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "builtin" => Ok(EngineKind::Builtin),
            "process" => Ok(EngineKind::Process),
            _ => Err(ConfigError::Validation(format!("Invalid engine kind: {}", s))),
        }
    }
}

/// Engine 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub kind: EngineKind,
    /// 外部程序路径（仅 process 引擎）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// 放在每次调用参数之前的固定参数
    #[serde(default)]
    pub args: Vec<String>,
    /// 允许调用的命令（为空表示全部允许）
    #[serde(default)]
    pub allowed_commands: Vec<String>,
    /// 单次调用的执行时限（秒）
    pub timeout_secs: u64,
    /// 同时执行的命令数上限
    pub max_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Builtin,
            program: None,
            args: Vec::new(),
            allowed_commands: Vec::new(),
            timeout_secs: 30,
            max_workers: 16,
        }
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::Validation(format!("Invalid log level: {}", s))),
        }
    }
}

/// Logging 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// 是否使用 JSON 格式输出
    #[serde(default)]
    pub json: bool,
    /// 模块级别的日志配置
    #[serde(default)]
    pub module_levels: HashMap<String, LogLevel>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8820);
        assert_eq!(config.session.cookie_name, "sid");
        assert_eq!(config.engine.kind, EngineKind::Builtin);
    }

    #[test]
    fn test_get_and_set_value() {
        let mut config = Config::default();
        config.set_value("session.ttl_secs", "90").unwrap();
        config.set_value("engine.kind", "process").unwrap();
        config.set_value("logging.level", "DEBUG").unwrap();

        assert_eq!(config.get_value("session.ttl_secs").as_deref(), Some("90"));
        assert_eq!(config.get_value("engine.kind").as_deref(), Some("process"));
        assert_eq!(config.get_value("logging.level").as_deref(), Some("debug"));
        assert!(config.get_value("engine.program").is_none());
    }

    #[test]
    fn test_set_value_rejects_bad_input() {
        let mut config = Config::default();
        assert!(matches!(
            config.set_value("server.port", "not-a-port"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            config.set_value("server.nope", "1"),
            Err(ConfigError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::default();
        assert_eq!(config.apply_override("server.port=9001").unwrap(), "server.port");
        assert_eq!(config.apply_override(" engine.program = /usr/bin/env ").unwrap(), "engine.program");
        assert_eq!(config.get_value("server.port").as_deref(), Some("9001"));
        assert_eq!(config.engine.program.as_deref(), Some("/usr/bin/env"));

        assert!(matches!(
            config.apply_override("server.port"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            config.apply_override("nope=1"),
            Err(ConfigError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_partial_config_uses_section_defaults() {
        let json = r#"{"version": "0.1.0", "server": {"port": 9000, "host": "0.0.0.0", "cors": false}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.engine.max_workers, 16);
    }
}
