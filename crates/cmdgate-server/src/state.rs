//! 应用状态 - 由配置构建，在所有 handler 之间共享

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cmdgate_config::{Config, EngineConfig, EngineKind};
use cmdgate_engine::{CommandEngine, CommandRegistry, ProcessEngine};
use cmdgate_gateway::{Gateway, GatewayConfig};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub config: Arc<Config>,
    /// 关闭信号，HTTP 服务和会话清理任务共用
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<dyn CommandEngine>) -> Self {
        let gateway = Gateway::new(gateway_config(&config), engine);
        Self {
            gateway,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    /// 根据配置选择命令引擎
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let engine = build_engine(&config.engine)?;
        Ok(Self::new(config, engine))
    }
}

pub fn gateway_config(config: &Config) -> GatewayConfig {
    GatewayConfig {
        cookie_name: config.session.cookie_name.clone(),
        session_ttl: Duration::from_secs(config.session.ttl_secs),
        sweep_interval: Duration::from_secs(config.session.sweep_interval_secs),
        command_timeout: Duration::from_secs(config.engine.timeout_secs),
        max_workers: config.engine.max_workers,
    }
}

pub fn build_engine(config: &EngineConfig) -> anyhow::Result<Arc<dyn CommandEngine>> {
    match config.kind {
        EngineKind::Builtin => Ok(Arc::new(CommandRegistry::with_builtins())),
        EngineKind::Process => {
            let program = config
                .program
                .as_deref()
                .context("engine.program is required for the process engine")?;
            let program = cmdgate_config::expand_tilde(program)
                .with_context(|| format!("Cannot resolve engine program path: {}", program))?;

            // The process engine kills its child a little after the bridge gives up.
            let engine = ProcessEngine::new(program)
                .with_args(config.args.clone())
                .with_allowed_commands(config.allowed_commands.clone())
                .with_timeout(Duration::from_secs(config.timeout_secs + 1));
            Ok(Arc::new(engine))
        }
    }
}
