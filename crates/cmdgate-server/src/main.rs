use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use cmdgate_config::{ConfigManager, EngineKind};
use cmdgate_server::{init_logging, run_server, AppState};

#[derive(Parser, Debug, Clone)]
#[command(name = "cmdgate-server")]
#[command(about = "Session-aware REST / JSON-RPC / WebSocket gateway for a command engine")]
#[command(version)]
struct Cli {
    /// Enable debug mode
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// Server port (overrides config)
    #[arg(long, env = "CMDGATE_PORT")]
    port: Option<u16>,

    /// Bind address (overrides config)
    #[arg(long, env = "CMDGATE_HOST")]
    host: Option<String>,

    /// Log level or filter directives (overrides config)
    #[arg(long, env = "CMDGATE_LOG")]
    log_level: Option<String>,

    /// External engine program; switches to the process engine
    #[arg(long, env = "CMDGATE_ENGINE_PROGRAM")]
    engine_program: Option<String>,

    /// Config file path (default: ~/.cmdgate/config.json)
    #[arg(long, env = "CMDGATE_CONFIG")]
    config: Option<String>,

    /// Override a config value, e.g. --set session.ttl_secs=600 (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Write the --set overrides back to the config file
    #[arg(long, requires = "overrides")]
    save: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config_manager = match &cli.config {
        Some(path) => {
            let config_path =
                cmdgate_config::expand_tilde(path).unwrap_or_else(|| PathBuf::from(path));
            ConfigManager::load(&config_path)
                .await
                .with_context(|| format!("Failed to load config from {:?}", config_path))?
        }
        None => ConfigManager::load_default()
            .await
            .context("Failed to load default config")?,
    };

    // --set 覆盖，--save 时写回配置文件
    if cli.save {
        config_manager
            .update(|config| {
                for pair in &cli.overrides {
                    config.apply_override(pair)?;
                }
                Ok(())
            })
            .await
            .context("Failed to save config overrides")?;
    }
    let mut config = config_manager.snapshot().await;
    let mut overridden = Vec::with_capacity(cli.overrides.len());
    for pair in &cli.overrides {
        let key = config
            .apply_override(pair)
            .with_context(|| format!("Invalid --set {}", pair))?;
        overridden.push(key);
    }

    // CLI 参数覆盖配置文件
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(program) = cli.engine_program {
        config.engine.kind = EngineKind::Process;
        config.engine.program = Some(program);
    }
    ConfigManager::validate(&config).context("Invalid configuration")?;

    // 初始化日志
    let level = cli
        .log_level
        .or_else(|| cli.debug.then(|| "debug".to_string()));
    init_logging(&config.logging, level.as_deref())?;

    tracing::info!("Config loaded from {:?}", config_manager.path());
    for key in overridden {
        tracing::info!(
            "Override {} = {}",
            key,
            config.get_value(key).unwrap_or_default()
        );
    }
    if cli.save {
        tracing::info!("Overrides saved to {:?}", config_manager.path());
    }
    tracing::info!(
        "Engine: {}, timeout {}s, {} worker(s)",
        config.engine.kind,
        config.engine.timeout_secs,
        config.engine.max_workers
    );
    tracing::debug!(
        "Session cookie '{}', ttl {}s, sweep every {}s",
        config.session.cookie_name,
        config.session.ttl_secs,
        config.session.sweep_interval_secs
    );

    let state = AppState::from_config(config)?;

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
        shutdown.cancel();
    });

    run_server(state).await
}
