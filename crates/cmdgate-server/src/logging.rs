//! 日志初始化
//!
//! `RUST_LOG` 优先；否则使用配置中的级别和模块级别指令。

use anyhow::Context;
use cmdgate_config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter from config, with an optional level override from the CLI
pub fn build_filter(config: &LoggingConfig, level_override: Option<&str>) -> anyhow::Result<EnvFilter> {
    let level = level_override
        .map(str::to_string)
        .unwrap_or_else(|| config.level.to_string());

    let mut filter = EnvFilter::try_new(&level).with_context(|| format!("Invalid log level: {}", level))?;

    for (module, module_level) in &config.module_levels {
        let directive = format!("{}={}", module, module_level);
        filter = filter.add_directive(
            directive
                .parse()
                .with_context(|| format!("Invalid log directive: {}", directive))?,
        );
    }

    Ok(filter)
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init_logging(config: &LoggingConfig, level_override: Option<&str>) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(config, level_override)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!("Logging initialized (json={})", config.json);
    }
    Ok(())
}
