// src/main.rs - Sentra alarm engine binary
use anyhow::Context;
use log::info;
use sentra::{AlarmEngine, Config};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());
    info!("Sentra v{} starting with config '{}'", sentra::VERSION, config_path);

    let config = Config::from_file(&config_path)
        .with_context(|| format!("failed to load config from '{}'", config_path))?;
    let mut engine = AlarmEngine::from_config(&config).context("failed to build alarm engine")?;

    // Log every raised condition event; this is the default subscriber a
    // bare deployment gets.
    engine.subscribe_events(|event| {
        let field = |key: &str| {
            event
                .payload
                .get(key)
                .map(|v| v.value.to_string())
                .unwrap_or_default()
        };
        info!(
            "event type={} condition='{}' severity={} message='{}' retain={}",
            event.event_type,
            field("conditionName"),
            field("severity"),
            field("message"),
            field("retain"),
        );
    });

    engine.run(Duration::from_millis(500)).await;

    let stats = serde_json::to_string(&engine.stats())?;
    info!("Final engine stats: {}", stats);
    Ok(())
}
