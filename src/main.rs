use smartmeter2mqtt::{build_presentation, Config, MeterBridge, MqttManager};
use tokio::task::JoinHandle;
use std::time::Duration;
use log::{error, info};

fn fail(context: &str, e: impl std::fmt::Display) -> ! {
    error!("{context}: {e}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    // Initialize logging
    let default_filter = std::env::var("SMARTMETER_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let config = Config::load().unwrap_or_else(|e| fail("Unable to load config", e));

    let (mut mqtt, tx) = MqttManager::new(&config).unwrap_or_else(|e| fail("Unable to set up MQTT", e));

    let presentation = build_presentation(&config, tx.clone());
    let mut bridge = MeterBridge::new(&config, tx, presentation)
        .unwrap_or_else(|e| fail("Unable to set up meter bridge", e));

    let mut threads: Vec<JoinHandle<()>> = Vec::new();

    threads.push(tokio::spawn(async move {
        mqtt.start_thread().await;
    }));

    threads.push(tokio::spawn(async move {
        bridge.start_thread().await;
    }));

    info!("All modules started, now waiting for a signal to exit");
    let mut interval = tokio::time::interval(Duration::from_secs(10));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
            _ = interval.tick() => {
                if threads.iter().any(|task| task.is_finished()) {
                    error!("A module stopped unexpectedly, shutting down");
                    break;
                }
            }
        }
    }

    for task in threads.iter_mut() {
        task.abort();
    }
}
