use std::{
    process,
    sync::{Arc, OnceLock},
};

use smartsense_node::{
    config::Config,
    core::{indicators::Indicators, scheduler::PollScheduler, sensors::SensorRegistry},
    logger::LoggerManager,
    print_error,
};
use smartsense_mqtt::TransportSession;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

fn log_sensor_table(cfg: &Config) {
    let rows = [
        ("pms5003", cfg.sensors.pms5003),
        ("bme680", cfg.sensors.bme680),
        ("scd40", cfg.sensors.scd40),
        ("bh1750", cfg.sensors.bh1750),
    ];

    let name_width = rows
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(10)
        .max("Sensor".len());

    info!("{:<width$} | Mode", "Sensor", width = name_width);
    info!("{}-+-{}", "-".repeat(name_width), "-".repeat(12));

    for (name, sensor) in rows {
        let mode = match (sensor.enabled, sensor.simulate) {
            (true, true) => "SIMULATED",
            (true, false) => "LIVE",
            (false, _) => "DISABLED",
        };
        info!("{:<width$} | {}", name, mode, width = name_width);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config();
    let mut logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!(
        "Starting smartsense-node version {}...",
        env!("CARGO_PKG_VERSION")
    );
    debug!("{:#?}", cfg.transport);
    info!("Log level: {}", cfg.logger.level);

    log_sensor_table(cfg);

    let mut registry = SensorRegistry::from_config(&cfg.sensors).unwrap_or_else(|e| {
        error!("Failed to build sensor registry: {}", e);
        process::exit(1);
    });
    registry.initialize_all();
    if registry.healthy_count() == 0 {
        error!("No sensor survived initialization, nothing to do");
        process::exit(1);
    }
    info!(
        "{}/{} sensors ready",
        registry.healthy_count(),
        registry.len()
    );

    info!("Starting MQTT session...");
    let (session, commands) = TransportSession::start(&cfg.transport, cfg.node.identity())
        .unwrap_or_else(|e| {
            error!("Failed to start MQTT session: {}", e);
            process::exit(1);
        });

    if let Err(e) = session.wait_connected().await {
        error!("Broker connection failed: {}", e);
        process::exit(1);
    }
    info!("MQTT session established");

    let session = Arc::new(session);
    let cancel = CancellationToken::new();
    let scheduler = PollScheduler::new(
        registry,
        session.clone(),
        Indicators::silent(),
        commands,
        cfg.sensors.read_interval(),
        cancel.clone(),
    );

    let mut scheduler_task: JoinHandle<()> = tokio::spawn(scheduler.run());

    tokio::select! {
        result = &mut scheduler_task => {
            error!("Poll scheduler unexpectedly finished");
            if let Err(e) = result {
                error!("Scheduler task failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C — initiating graceful shutdown...");
            cancel.cancel();
            if let Err(e) = scheduler_task.await {
                error!("Scheduler task failed during shutdown: {}", e);
            }
        }
    }

    match Arc::try_unwrap(session) {
        Ok(session) => session.shutdown().await,
        Err(_) => warn!("session handle still shared, skipping orderly disconnect"),
    }

    info!("Shutdown complete");
    Ok(())
}
