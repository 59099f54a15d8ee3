use anyhow::Result;
use std::sync::Arc;
use surplus_arbiter::actuator::{ActuatorCommand, ChannelActuator};
use surplus_arbiter::config::Config;
use surplus_arbiter::driver::bridge::{spawn_stdin_reader, spawn_stdout_writer};
use surplus_arbiter::driver::{DriverCommand, EnergyDriver};
use surplus_arbiter::logging::init_logging;
use surplus_arbiter::manager::EnergyManager;
use surplus_arbiter::telemetry::{SystemClock, TelemetryStore};
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path, e))?,
        None => Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?,
    };

    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("surplus-arbiter {} starting up", env!("APP_VERSION"));

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<DriverCommand>();
    let (actuator_tx, actuator_rx) = mpsc::unbounded_channel::<ActuatorCommand>();

    let telemetry = Arc::new(TelemetryStore::new());
    let manager = EnergyManager::new(
        config,
        telemetry.clone(),
        Arc::new(ChannelActuator::new(actuator_tx)),
        Arc::new(SystemClock),
    )
    .map_err(|e| anyhow::anyhow!("Failed to create energy manager: {}", e))?;

    let mut driver = EnergyDriver::new(manager, telemetry, cmd_rx);

    let writer_task = spawn_stdout_writer(actuator_rx);
    let reader_task = spawn_stdin_reader(cmd_tx.clone());

    let signal_tx = cmd_tx;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            let _ = signal_tx.send(DriverCommand::Shutdown);
        }
    });

    let result = driver.run().await;
    reader_task.abort();

    // Dropping the driver closes the actuator channel so the writer can flush and exit
    drop(driver);
    if let Err(e) = writer_task.await {
        error!("Output writer ended abnormally: {}", e);
    }

    match result {
        Ok(()) => {
            info!("Driver shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Driver failed with error: {}", e);
            Err(anyhow::anyhow!("Driver error: {}", e))
        }
    }
}
