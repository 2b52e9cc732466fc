use std::sync::Arc;

use shiftbell::{
    ActiveShiftController, SystemClock, appsettings::AppSettings,
    scheduling::LogNotificationChannel, spawn_button_worker, storage::InMemoryKeyValueStore,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let settings = AppSettings::load()?;
    log::info!("Starting shiftbell with {:?}", settings.engine);

    let controller = Arc::new(ActiveShiftController::new(
        Arc::new(InMemoryKeyValueStore::new()),
        Arc::new(LogNotificationChannel::default()),
        Arc::new(SystemClock),
        settings.controller_options(),
    ));

    let _events = controller.subscribe(|event| log::info!("[EVENT] {}", event.name()));
    controller.restore().await;

    if let Some(shift) = settings.shift {
        let outcome = controller.set_active_shift(Some(shift)).await;
        for reason in &outcome.skipped {
            log::info!("Not scheduled: {}", reason);
        }
    }

    let shutdown = CancellationToken::new();
    let worker = spawn_button_worker(
        controller.clone(),
        settings.engine.poll_interval(),
        shutdown.clone(),
    );

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");
    shutdown.cancel();
    worker.await?;

    Ok(())
}
