use std::{sync::Arc, time::Duration};

use tokio::{
    task::{self, JoinHandle},
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::controller::ActiveShiftController;

/// Re-evaluates button visibility and the daily reset every `interval` until
/// `shutdown` is cancelled. The first evaluation happens immediately.
pub fn spawn_button_worker(
    controller: Arc<ActiveShiftController>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    task::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let view = controller.tick().await;
                    log::debug!("Button is {} (visible = {})", view.state, view.visible);
                }
                _ = shutdown.cancelled() => {
                    log::info!("Button worker shutting down");
                    break;
                }
            };
        }
    })
}
