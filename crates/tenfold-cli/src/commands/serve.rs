use std::sync::Arc;

use tenfold_core::{LogMessenger, Scheduler};
use tokio::sync::watch;
use tracing::{error, info};

use super::App;

/// Run the scheduler in the foreground until Ctrl-C.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;
    let plan = app.config.plan()?;
    let concurrency = app.config.fanout.max_concurrency;
    let scheduler = Scheduler::new(Arc::new(app.engine), Arc::new(LogMessenger), plan, concurrency);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("interrupt received, shutting down"),
                Err(e) => error!(error = %e, "failed to listen for interrupt, shutting down"),
            }
            let _ = shutdown_tx.send(true);
        });
        scheduler.run(shutdown_rx).await
    })?;
    Ok(())
}
