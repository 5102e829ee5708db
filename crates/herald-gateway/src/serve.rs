//! `herald serve`: wire the scheduler, dispatcher and bot together and run
//! until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use herald_core::config::HeraldConfig;
use herald_core::MessageBus;
use herald_dispatch::{LogSender, Pool, Sender, Subscriber};
use herald_scheduler::{LocalCron, QueuedTask, Scheduler, SqliteJobStore};
use herald_telegram::TelegramAdapter;

use crate::router::TaskRouter;

pub(crate) async fn run(config: HeraldConfig) -> anyhow::Result<()> {
    let db_path = &config.database.path;
    info!(path = %db_path, "opening SQLite database");
    let store = SqliteJobStore::new(crate::open_db(db_path)?)?;
    info!(jobs = store.count()?, "job catalog ready");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let bus = MessageBus::new(config.dispatch.bus_capacity);

    // Telegram adapter (optional): outbound sender + inbound command loop.
    let adapter = match &config.telegram {
        Some(tg) => match TelegramAdapter::new(tg, bus.clone()) {
            Ok(adapter) => Some(adapter),
            Err(e) => {
                warn!(error = %e, "Telegram disabled");
                None
            }
        },
        None => None,
    };
    let sender: Arc<dyn Sender> = match &adapter {
        Some(adapter) => {
            if let Err(e) = adapter.verify().await {
                warn!(error = %e, "Telegram token check failed, continuing");
            }
            Arc::new(adapter.sender())
        }
        None => {
            warn!("no telegram.bot_token configured, notifications will be logged and dropped");
            Arc::new(LogSender)
        }
    };

    // Dispatcher: bus -> subscriber -> pool -> workers.
    let dispatch = &config.dispatch;
    let pool = Arc::new(
        Pool::new(sender)
            .with_max_workers(dispatch.max_workers)
            .with_tick(Duration::from_millis(dispatch.tick_millis))
            .with_worker_period(Duration::from_secs(dispatch.worker_period_secs)),
    );
    let subscriber = Subscriber::new(Arc::clone(&pool)).with_max_retry(dispatch.max_retry);

    // Scheduler: job catalog -> cron runtime -> fired tasks -> router -> bus.
    let (fired_tx, fired_rx) =
        tokio::sync::mpsc::channel::<QueuedTask>(config.scheduler.queue_capacity);
    let scheduler = Scheduler::new(Arc::new(store), Arc::new(LocalCron::new(fired_tx)))
        .with_interval(Duration::from_secs(config.scheduler.sync_interval_secs))
        .with_sync_timeout(Duration::from_secs(config.scheduler.sync_timeout_secs));
    let router = TaskRouter::new(bus.clone(), shutdown_rx.clone());

    let mut tasks = Vec::new();
    {
        let pool = Arc::clone(&pool);
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { pool.run(rx).await }));
    }
    {
        let bus_rx = bus.subscribe();
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { subscriber.run(bus_rx, rx).await }));
    }
    tasks.push(tokio::spawn(router.run(fired_rx)));
    {
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = scheduler.run(rx).await {
                error!(error = %e, "scheduler stopped with error");
            }
        }));
    }
    if let Some(adapter) = adapter {
        tasks.push(tokio::spawn(adapter.run(shutdown_rx.clone())));
        info!("Telegram bot started");
    }

    info!("herald running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }
    info!("herald stopped");
    Ok(())
}
