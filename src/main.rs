use domain::directory::DbParticipantDirectory;
use domain::ephemeral::ExpirySweeper;
use events::EventPublisher;
use hub::{Hub, HubDomainEventHandler};
use log::*;
use service::{config::Config, logging::Logger, AppState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {e}");
        std::process::exit(1);
    }

    info!("Starting up...");

    let db = match service::init_database(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to establish database connection: {e}");
            std::process::exit(1);
        }
    };

    let directory = Arc::new(DbParticipantDirectory::new(Arc::clone(&db)));
    let hub = Hub::new(directory, config.hub_config());
    hub.spawn_presence_monitor();

    let event_publisher =
        EventPublisher::new().with_handler(Arc::new(HubDomainEventHandler::new(Arc::clone(&hub))));

    let sweeper_shutdown = CancellationToken::new();
    let sweeper = ExpirySweeper::new(
        Arc::clone(&db),
        event_publisher.clone(),
        config.ephemeral_sweep_interval(),
        config.ephemeral_sweep_batch_size,
    )
    .spawn(sweeper_shutdown.clone());

    let app_state = AppState::new(config, &db, Arc::clone(&hub), Arc::new(event_publisher));

    if let Err(e) = web::init_server(app_state, shutdown_signal()).await {
        error!("Server failed: {e}");
    }

    sweeper_shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("Ephemeral expiry sweeper ended abnormally: {e}");
    }
    hub.shutdown().await;

    info!("Shut down cleanly");
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            error!("Failed to listen for Ctrl-C, serving until killed: {e}");
            std::future::pending::<()>().await
        }
    }
}
