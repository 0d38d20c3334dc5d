// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use genqueue::config::settings::Settings;
use genqueue::detector::completion_detector::{CompletionDetector, DetectorConfig};
use genqueue::detector::response_parser::EndpointPatterns;
use genqueue::domain::repositories::state_repository::StateRepository;
use genqueue::domain::services::completion_notifier::CompletionNotifier;
use genqueue::infrastructure::durable_store::DurableStore;
use genqueue::infrastructure::metrics;
use genqueue::infrastructure::services::telegram_notifier::TelegramNotifier;
use genqueue::infrastructure::storage::create_state_repository;
use genqueue::messaging::channel;
use genqueue::messaging::target_link::{ChannelTargetLink, TargetLink};
use genqueue::monitor::silence_monitor::{SilenceMonitorConfig, TrafficSilenceMonitor};
use genqueue::presentation::routes::{self, AppState};
use genqueue::queue::orchestrator::QueueOrchestrator;
use genqueue::queue::recovery::StartupRecovery;
use genqueue::target::chromium_driver::ChromiumPageDriver;
use genqueue::target::driver::PageDriver;
use genqueue::utils::telemetry;
use genqueue::workers::{BackgroundWorker, TargetWorker};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const CHANNEL_CAPACITY: usize = 64;

/// 主函数
///
/// 应用程序入口点，在同一个运行时中装配后台上下文和页面上下文
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting genqueue...");

    // 2. Load configuration
    let settings = Settings::new()?;
    info!("Configuration loaded");

    metrics::init_metrics(&settings.metrics);

    // 3. Open durable store and recover interrupted jobs
    let backend: Arc<dyn StateRepository> = Arc::from(create_state_repository(&settings.store));
    let store = Arc::new(
        DurableStore::open(
            backend,
            settings.store.history_limit,
            settings.queue.seed_config(),
        )
        .await?,
    );
    let report = StartupRecovery::new(store.clone()).run().await?;
    info!(recovered = report.recovered, "Durable store ready");

    // 4. Message channels between the two contexts
    let (target_endpoint, target_inbox) = channel::channel(CHANNEL_CAPACITY);
    let (background_endpoint, background_inbox) = channel::channel(CHANNEL_CAPACITY);
    let target_link: Arc<dyn TargetLink> = Arc::new(ChannelTargetLink::new(
        target_endpoint,
        Duration::from_millis(settings.target.delivery_timeout_ms),
    ));

    // 5. Page context
    let driver: Arc<dyn PageDriver> = Arc::new(ChromiumPageDriver::launch(&settings.target).await?);
    info!(target_id = %driver.target_id(), url = %settings.target.url, "Target page opened");
    let detector = Arc::new(CompletionDetector::new(
        driver.clone(),
        DetectorConfig::from(&settings.detector),
        EndpointPatterns::new(
            settings.target.creation_patterns.clone(),
            settings.target.polling_patterns.clone(),
        ),
    ));
    TargetWorker::new(detector, background_endpoint, store.clone()).start(target_inbox);

    // 6. Background context
    let notifier: Arc<dyn CompletionNotifier> = Arc::new(TelegramNotifier::new(store.clone()));
    let orchestrator = QueueOrchestrator::new(store.clone(), target_link.clone(), Some(notifier));
    let monitor = Arc::new(TrafficSilenceMonitor::new(SilenceMonitorConfig::from(
        &settings.monitor,
    )));
    monitor.attach(driver.target_id(), driver.network_events());
    BackgroundWorker::new(orchestrator.clone(), monitor, target_link).start(background_inbox);

    // 7. Start HTTP server
    let app = routes::routes(AppState::new(orchestrator.clone())).layer(TraceLayer::new_for_http());
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = orchestrator.stop().await {
        error!("Failed to stop queue on shutdown: {}", e);
    }
    info!("genqueue stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
