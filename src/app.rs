use actix_web::dev::Service;
use actix_web::{web, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api;
use crate::config::AppConfig;
use crate::messaging::{KafkaPublisher, KafkaSource};
use crate::metrics::{self, Metrics};
use crate::replication::{ConsumerSettings, ProducerSettings, ReplicationProducer, TopicConsumer};
use crate::service::EventService;
use crate::store::{EventStore, PgEventStore};
use crate::telemetry::Logger;

// ============================================================================
// App - Wires every component together and drives shutdown
// ============================================================================
//
// Startup order:
//   Postgres pool → (migrations) → EventService
//   Metrics → Kafka publisher/source → producer/consumer
//   HTTP server → producer → consumer
//
// Shutdown (SIGINT/SIGTERM):
//   cancel shared token → stop consumer + producer (close transports)
//   → stop HTTP server gracefully → close pool
//
// The whole graceful part shares one SHUTDOWN_TIMEOUT_SECS deadline: half
// for draining the loops, the rest for in-flight HTTP requests. Past the
// deadline the server is stopped hard and the pool is closed regardless.
//
// ============================================================================

pub struct App {
    config: AppConfig,
    logger: Logger,
    store: PgEventStore,
    service: EventService,
    metrics: Arc<Metrics>,
    producer: ReplicationProducer,
    consumer: TopicConsumer,
}

impl App {
    /// Connect to every backing service. Any failure here is fatal.
    pub async fn build(config: AppConfig, logger: Logger) -> anyhow::Result<Self> {
        tracing::info!("Connecting to Postgres...");
        let store = PgEventStore::connect(&config.database.dsn, config.database.max_connections)
            .await
            .context("failed to connect to postgres")?;
        tracing::info!("✅ Connected to Postgres");

        if config.database.auto_migrate {
            store.migrate().await.context("failed to apply migrations")?;
            tracing::info!("📦 Migrations applied");
        }

        let shared_store: Arc<dyn EventStore> = Arc::new(store.clone());
        let service = EventService::new(shared_store.clone());

        let metrics = Arc::new(Metrics::new()?);
        tracing::info!(
            metric_families = metrics.registry().gather().len(),
            "📊 Metrics registry created"
        );

        let brokers = config.kafka.bootstrap_servers();
        let publisher = KafkaPublisher::new(&brokers, &config.kafka.topic, metrics.clone())
            .context("failed to create kafka producer")?;
        let source = KafkaSource::new(&brokers, &config.kafka.topic, &config.kafka.group_id)
            .context("failed to create kafka consumer")?;

        let timings = &config.replication;
        let budget = ShutdownBudget::split(timings.shutdown_timeout);
        let producer = ReplicationProducer::new(
            shared_store,
            Arc::new(publisher),
            metrics.clone(),
            logger.clone(),
            ProducerSettings {
                interval: timings.interval,
                drain_timeout: budget.loops,
            },
        );
        let consumer = TopicConsumer::new(
            Arc::new(source),
            metrics.clone(),
            logger.clone(),
            ConsumerSettings {
                read_timeout: timings.read_timeout,
                backoff: timings.read_backoff,
                drain_timeout: budget.loops,
            },
        );

        Ok(Self {
            config,
            logger,
            store,
            service,
            metrics,
            producer,
            consumer,
        })
    }

    /// Serve until a shutdown signal arrives (or the HTTP server dies).
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = (self.config.http.host.clone(), self.config.http.port);
        let shutdown_timeout = self.config.replication.shutdown_timeout;
        let budget = ShutdownBudget::split(shutdown_timeout);

        let service = self.service.clone();
        let registry = self.metrics.clone();
        let logger = self.logger.clone();

        let server = HttpServer::new(move || {
            let logger = logger.clone();
            actix_web::App::new()
                .wrap_fn(move |req, srv| logger.attach(srv.call(req)))
                .app_data(web::Data::new(service.clone()))
                .app_data(web::Data::new(registry.clone()))
                .configure(metrics::configure)
                .configure(api::configure)
        })
        .disable_signals()
        .shutdown_timeout(budget.server.as_secs())
        .bind(addr.clone())
        .with_context(|| format!("failed to bind {}:{}", addr.0, addr.1))?
        .run();

        let server_handle = server.handle();
        let mut server_task = actix_web::rt::spawn(server);
        tracing::info!(host = %addr.0, port = addr.1, "🌐 HTTP server listening");

        let shutdown = CancellationToken::new();
        self.producer.start(&shutdown)?;
        self.consumer.start(&shutdown)?;

        let mut server_result = Ok(());
        tokio::select! {
            _ = shutdown_signal() => {}
            joined = &mut server_task => {
                server_result = match joined {
                    Ok(result) => result.context("http server failed"),
                    Err(e) => Err(anyhow::anyhow!("http server task failed: {}", e)),
                };
                tracing::error!("HTTP server exited unexpectedly, shutting down");
            }
        }

        tracing::info!(
            timeout_secs = shutdown_timeout.as_secs_f64(),
            "🛑 Shutting down"
        );
        let deadline = Instant::now() + shutdown_timeout;
        shutdown.cancel();

        let graceful = async {
            let (consumer_stopped, producer_stopped) =
                tokio::join!(self.consumer.stop(), self.producer.stop());
            if let Err(e) = consumer_stopped {
                tracing::error!(error = %e, "Topic consumer stop error");
            }
            if let Err(e) = producer_stopped {
                tracing::error!(error = %e, "Replication producer stop error");
            }

            server_handle.stop(true).await;
        };

        if tokio::time::timeout_at(deadline, graceful).await.is_err() {
            tracing::warn!(
                timeout_secs = shutdown_timeout.as_secs_f64(),
                "⏱️  Graceful shutdown exceeded its deadline, forcing"
            );
            server_handle.stop(false).await;
        }
        if !server_task.is_finished() {
            server_task.abort();
        }

        self.store.close().await;
        tracing::info!("✅ Shutdown complete");

        server_result
    }
}

/// One shutdown deadline split between loop draining and the HTTP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShutdownBudget {
    loops: Duration,
    server: Duration,
}

impl ShutdownBudget {
    fn split(total: Duration) -> Self {
        let loops = total / 2;
        Self {
            loops,
            server: total - loops,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = sigterm => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
