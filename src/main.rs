use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use boxoffice_core::adapters::PostgresStore;
use boxoffice_core::cli::{self, Cli, Commands, DbCommands, InventoryCommands, OrderCommands};
use boxoffice_core::config::{Config, LogFormat};
use boxoffice_core::domain::NewTicketType;
use boxoffice_core::payment::HttpPaymentGateway;
use boxoffice_core::services::{ExpirySweeper, OrderOrchestrator};
use boxoffice_core::{create_app, db, startup, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = Config::from_env()?;

    init_tracing(config.log_format);

    match args.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Sweep) => {
            let (orchestrator, _) = build(&config).await?;
            let sweeper = ExpirySweeper::new(orchestrator, config.sweeper_settings());
            cli::handle_sweep(&sweeper).await
        }
        Some(Commands::Orders(OrderCommands::Show { order })) => {
            let (orchestrator, _) = build(&config).await?;
            cli::handle_orders_show(&orchestrator, &order).await
        }
        Some(Commands::Inventory(InventoryCommands::Add {
            event_id,
            name,
            price,
            quantity,
            max_per_order,
        })) => {
            let (_, store) = build(&config).await?;
            let input = NewTicketType {
                event_id,
                name,
                price,
                total_quantity: quantity,
                max_per_order,
            };
            cli::handle_inventory_add(&*store, input).await
        }
        Some(Commands::Inventory(InventoryCommands::Show { id })) => {
            let (_, store) = build(&config).await?;
            cli::handle_inventory_show(&*store, id).await
        }
        Some(Commands::Config) => {
            cli::handle_config_validate(&config)?;
            let pool = db::create_pool(&config).await?;
            let report = startup::validate_environment(&config, &pool).await;
            report.print();
            if !report.is_valid() {
                anyhow::bail!("environment checks failed");
            }
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn build(config: &Config) -> anyhow::Result<(Arc<OrderOrchestrator>, Arc<PostgresStore>)> {
    let pool = db::create_pool(config).await?;
    let store = Arc::new(PostgresStore::new(pool));
    let gateway = Arc::new(HttpPaymentGateway::new(config.gateway_settings()));

    let orchestrator = OrderOrchestrator::new(
        store.clone(),
        store.clone(),
        gateway,
        config.order_policy(),
    );
    Ok((Arc::new(orchestrator), store))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let (orchestrator, store) = build(&config).await?;

    db::run_migrations(store.pool()).await?;
    tracing::info!("Database migrations completed");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(orchestrator.clone(), config.sweeper_settings());
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_rx));

    let app = create_app(AppState { orchestrator }, config.request_timeout());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper_handle.await {
        tracing::error!("Expiry sweeper task failed: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
