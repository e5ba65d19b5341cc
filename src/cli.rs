use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{NewTicketType, Order};
use crate::ports::InventoryLedger;
use crate::services::{ExpirySweeper, OrderOrchestrator};

#[derive(Parser)]
#[command(name = "boxoffice-core")]
#[command(about = "Boxoffice Core - ticket reservation and order service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and expiry sweeper (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Run a single expiry sweep pass
    Sweep,

    /// Order inspection commands
    #[command(subcommand)]
    Orders(OrderCommands),

    /// Ticket inventory commands
    #[command(subcommand)]
    Inventory(InventoryCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum OrderCommands {
    /// Show an order by id or by code
    Show {
        #[arg(value_name = "ID_OR_CODE")]
        order: String,
    },
}

#[derive(Subcommand)]
pub enum InventoryCommands {
    /// Create a ticket type for an event
    Add {
        #[arg(long)]
        event_id: Uuid,
        #[arg(long)]
        name: String,
        /// Unit price in the smallest currency unit
        #[arg(long)]
        price: i64,
        #[arg(long)]
        quantity: i32,
        #[arg(long, default_value_t = 10)]
        max_per_order: i32,
    },

    /// Show a ticket type's counters
    Show {
        #[arg(value_name = "TICKET_TYPE_ID")]
        id: Uuid,
    },
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    tracing::info!("Database migrations completed");
    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_sweep(sweeper: &ExpirySweeper) -> anyhow::Result<()> {
    let report = sweeper.sweep_once().await?;
    println!(
        "✓ Sweep finished: scanned {}, expired {}, skipped {}, failed {}",
        report.scanned, report.expired, report.skipped, report.failed
    );
    if report.failed > 0 {
        anyhow::bail!("{} order(s) could not be expired", report.failed);
    }
    Ok(())
}

pub async fn handle_orders_show(orchestrator: &OrderOrchestrator, key: &str) -> anyhow::Result<()> {
    let order = match Uuid::parse_str(key) {
        Ok(id) => orchestrator.get_order(id).await?,
        Err(_) => orchestrator.get_order_by_code(key).await?,
    };
    print_order(&order);
    Ok(())
}

fn print_order(order: &Order) {
    println!("Order {} ({})", order.code, order.id);
    println!("  Status:      {}", order.status);
    if let Some(reason) = order.cancel_reason {
        println!("  Reason:      {}", reason.as_str());
    }
    println!("  User:        {}", order.user_id);
    println!("  Buyer:       {} <{}> {}", order.buyer.name, order.buyer.email, order.buyer.phone);
    println!("  Total:       {}", order.total_price);
    println!("  Created:     {}", order.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Expires:     {}", order.expired_at.format("%Y-%m-%d %H:%M:%S"));
    if let (Some(method), Some(reference)) = (order.payment_method, &order.payment_reference) {
        println!("  Payment:     {} {}", method, reference);
    }
    println!("  Items:");
    for item in &order.items {
        println!(
            "    {:<24} {:>4} x {:>12}",
            item.ticket_name, item.quantity, item.unit_price
        );
    }
}

pub async fn handle_inventory_add(
    ledger: &dyn InventoryLedger,
    input: NewTicketType,
) -> anyhow::Result<()> {
    input.validate().map_err(|e| anyhow::anyhow!(e))?;
    let ticket = ledger.create_ticket_type(input).await?;

    tracing::info!(ticket_type_id = %ticket.id, "Ticket type created");
    println!("✓ Ticket type {} created", ticket.id);
    Ok(())
}

pub async fn handle_inventory_show(ledger: &dyn InventoryLedger, id: Uuid) -> anyhow::Result<()> {
    let ticket = ledger.ticket_type(id).await?;
    println!("Ticket type {} ({})", ticket.name, ticket.id);
    println!("  Event:          {}", ticket.event_id);
    println!("  Price:          {}", ticket.price);
    println!("  Total:          {}", ticket.total_quantity);
    println!("  Reserved:       {}", ticket.reserved);
    println!("  Sold:           {}", ticket.sold);
    println!("  Available:      {}", ticket.available());
    println!("  Max per order:  {}", ticket.max_per_order);
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Payment Gateway URL: {}", config.payment_gateway_url);
    println!("  Hold Duration: {}s", config.hold_duration_secs);
    println!(
        "  Sweep: every {}s, batch {}, concurrency {}",
        config.sweep_interval_secs, config.sweep_batch_size, config.sweep_concurrency
    );

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
