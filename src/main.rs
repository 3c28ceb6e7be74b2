//! The cyclebill daemon.
//!
//! Loads configuration, wires adapters, and runs the periodic sweeps.
//! Sections left unconfigured fall back to in-memory adapters, which
//! makes a credential-free local run possible.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cyclebill::adapters::gateway::HttpPaymentGateway;
use cyclebill::adapters::memory::{
    InMemoryBillingProfiles, InMemoryCreditRepository, InMemoryDunningLedger,
    InMemoryEntityLock, InMemoryHistoryStore, InMemoryInvoiceRepository,
    InMemoryPaymentAttemptRepository, InMemoryPlanRepository, InMemorySubscriptionRepository,
    InMemoryUsageStore, InMemoryWorkQueue, FlatRateTaxService, MockGateway,
};
use cyclebill::adapters::notify::{LogNotifier, RetryingNotifier};
use cyclebill::adapters::postgres::{
    PgAdvisoryLock, PostgresHistoryStore, PostgresInvoiceRepository,
    PostgresSubscriptionRepository,
};
use cyclebill::adapters::tax::HttpTaxService;
use cyclebill::application::{BillingEngine, EnginePorts};
use cyclebill::config::AppConfig;
use cyclebill::ports::{
    Clock, EntityLock, HistoryStore, InvoiceRepository, PaymentGateway, SubscriptionRepository,
    SystemClock, TaxService,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .json()
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    let (subscriptions, invoices, history, locks): (
        Arc<dyn SubscriptionRepository>,
        Arc<dyn InvoiceRepository>,
        Arc<dyn HistoryStore>,
        Arc<dyn EntityLock>,
    ) = match &config.database {
        Some(database) => {
            let pool = PgPoolOptions::new()
                .min_connections(database.min_connections)
                .max_connections(database.max_connections)
                .acquire_timeout(database.acquire_timeout())
                .connect(&database.url)
                .await?;
            info!("connected to postgres");
            (
                Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
                Arc::new(PostgresInvoiceRepository::new(pool.clone())),
                Arc::new(PostgresHistoryStore::new(pool.clone())),
                Arc::new(PgAdvisoryLock::new(pool)),
            )
        }
        None => {
            warn!("no database configured, state is in-memory and volatile");
            (
                Arc::new(InMemorySubscriptionRepository::new()),
                Arc::new(InMemoryInvoiceRepository::new()),
                Arc::new(InMemoryHistoryStore::new()),
                Arc::new(InMemoryEntityLock::new()),
            )
        }
    };

    let gateway: Arc<dyn PaymentGateway> = match &config.gateway {
        Some(gateway) => Arc::new(HttpPaymentGateway::new(gateway)?),
        None => {
            warn!("no gateway configured, charges auto-approve");
            Arc::new(MockGateway::new())
        }
    };
    let tax: Arc<dyn TaxService> = match &config.tax {
        Some(tax) => Arc::new(HttpTaxService::new(tax)?),
        None => {
            warn!("no tax service configured, invoices finalize untaxed");
            Arc::new(FlatRateTaxService::new(0))
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ports = EnginePorts {
        subscriptions,
        plans: Arc::new(InMemoryPlanRepository::new()),
        invoices,
        attempts: Arc::new(InMemoryPaymentAttemptRepository::new()),
        credits: Arc::new(InMemoryCreditRepository::new()),
        usage: Arc::new(InMemoryUsageStore::new()),
        profiles: Arc::new(InMemoryBillingProfiles::new()),
        history,
        dunning: Arc::new(InMemoryDunningLedger::new()),
        work_queue: Arc::new(InMemoryWorkQueue::new()),
        gateway,
        tax,
        notifier: Arc::new(RetryingNotifier::new(Arc::new(LogNotifier::new()))),
        locks,
        clock,
    };

    let engine = BillingEngine::new(ports, &config.billing);
    info!(
        sweep_interval_secs = config.billing.sweep_interval_secs,
        "cyclebill daemon started"
    );
    engine.run().await;
    Ok(())
}
