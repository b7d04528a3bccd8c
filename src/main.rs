//! Deposit Sweeper - service entry point
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌────────────┐    ┌────────────┐
//! │ Registry │───▶│ SweepWorker  │───▶│  Treasury  │───▶│ Accounting │
//! │ (users)  │    │ (per account)│    │  (sweeps)  │    │ (webhook)  │
//! └──────────┘    └──────────────┘    └────────────┘    └────────────┘
//!                        │
//!                 ProgressLedger (marks, settled, journal)
//! ```
//!
//! Flags: `--env <name>` (default `dev`), `--once`, `--no-http`.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use deposit_sweeper::config::AppConfig;
use deposit_sweeper::http::state::{AppState, TreasuryWallet};
use deposit_sweeper::sweeper::config::secret_from_env;
use deposit_sweeper::sweeper::filter::same_address;
use deposit_sweeper::sweeper::{
    AccountPipeline, AccountRegistry, ChainClient, Credential, EtherscanIndexer, EvmChainClient,
    FileProgressStore, GasProvisioner, ProgressLedger, SettlementExecutor, SweepWorker,
    WebhookNotifier,
};

// ============================================================
// COMMAND LINE
// ============================================================

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn use_once_mode() -> bool {
    std::env::args().any(|a| a == "--once")
}

fn http_disabled() -> bool {
    std::env::args().any(|a| a == "--no-http")
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env).context("loading configuration")?;
    let _log_guard = deposit_sweeper::logging::init_logging(&app_config);

    info!(
        env = %env,
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        "Starting deposit sweeper"
    );

    let config = &app_config.sweeper;

    // Secrets never live in the config file
    let treasury_key = Credential::new(secret_from_env(&config.treasury.key_env)?);
    let indexer_key = secret_from_env(&config.indexer.api_key_env)?;
    let webhook_token = secret_from_env(&config.notifier.token_env)?;
    let admin_secret = secret_from_env(&app_config.admin_secret_env).ok();
    if admin_secret.is_none() {
        warn!(
            var = %app_config.admin_secret_env,
            "Admin secret not set, admin routes disabled"
        );
    }

    let chain: Arc<dyn ChainClient> =
        Arc::new(EvmChainClient::new(&config.chain).context("building chain client")?);

    let signer_address = chain
        .address_of(&treasury_key)
        .context("deriving treasury address")?;
    if !same_address(&signer_address, &config.treasury.address) {
        // Sweeps go to `treasury.address`; gas and withdrawals come from the key
        warn!(
            configured = %config.treasury.address,
            key_address = %signer_address,
            "Treasury key does not control the configured treasury address"
        );
    }

    let store = Arc::new(FileProgressStore::new(&config.storage.data_dir));
    let ledger = Arc::new(ProgressLedger::open(store).context("opening progress store")?);
    let registry = Arc::new(
        AccountRegistry::open(&config.storage.data_dir).context("opening account registry")?,
    );
    info!(
        data_dir = %config.storage.data_dir,
        accounts = registry.len().await,
        "State loaded"
    );

    let indexer = Arc::new(EtherscanIndexer::new(
        &config.indexer,
        &config.chain.token_address,
        config.chain.token_decimals,
        indexer_key,
    )?);
    let notifier = Arc::new(WebhookNotifier::new(&config.notifier, webhook_token)?);
    let gas = GasProvisioner::new(chain.clone(), treasury_key.clone(), &config.gas);
    let executor = SettlementExecutor::new(
        chain.clone(),
        ledger.clone(),
        config.treasury.address.clone(),
        config.chain.sweep_gas_limit,
        config.settlement.in_flight_stale_secs,
    );
    let pipeline = Arc::new(AccountPipeline::new(
        indexer,
        ledger.clone(),
        gas,
        executor,
        notifier,
    ));
    let worker = SweepWorker::new(
        registry.clone(),
        ledger.clone(),
        pipeline,
        config.service.poll_interval_ms,
        config.service.max_parallel_accounts,
    );

    if use_once_mode() {
        // Ctrl-c stops the cycle between deposits instead of killing it
        let shutdown = worker.shutdown_signal();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Shutdown requested, finishing in-progress deposits");
                shutdown.request_shutdown();
            }
        });

        let report = worker.scan_once().await.context("sweep cycle")?;
        info!(
            accounts = report.accounts,
            settled = report.settled_count(),
            deferred = report.deferred_count(),
            panicked = report.panicked.len(),
            halted = report.halted,
            "Single cycle finished"
        );
        return Ok(());
    }

    if app_config.http.enabled && !http_disabled() {
        let state = Arc::new(AppState::new(
            registry,
            ledger,
            chain,
            TreasuryWallet {
                address: signer_address,
                key: treasury_key,
            },
            config.chain.sweep_gas_limit,
            admin_secret,
        ));
        let host = app_config.http.host.clone();
        let port = app_config.http.port;
        tokio::spawn(async move {
            if let Err(e) = deposit_sweeper::http::run_server(&host, port, state).await {
                error!(error = %e, "Control surface stopped");
            }
        });
    }

    // The worker is never dropped mid-cycle: a submitted sweep must reach
    // the ledger before the process exits
    let shutdown = worker.shutdown_signal();
    let running = tokio::spawn(async move { worker.run().await });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("Shutdown requested, finishing in-progress deposits");
    shutdown.request_shutdown();
    running.await.context("sweep worker task")?;
    info!("Shutdown complete");

    Ok(())
}
