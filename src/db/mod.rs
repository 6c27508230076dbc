use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use rocket::fairing::AdHoc;

use crate::bank::Bank;
use crate::config::Config;
use crate::services::{CredentialStore, EmailService};
use crate::store::{DocumentStore, MemoryStore, MongoStore};

/// Connects the configured stores, prepares indexes and the configuration
/// singleton, and manages the resulting [`Bank`]. Ignition fails when any of
/// that fails.
pub fn init() -> AdHoc {
    AdHoc::try_on_ignite("Bank", |rocket| async {
        match connect().await {
            Ok(bank) => {
                info!("✓ Bank ready (routing code {})", bank.settings.routing_code);
                Ok(rocket.manage(bank))
            }
            Err(e) => {
                error!("✗ Failed to prepare the bank: {}", e);
                Err(rocket)
            }
        }
    })
}

async fn stores() -> Result<(Arc<dyn DocumentStore>, Arc<dyn DocumentStore>), String> {
    match Config::store_backend().as_str() {
        "memory" => {
            warn!("Using the in-memory store; nothing survives a restart");
            Ok((Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new())))
        }
        "mongodb" => {
            let store = MongoStore::connect(&Config::mongodb_uri(), &Config::mongodb_database())
                .await
                .map_err(|e| format!("MongoDB: {}", e))?;
            info!("✓ MongoDB connected successfully");
            let ledger = MongoStore::connect(&Config::ledger_mongodb_uri(), &Config::ledger_database())
                .await
                .map_err(|e| format!("Ledger MongoDB: {}", e))?;
            info!("✓ Ledger MongoDB connected successfully");
            Ok((Arc::new(store), Arc::new(ledger)))
        }
        other => Err(format!("Unknown store_backend '{}'", other)),
    }
}

async fn connect() -> Result<Bank, String> {
    let (store, ledger) = stores().await?;
    let bank = Bank::new(
        store.clone(),
        ledger,
        Arc::new(CredentialStore::new(store)),
        Arc::new(EmailService::from_config()),
        Config::bank_settings(),
    );
    bank.prepare(Config::admin_password().as_deref())
        .await
        .map_err(|e| e.to_string())?;
    Ok(bank)
}

/// Pulls inter-bank credits on a fixed interval once the server is up.
pub fn settlement() -> AdHoc {
    AdHoc::on_liftoff("Periodic settlement", |rocket| {
        Box::pin(async move {
            let interval = Config::settlement_interval_secs();
            if interval == 0 {
                info!("Periodic settlement disabled");
                return;
            }
            let Some(bank) = rocket.state::<Bank>().cloned() else {
                warn!("No bank managed; periodic settlement not started");
                return;
            };
            let shutdown = rocket.shutdown();

            tokio::spawn(async move {
                tokio::pin!(shutdown);
                let mut ticker = tokio::time::interval(Duration::from_secs(interval));
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            match bank.settlement().receive_money().await {
                                Ok(report) if report.credits_applied > 0 || report.credits_unroutable > 0 => {
                                    info!("Periodic settlement: {:?}", report)
                                }
                                Ok(_) => {}
                                Err(e) => error!("Periodic settlement failed: {}", e),
                            }
                        }
                        _ = &mut shutdown => break,
                    }
                }
            });
        })
    })
}
