//! berth uninstall scheduler
//!
//! Entrypoint for the teardown variant of the berth scheduler. It loads
//! the persisted service state, builds the uninstall plan, and serves
//! plan status to operators while the offer loop releases everything the
//! service ever reserved.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use berth_scheduler::api::{self, ApiState};
use berth_scheduler::config::Config;
use berth_scheduler::driver::MockDriver;
use berth_scheduler::spec::ServiceSpec;
use berth_scheduler::state::StateStore;
use berth_scheduler::uninstall::UninstallScheduler;
use berth_store::{CachedPersister, MemPersister, Persister, SqlitePersister};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::from_env()?;
    info!(service = %config.service_name, "Starting berth uninstall scheduler");

    if !config.uninstall_enabled {
        anyhow::bail!("BERTH_UNINSTALL is not set; refusing to run the teardown scheduler");
    }

    let persister: Arc<dyn Persister> = match &config.state_db {
        Some(path) => {
            info!(path = %path.display(), "Opening persistent state store");
            Arc::new(CachedPersister::new(SqlitePersister::open(path)?)?)
        }
        None => {
            info!("No BERTH_STATE_DB configured; state is in-memory only");
            Arc::new(MemPersister::new())
        }
    };
    let state_store = Arc::new(StateStore::new(persister, &config.service_name));

    // The spec loader is the embedder's concern; the name is all the
    // teardown path needs when no spec file is wired in.
    let service_spec = ServiceSpec::named(&config.service_name);

    if !config.dev_mode {
        anyhow::bail!(
            "no master transport configured; set BERTH_DEV=1 to run with the loopback driver"
        );
    }
    let driver = Arc::new(MockDriver::new());
    let scheduler = UninstallScheduler::new(&service_spec, state_store, driver, None)?;

    if !scheduler.wants_registration()? {
        info!("All but the state store is uninstalled; skipping master registration");
        return Ok(());
    }

    let app = api::create_router(ApiState {
        plans: scheduler.plan_manager(),
    });
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Serving plan status");
    axum::serve(listener, app).await?;

    Ok(())
}
