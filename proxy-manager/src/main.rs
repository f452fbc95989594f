use std::process::ExitCode;

use proxy_manager::{
    app, ControllerConfig, ControllerError, Providers, RunOutcome, TokioProviders,
    ToxiproxyClient,
};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let runtime = match app::runtime() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to create runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(outcome) => {
            tracing::info!(?outcome, "proxy manager exited");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "proxy manager failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<RunOutcome, ControllerError> {
    let config = ControllerConfig::default();
    config.validate()?;

    let providers = TokioProviders::new();
    let store = app::open_store(providers.time(), &config).await?;
    let daemon = ToxiproxyClient::new(&config.daemon_addr);
    tracing::info!(daemon = %daemon.authority(), "starting proxy manager");

    app::serve(store, daemon, providers, config).await
}
