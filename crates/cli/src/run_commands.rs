use std::sync::Arc;

use {
    anyhow::Result,
    tracing::{info, warn},
    zenor_config::{SidecarConfig, ZenorConfig},
    zenor_session::{Bootstrapper, CredentialStore},
    zenor_whatsapp::{
        AppContext, Pipeline, SidecarLaunch, SidecarProcess, SidecarTransport, Supervisor,
        SupervisorExit, find_sidecar_dir,
    },
};

use crate::handler::LoggingHandler;

/// Run the bot until it is logged out, interrupted, or hits a fatal error.
pub async fn run(config: ZenorConfig) -> Result<()> {
    let mut sidecar = start_sidecar(&config.sidecar).await?;

    let result = tokio::select! {
        result = supervise(config) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            Ok(())
        },
    };

    if let Some(process) = sidecar.as_mut()
        && let Err(e) = process.stop().await
    {
        warn!(error = %e, "failed to stop sidecar");
    }
    result
}

/// Spawn the sidecar unless it is managed elsewhere.
async fn start_sidecar(config: &SidecarConfig) -> Result<Option<SidecarProcess>> {
    if !config.auto_start || config.url.is_some() {
        return Ok(None);
    }
    let dir = match find_sidecar_dir(config.dir.as_deref()) {
        Ok(dir) => dir,
        Err(e) => {
            warn!(error = %e, "sidecar not found, expecting one to be running already");
            return Ok(None);
        },
    };
    let process = SidecarProcess::start(SidecarLaunch {
        dir,
        port: config.port,
    })
    .await?;
    Ok(Some(process))
}

async fn supervise(config: ZenorConfig) -> Result<()> {
    let store = CredentialStore::new(config.session.dir.clone());
    let bootstrapper = Bootstrapper::new(store, &config.session);
    let outcome = bootstrapper.bootstrap_from(&config.session).await;
    match outcome.origin() {
        Some(origin) => info!(%origin, "session restored"),
        None => info!("no session available, a pairing code will be shown"),
    }

    let prefix = config.bot.prefix.clone();
    let url = config.sidecar.ws_url();
    let ctx = AppContext::with_store(config, bootstrapper.store().clone());
    let pipeline = Pipeline::new(ctx.clone()).with_handler(Arc::new(LoggingHandler::new(prefix)));
    let supervisor = Supervisor::new(
        ctx,
        Arc::new(SidecarTransport::new(url)),
        Arc::new(pipeline),
    );

    match supervisor.run(outcome.into_handle()).await? {
        SupervisorExit::LoggedOut => {
            warn!("session logged out; remove the session source and pair the device again");
            Ok(())
        },
    }
}
