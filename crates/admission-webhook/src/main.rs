use std::process;

use admission_webhook::{cli, config::Config, tracing::setup_tracing, WebhookServer};
use anyhow::Result;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    let config = Config::from_args(&matches)?;

    setup_tracing(&config.log_level, &config.log_fmt, config.log_no_color)?;

    // Each application must select its rustls crypto provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        info!("rustls crypto provider already installed");
    }

    info!(
        annotation_prefix = config.annotation_prefix.as_str(),
        compute_units = config.compute_units.as_ref().map_or(0, |c| c.len()),
        request_timeout = ?config.request_timeout,
        "starting {}",
        admission_webhook::config::SERVICE_NAME
    );

    let server = match WebhookServer::new_from_config(config) {
        Ok(server) => server,
        Err(e) => fatal_error(format!("cannot build webhook server: {e}")),
    };
    if let Err(e) = server.run().await {
        fatal_error(format!("{e:#}"));
    }

    Ok(())
}

fn fatal_error(msg: String) -> ! {
    error!("{}", msg);
    process::exit(1);
}
