use std::error::Error;

use tracing::{error, info};

use cstbox_modbus::{
    cli::parse_daemon_args,
    config::{load_config, resolve_config_path},
    logs::init_logging,
    service,
};

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_daemon_args();
    init_logging(args.log_level, false);

    let config_path = resolve_config_path(args.config.as_deref());
    let config = load_config(args.config.as_deref()).inspect_err(|err| {
        error!("Cannot load configuration {}: {err}", config_path.display());
    })?;
    info!("Loaded configuration from {}", config_path.display());

    let shutdown = service::install_shutdown_handler()?;
    service::run_until(&config, &shutdown).inspect_err(|err| {
        error!("Service failed: {err}");
    })?;

    Ok(())
}
