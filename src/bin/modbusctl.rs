use std::{error::Error, io::IsTerminal, process};

use tracing::{debug, info, warn};

use cstbox_modbus::{
    cli::{Cli, Commands, parse_args},
    config::load_config,
    daemon::{Daemon, StartOutcome, StopOutcome},
    logs::init_logging,
    runtime::{self, RuntimeMode},
    status::StatusReport,
};

fn main() {
    let args = parse_args();
    runtime::init(RuntimeMode::detect());

    match run(args) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("modbusctl: {err}");
            process::exit(1);
        }
    }
}

fn run(args: Cli) -> Result<i32, Box<dyn Error>> {
    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            init_logging(args.log_level, args.verbose);
            return Err(err.into());
        }
    };
    init_logging(args.log_level, args.verbose || config.control.verbose);
    debug!(
        "Runtime mode {:?}, state dir {}",
        runtime::mode(),
        runtime::state_dir().display()
    );

    let daemon = Daemon::from_config(&config);

    match args.command {
        Commands::Start => {
            report_start(&daemon, daemon.start()?);
            Ok(0)
        }
        Commands::Stop => {
            match daemon.stop()? {
                StopOutcome::Stopped { pid } => {
                    println!("Stopped {} (pid {pid})", daemon.service_name())
                }
                StopOutcome::NotRunning => {
                    println!("{} is not running", daemon.service_name())
                }
            }
            Ok(0)
        }
        Commands::Restart => {
            info!("Restarting {}", daemon.service_name());
            report_start(&daemon, daemon.restart()?);
            Ok(0)
        }
        Commands::Status { json } => {
            let report = StatusReport::collect(&daemon)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.render(std::io::stdout().is_terminal()));
            }
            Ok(report.exit_code())
        }
    }
}

fn report_start(daemon: &Daemon, outcome: StartOutcome) {
    let service = daemon.service_name();
    match outcome {
        StartOutcome::Started { pid } => println!("Started {service} (pid {pid})"),
        StartOutcome::AlreadyRunning { pid } => {
            println!("{service} is already running (pid {pid})")
        }
        StartOutcome::FailureTolerated { reason } => {
            warn!("Start failure of {service} tolerated: {reason}");
            println!("{service} failed to start (tolerated): {reason}");
        }
    }
}
