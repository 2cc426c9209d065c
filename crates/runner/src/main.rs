use conduit_core::TenantId;
use conduit_gateway::{ConnectivityCore, load_config, load_default_config};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

fn print_help() {
    eprintln!(
        r#"Conduit - exchange connectivity runner

USAGE:
    conduit [OPTIONS]

OPTIONS:
    --config <PATH>     Load configuration from JSON file
    --tenant <ID>       Tenant to trade for (overrides the config)
    --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG            Log level filter (default: info)

EXAMPLES:
    # Run against the local FIX simulator
    conduit

    # Run with a config file
    conduit --config connectivity.json
"#
    );
}

#[derive(Debug, Default, PartialEq)]
struct Args {
    config_path: Option<String>,
    tenant: Option<String>,
    help: bool,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => parsed.help = true,
            "--config" | "-c" => {
                let path = iter.next().ok_or("--config requires a path argument")?;
                parsed.config_path = Some(path.clone());
            }
            "--tenant" | "-t" => {
                let tenant = iter.next().ok_or("--tenant requires an id")?;
                parsed.tenant = Some(tenant.clone());
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };
    if args.help {
        print_help();
        return Ok(());
    }

    let config = match &args.config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            load_config(path)?
        }
        None => {
            info!("No --config given, using the embedded simulator configuration");
            load_default_config()?
        }
    };
    config.validate()?;

    let tenant = TenantId::new(args.tenant.unwrap_or_else(|| config.global.tenant.clone()));
    let core = Arc::new(ConnectivityCore::from_config(&config)?);
    info!(
        "Starting connectivity for tenant {} on {} exchange(s)",
        tenant,
        core.exchanges().len()
    );

    for (exchange, err) in core.logon_all().await {
        warn!("{} is not logged on: {}", exchange, err);
    }

    let maintenance = core.spawn_maintenance(
        tenant.clone(),
        Duration::from_millis(config.global.maintenance_interval_ms.max(10)),
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutdown requested");

    maintenance.abort();
    let report = core
        .shutdown(
            &tenant,
            Duration::from_millis(config.global.shutdown_timeout_ms),
        )
        .await;
    info!(
        "Closed {} connection(s); {} request(s) completed, {} cancelled in {}ms",
        report.connections_closed,
        report.requests_completed,
        report.requests_cancelled,
        report.elapsed_ms
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("conduit")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(parse_args(&args(&[])).unwrap(), Args::default());

        let parsed = parse_args(&args(&["--config", "c.json", "-t", "desk-1"])).unwrap();
        assert_eq!(parsed.config_path.as_deref(), Some("c.json"));
        assert_eq!(parsed.tenant.as_deref(), Some("desk-1"));
        assert!(!parsed.help);

        assert!(parse_args(&args(&["-h"])).unwrap().help);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&args(&["--config"])).is_err());
        assert_eq!(
            parse_args(&args(&["--verbose"])).unwrap_err(),
            "Unknown argument: --verbose"
        );
    }
}
