mod config;

use clap::{Args, Parser, Subcommand};
use config::{CommonConfig, Config, ConfigError};
use gateway::{Gateway, GatewayError};
use metrics_exporter_statsd::StatsdBuilder;
use std::io;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "multitenant", about = "Multi-tenant request gateway")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve tenant and admin traffic
    Serve(ConfigArgs),
    /// Load the config and the tenant registry, print the tenants and exit
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, short)]
    config: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] io::Error),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        CliCommand::Serve(args) => serve(args),
        CliCommand::CheckConfig(args) => check_config(args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn serve(args: ConfigArgs) -> Result<(), CliError> {
    let config = Config::from_file(&args.config)?;
    let _sentry = init_logging(&config.common);
    init_metrics(&config.common);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    tracing::info!(environment = config.environment.name.as_str(), "starting multitenant");
    rt.block_on(gateway::run(config.gateway, config.environment))?;
    Ok(())
}

fn check_config(args: ConfigArgs) -> Result<(), CliError> {
    let config = Config::from_file(&args.config)?;
    let gateway = Gateway::from_config(config.gateway, config.environment)?;

    for tenant in gateway.registry().all() {
        println!("{}\t{}\t{}", tenant.id, tenant.name, tenant.hosts.join(","));
    }
    println!("config ok: {} tenants", gateway.registry().snapshot().len());
    Ok(())
}

/// Installs the tracing subscriber. The returned guard flushes Sentry on drop
/// and has to outlive the runtime.
fn init_logging(common: &CommonConfig) -> Option<sentry::ClientInitGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let guard = common.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(sentry_layer)
        .init();

    guard
}

fn init_metrics(common: &CommonConfig) {
    let Some(metrics_config) = &common.metrics else {
        return;
    };

    let recorder = match StatsdBuilder::from(
        metrics_config.statsd_host.as_str(),
        metrics_config.statsd_port,
    )
    .build(Some("multitenant"))
    {
        Ok(recorder) => recorder,
        Err(e) => {
            tracing::error!(error = %e, "could not build statsd recorder");
            return;
        }
    };

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("a metrics recorder was already installed");
        return;
    }
    gateway::metrics_defs::describe_all();
}
