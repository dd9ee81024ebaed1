use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use svcrouter::config::validation::validate_config;
use svcrouter::config::{load_config, RouterConfig};
use svcrouter::lifecycle::signals;
use svcrouter::observability::logging;
use svcrouter::resolver::{CatalogResolver, Resolver};
use svcrouter::HttpServer;

#[derive(Parser)]
#[command(name = "svcrouter")]
#[command(about = "Name-routed HTTP reverse proxy", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Override the routing domain suffix.
    #[arg(long)]
    domain: Option<String>,

    /// Override the catalog address.
    #[arg(long)]
    catalog: Option<String>,

    /// Override the preferred endpoint tag.
    #[arg(long)]
    prefer: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };

    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(domain) = cli.domain {
        config.routing.domain = domain;
    }
    if let Some(catalog) = cli.catalog {
        config.catalog.address = catalog;
    }
    if let Some(prefer) = cli.prefer {
        config.routing.prefer_tag = prefer;
    }

    // Flag overrides bypass the loader, so check the merged result.
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("{error}");
        }
        return Err("invalid configuration".into());
    }

    logging::init(&config.observability.log_level);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        domain = %config.routing.domain,
        catalog = %config.catalog.address,
        prefer_tag = %config.routing.prefer_tag,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let base: Arc<dyn Resolver> = Arc::new(CatalogResolver::new(&config.catalog.address));
    let server = HttpServer::new(&config, base);

    server.run(listener, signals::shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
