//! pinlab demo binary
//!
//! Runs the request catalog against public test hosts:
//! - unpinned HTTP and HTTPS requests
//! - per-request SPKI pins (key, root and a deliberately broken pin)
//! - whole-certificate pinning against a bundled root
//! - registry-backed pinning through the shared pin registry
//!
//! `PINLAB_SHOW_PINS=<host>` prints the pins of a host's chain instead.

use std::env;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pinlab_core::{pin_registry, ExecutorConfig, PinnedRequestExecutor};
use pinlab_demo::catalog::{builtin_registry, catalog, select};
use pinlab_demo::inspect::show_pins;
use pinlab_demo::report::{render_json, render_text};
use pinlab_demo::{run_catalog, DemoConfig, InstalledRegistry, OutputFormat};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!("Starting pinlab demo v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config();
    let executor = Arc::new(PinnedRequestExecutor::new(ExecutorConfig {
        timeout: config.timeout,
        ..ExecutorConfig::default()
    })?);

    if let Some(host) = config.show_pins.as_deref() {
        match show_pins(&executor, host).await {
            Ok(pins) => match config.output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pins)?),
                OutputFormat::Text => {
                    for p in pins {
                        println!("{:>2}  {:<12}  {}", p.position, p.kind, p.pin);
                    }
                }
            },
            Err(e) => error!("Could not read the chain of {}: {}", host, e),
        }
        return Ok(());
    }

    let registry = match &config.registry_path {
        Some(path) => pin_registry::load_from_path(path)?,
        None => builtin_registry()?,
    };
    // Torn down when dropped, on early returns too.
    let installed = InstalledRegistry::install(registry)?;

    let entries = select(catalog(installed.delegate())?, config.only.as_deref());
    info!("Running {} requests", entries.len());
    let outcomes = run_catalog(executor, entries).await;

    match config.output {
        OutputFormat::Text => print!("{}", render_text(&outcomes)),
        OutputFormat::Json => println!("{}", render_json(&outcomes)?),
    }
    Ok(())
}

/// Initialize structured logging with configurable levels
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pinlab_demo=info,pinlab_core=info".into());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    let result = if env::var("PINLAB_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.pretty())
            .try_init()
    };

    if result.is_ok() {
        info!("Logging initialized");
    }
}

/// Load configuration from environment variables
fn load_config() -> DemoConfig {
    let config = DemoConfig::from_env();

    info!("Demo configuration:");
    info!("  Timeout: {}s", config.timeout.as_secs());
    match &config.registry_path {
        Some(path) => info!("  Registry: {}", path.display()),
        None => info!("  Registry: built-in"),
    }
    if let Some(only) = &config.only {
        info!("  Only: {}", only.join(", "));
    }
    info!("  Output: {:?}", config.output);

    config
}
