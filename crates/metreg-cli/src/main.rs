//! metreg - declare instruments and print their exposition.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metreg_cli::{run, Args};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metreg=info,metreg_cli=info,metreg_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = args.into_config();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        namespace = %config.registry.namespace,
        manifest = ?config.manifest,
        "configuration loaded"
    );

    let stdout = std::io::stdout();
    if let Err(e) = run(config, &mut stdout.lock()) {
        tracing::error!(error = %e, "metreg failed");
        return Err(e.into());
    }

    Ok(())
}
