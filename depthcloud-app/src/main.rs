//! Depthcloud Application
//!
//! Runs a depth camera into the point cloud pipeline and drives the render
//! loop that keeps the point mesh up to date.

mod app;
mod cli;
mod config;
mod error;

use clap::Parser;
use tracing::info;

use crate::cli::Args;

fn init_tracing() {
    #[cfg(feature = "tracy")]
    {
        use tracing_subscriber::Layer;
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;
        tracing_subscriber::registry()
            .with(tracing_tracy::TracyLayer::default())
            .with(
                tracing_subscriber::fmt::layer().with_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "info".into()),
                ),
            )
            .init();
    }

    #[cfg(not(feature = "tracy"))]
    {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_target(false)
            .init();
    }
}

fn main() {
    init_tracing();
    let args = Args::parse();

    let result = args.load_config().and_then(|config| {
        info!(
            "Starting depthcloud: {}x{} depth, {:?} backend",
            config.camera.width, config.camera.height, config.render.backend
        );
        app::run(&config)
    });

    if let Err(e) = result {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}
