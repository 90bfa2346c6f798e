// src/main.rs - Overlay host: poll one printer and serve its view
use clap::Parser;
use krusty_overlay::client::{HttpTransport, MoonrakerApi};
use krusty_overlay::config::{self, CliOverrides, Config};
use krusty_overlay::poll::{PollOptions, StatusPoller};
use krusty_overlay::runner::{CameraMonitor, Runner};
use krusty_overlay::view::{LogSink, MultiSink, OverlayView, StatusSink, WatchSink};
use krusty_overlay::web;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Parser)]
#[command(name = "overlay-host", version, about = "Klipper print status overlay")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "overlay.toml")]
    config: String,
    /// Printer address, overrides the config file
    #[arg(long)]
    ip: Option<String>,
    /// Display name for the printer
    #[arg(long)]
    name: Option<String>,
    /// Poll interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Address for the overlay HTTP API
    #[arg(long)]
    bind: Option<String>,
    /// Do not start the HTTP API
    #[arg(long)]
    no_web: bool,
    /// Poll once, print the view as JSON and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            ip: self.ip.clone(),
            name: self.name.clone(),
            interval_ms: self.interval_ms,
            bind: self.bind.clone(),
            no_web: self.no_web,
        }
    }
}

fn build_poller(config: &Config) -> Result<StatusPoller<HttpTransport>, BoxError> {
    let transport = HttpTransport::new(
        &config.base_url(),
        config.poll.request_timeout(),
        config.printer.api_key.clone(),
    )?;
    let api = MoonrakerApi::new(transport, config.poll.catalog_timeout());
    let options = PollOptions {
        chamber: config.display.show_chamber,
        thumbnail: config.display.show_thumbnail,
        thumbnail_bytes: config.poll.thumbnail_bytes,
        header_bytes: config.poll.header_bytes,
    };
    Ok(StatusPoller::new(api, config.printer.ip.clone(), options))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = config::resolve_config(&args.config, &args.overrides()).map_err(|e| {
        tracing::error!("Configuration error: {}", e);
        Box::new(e) as BoxError
    })?;

    tracing::info!("Starting overlay host v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Printer: {} at {}", config.display_name(), config.base_url());

    let poller = build_poller(&config)?;
    let initial = OverlayView::new(config.display_name());

    if args.once {
        let mut runner = Runner::new(poller, Box::new(LogSink), initial, config.poll.interval());
        runner.tick().await;
        println!("{}", serde_json::to_string_pretty(runner.view())?);
        return Ok(());
    }

    let (watch_sink, view_rx) = WatchSink::new(initial.clone());
    let sinks: Vec<Box<dyn StatusSink>> = vec![Box::new(LogSink), Box::new(watch_sink)];
    let mut runner = Runner::new(poller, Box::new(MultiSink(sinks)), initial, config.poll.interval());
    if config.display.show_camera {
        if let Some(url) = &config.camera.url {
            tracing::info!("Camera feed: {}", url);
            runner = runner.with_camera(CameraMonitor::new(url.clone(), &config.camera));
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let web_task = if config.web.enabled {
        let bind = config.web.bind.clone();
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = web::serve(&bind, view_rx, shutdown).await {
                tracing::error!("Overlay API failed on {}: {}", bind, e);
            }
        }))
    } else {
        None
    };

    let poll_task = tokio::spawn(async move {
        runner.run_until(shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);

    poll_task.await?;
    if let Some(task) = web_task {
        task.await?;
    }
    Ok(())
}
