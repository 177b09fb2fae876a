//! transit: live tram/bus position tracker with a server-sent event stream.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use comfy_table::{Cell, Table};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use transit_core::config::{self, Config};
use transit_core::lines::parse_groups;
use transit_core::{reconcile, Comparison, LineCatalog, LineGroup};

mod broadcast;
mod source;
mod tracker;
mod web;

use broadcast::Broadcaster;
use source::{Credentials, PositionSource, VasttrafikClient};
use tracker::Tracker;

#[derive(Parser)]
#[command(name = "transit", version, about = "Live public transport vehicle tracker")]
struct Cli {
    /// Config file (defaults to ~/.transit/config.yaml)
    #[arg(long, global = true, env = "TRANSIT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll positions and stream changes to subscribers
    Serve(ServeArgs),

    /// Fetch one snapshot and print it as a table
    Snapshot {
        #[command(flatten)]
        lines: LineArgs,

        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Print the line designations that would be tracked
    Lines {
        #[command(flatten)]
        lines: LineArgs,
    },

    /// Write the default config file
    Init,
}

#[derive(Args)]
struct ServeArgs {
    /// Host to listen on
    #[arg(long, env = "TRANSIT_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "TRANSIT_PORT")]
    port: Option<u16>,

    /// Poll interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Queued events per subscriber before it is disconnected
    #[arg(long)]
    buffer: Option<usize>,

    /// Re-send every vehicle on every poll, even if only last-seen changed
    #[arg(long)]
    strict_diff: bool,

    /// Directory of static assets served at /
    #[arg(long, env = "TRANSIT_STATIC_DIR")]
    static_dir: Option<String>,

    #[command(flatten)]
    lines: LineArgs,

    #[command(flatten)]
    credentials: CredentialArgs,
}

#[derive(Args)]
struct LineArgs {
    /// Comma-separated line groups: tram, bus, express
    #[arg(long)]
    lines: Option<String>,

    /// JSON file with line metadata and routes
    #[arg(long)]
    routes_file: Option<String>,
}

#[derive(Args)]
struct CredentialArgs {
    #[arg(long, env = "VASTTRAFIK_CLIENT_ID", hide_env_values = true)]
    client_id: Option<String>,

    #[arg(long, env = "VASTTRAFIK_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };

    match cli.command {
        Commands::Serve(args) => {
            apply_serve_args(&mut config, &args);
            let credentials = require_credentials(&args.credentials);
            run_async(cmd_serve(config, credentials));
        }
        Commands::Snapshot { lines, credentials } => {
            apply_line_args(&mut config, &lines);
            let credentials = require_credentials(&credentials);
            run_async(cmd_snapshot(config, credentials));
        }
        Commands::Lines { lines } => {
            apply_line_args(&mut config, &lines);
            cmd_lines(&config);
        }
        Commands::Init => cmd_init(),
    }
}

fn run_async<F: std::future::Future<Output = ()>>(fut: F) {
    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to start runtime");
        std::process::exit(1);
    });
    runtime.block_on(fut);
}

// ---------------------------------------------------------------------------
// Config layering
// ---------------------------------------------------------------------------

fn apply_serve_args(config: &mut Config, args: &ServeArgs) {
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ms) = args.interval_ms.filter(|ms| *ms > 0) {
        config.tracker.interval_ms = ms;
    }
    if let Some(buffer) = args.buffer.filter(|b| *b > 0) {
        config.tracker.subscriber_buffer = buffer;
    }
    if args.strict_diff {
        config.tracker.strict_diff = true;
    }
    if let Some(dir) = &args.static_dir {
        config.static_dir = Some(dir.clone());
    }
    apply_line_args(config, &args.lines);
}

fn apply_line_args(config: &mut Config, args: &LineArgs) {
    if let Some(list) = &args.lines {
        match parse_groups(list) {
            Ok(groups) => config.lines.groups = groups,
            Err(e) => fail(&e),
        }
    }
    if let Some(path) = &args.routes_file {
        config.lines.routes_file = Some(path.clone());
    }
}

fn require_credentials(args: &CredentialArgs) -> Credentials {
    fn non_empty(v: &Option<String>) -> Option<String> {
        v.as_ref().filter(|s| !s.is_empty()).cloned()
    }

    Credentials {
        client_id: non_empty(&args.client_id)
            .unwrap_or_else(|| fail(&"VASTTRAFIK_CLIENT_ID is not set")),
        client_secret: non_empty(&args.client_secret)
            .unwrap_or_else(|| fail(&"VASTTRAFIK_CLIENT_SECRET is not set")),
    }
}

fn load_catalog(config: &Config) -> LineCatalog {
    let groups = config.lines.groups.clone();
    match &config.lines.routes_file {
        Some(path) => LineCatalog::load(groups, path).unwrap_or_else(|e| fail(&e)),
        None => LineCatalog::new(groups, Vec::new()),
    }
}

fn fail(e: &dyn std::fmt::Display) -> ! {
    tracing::error!("{e}");
    std::process::exit(1);
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_serve(config: Config, credentials: Credentials) {
    let catalog = Arc::new(load_catalog(&config));
    let hub = Broadcaster::new(config.tracker.subscriber_buffer);
    let comparison = if config.tracker.strict_diff {
        Comparison::Strict
    } else {
        Comparison::Content
    };

    let client = VasttrafikClient::new(credentials).unwrap_or_else(|e| fail(&e));
    let mut tracker = Tracker::new(
        client,
        hub.clone(),
        config.area.bounding_box(),
        catalog.designations(),
    )
    .with_interval(Duration::from_millis(config.tracker.interval_ms))
    .with_comparison(comparison);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    {
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                // Keep the sender alive; dropping it would stop everything
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(true);
            hub.close();
        });
    }

    // Nothing is served until the first snapshot is in
    match tracker.seed_until(&mut shutdown_rx).await {
        Ok(Some(seeded)) => tracing::info!(vehicles = seeded, "seeded tracked set"),
        Ok(None) => return,
        Err(e) => fail(&format!("failed to list vehicles: {e}")),
    }

    let mut tracker_task = tokio::spawn(tracker.run(shutdown_rx.clone()));

    let state = Arc::new(web::AppState { hub, catalog });
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let static_dir = config.static_dir.map(PathBuf::from);
    let mut server_shutdown = shutdown_rx;
    let mut server_task = tokio::spawn(web::serve(state, static_dir, addr, async move {
        tracker::cancelled(&mut server_shutdown).await;
    }));

    // A failed bind is fatal; otherwise both stop on shutdown
    tokio::select! {
        result = &mut tracker_task => {
            if let Err(e) = result {
                fail(&e);
            }
            let _ = server_task.await;
        }
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => fail(&format!("server error: {e}")),
                Err(e) => fail(&e),
            }
            let _ = tracker_task.await;
        }
    }
}

async fn cmd_snapshot(config: Config, credentials: Credentials) {
    let catalog = load_catalog(&config);
    let client = VasttrafikClient::new(credentials).unwrap_or_else(|e| fail(&e));
    let raw = client
        .list_vehicles(&config.area.bounding_box(), &catalog.designations())
        .await
        .unwrap_or_else(|e| fail(&format!("failed to list vehicles: {e}")));

    let mut vehicles = reconcile(&[], raw, Utc::now());
    vehicles.sort_by(|a, b| {
        a.vehicle
            .line
            .name
            .cmp(&b.vehicle.line.name)
            .then_with(|| a.vehicle.direction.cmp(&b.vehicle.direction))
    });

    let mut table = Table::new();
    table.set_header(vec!["ID", "Line", "Mode", "Direction", "Lat", "Lon"]);
    for v in &vehicles {
        table.add_row(vec![
            Cell::new(v.id.as_str().get(..8).unwrap_or(v.id.as_str())),
            Cell::new(&v.vehicle.line.name),
            Cell::new(&v.vehicle.line.transport_mode),
            Cell::new(&v.vehicle.direction),
            Cell::new(format!("{:.5}", v.vehicle.latitude)),
            Cell::new(format!("{:.5}", v.vehicle.longitude)),
        ]);
    }

    println!();
    println!("{} vehicles at {}", vehicles.len(), Utc::now().to_rfc3339());
    println!();
    if !vehicles.is_empty() {
        println!("{table}");
    }
}

fn cmd_lines(config: &Config) {
    let catalog = load_catalog(config);
    let groups: Vec<String> = catalog.groups().iter().map(LineGroup::to_string).collect();

    println!();
    println!("Groups:       {}", groups.join(", "));
    println!("Designations: {}", catalog.designations().join(" "));

    if !catalog.lines().is_empty() {
        println!();
        let mut table = Table::new();
        table.set_header(vec!["Line", "Mode", "Colors", "Route points"]);
        for line in catalog.lines() {
            table.add_row(vec![
                Cell::new(&line.info.name),
                Cell::new(&line.info.transport_mode),
                Cell::new(format!(
                    "{} / {}",
                    line.info.background_color, line.info.foreground_color
                )),
                Cell::new(line.route.len()),
            ]);
        }
        println!("{table}");
    }
    println!();
}

fn cmd_init() {
    match config::save_config(&Config::default()) {
        Ok(path) => println!("Wrote {}", path.display()),
        Err(e) => fail(&e),
    }
}
