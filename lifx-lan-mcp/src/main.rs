use std::cmp::max;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};

use lifx_lan_lib::directory::clock::SystemClock;
use lifx_lan_lib::directory::{DeviceDirectory, DirectoryConfig, DEFAULT_TTL};
use lifx_lan_lib::dispatch::CommandDispatcher;
use lifx_lan_lib::light::state::Light;
use lifx_lan_lib::probe::simulated::SimulatedProbe;
use lifx_lan_lib::probe::NetworkProbe;

mod server;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout belongs to the protocol.
    env_logger::init();

    let cli = Cli::parse();

    handle_cli(cli).await
}

/// This struct defines the command line interface of the application
#[derive(Parser)]
#[clap(
    name = "lifx_lan_mcp",
    about = "Exposes LAN smart light control as MCP tools",
    version
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

/// Supported output formats for the `discover` command.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    /// Plain text format.
    Plaintext,
    /// JSON format.
    Json,
    /// YAML format.
    Yaml,
}

/// Transport the MCP server is reachable on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// One session on stdin/stdout.
    Stdio,
    /// Streamable HTTP on `--port`.
    Sse,
}

/// Port used by `--mode sse` when none is given.
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Where `serve` listens, after checking `--mode` against `--port`.
#[derive(Debug, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http { port: u16 },
}

impl Transport {
    pub fn from_args(mode: Mode, port: Option<u16>) -> Result<Self> {
        match (mode, port) {
            (Mode::Stdio, Some(_)) => {
                bail!("mode 'stdio' is incompatible with --port, 'sse' mode expected")
            }
            (Mode::Stdio, None) => Ok(Transport::Stdio),
            (Mode::Sse, port) => Ok(Transport::Http {
                port: port.unwrap_or(DEFAULT_HTTP_PORT),
            }),
        }
    }
}

/// Subcommands available for the CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Runs the MCP server
    #[clap(name = "serve")]
    Serve {
        /// Fleet file (YAML or JSON) describing the lights to simulate
        #[clap(long)]
        devices: PathBuf,

        /// Seconds a discovered address is trusted before probing again
        #[clap(long = "cache-ttl-secs", default_value_t = DEFAULT_TTL.as_secs())]
        cache_ttl_secs: u64,

        /// Artificial delay for every network call, in milliseconds
        #[clap(long = "latency-ms", default_value_t = 0)]
        latency_ms: u64,

        /// Give up on a light that has not answered after this many milliseconds
        #[clap(long = "timeout-ms")]
        timeout_ms: Option<u64>,

        /// Transport (stdio, sse)
        #[clap(long, value_enum, default_value_t = Mode::Stdio)]
        mode: Mode,

        /// HTTP port, only valid with `--mode sse`
        #[clap(long)]
        port: Option<u16>,
    },
    /// Probes the network once and lists the lights found
    #[clap(name = "discover")]
    Discover {
        /// Fleet file (YAML or JSON) describing the lights to simulate
        #[clap(long)]
        devices: PathBuf,

        /// Output format (plaintext, json, yaml)
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Plaintext)]
        output: OutputFormat,
    },
}

fn build_dispatcher(probe: Arc<dyn NetworkProbe>, ttl: Duration) -> CommandDispatcher {
    let directory = DeviceDirectory::new(probe, Arc::new(SystemClock), DirectoryConfig { ttl });
    CommandDispatcher::new(Arc::new(directory))
}

async fn handle_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve {
            devices,
            cache_ttl_secs,
            latency_ms,
            timeout_ms,
            mode,
            port,
        } => {
            let transport = Transport::from_args(mode, port)?;
            let mut probe = SimulatedProbe::from_path(&devices)?
                .with_latency(Duration::from_millis(latency_ms));
            if let Some(timeout_ms) = timeout_ms {
                probe = probe.with_timeout(Duration::from_millis(timeout_ms));
            }
            let dispatcher = Arc::new(build_dispatcher(
                Arc::new(probe),
                Duration::from_secs(cache_ttl_secs),
            ));
            match transport {
                Transport::Stdio => server::serve_stdio(dispatcher).await?,
                Transport::Http { port } => server::serve_http(dispatcher, port).await?,
            }
        }
        Commands::Discover { devices, output } => {
            let probe = Arc::new(SimulatedProbe::from_path(&devices)?);
            let dispatcher = build_dispatcher(probe, DEFAULT_TTL);
            let lights = dispatcher.list_lights().await?;
            match output {
                OutputFormat::Plaintext => {
                    pretty_print_lights(&lights);
                }
                OutputFormat::Json => {
                    let json = serde_json::to_string(&lights)?;
                    println!("{}", json);
                }
                OutputFormat::Yaml => {
                    let yaml = serde_yaml::to_string(&lights)?;
                    println!("{}", yaml);
                }
            }
        }
    }

    Ok(())
}

fn pretty_print_lights(lights: &[Light]) {
    let label_width = max(
        lights.iter().map(|l| l.label.len()).max().unwrap_or(0),
        "Label".len(),
    );
    let group_width = max(
        lights.iter().map(|l| l.group.label.len()).max().unwrap_or(0),
        "Group".len(),
    );
    let location_width = max(
        lights.iter().map(|l| l.location.label.len()).max().unwrap_or(0),
        "Location".len(),
    );

    println!(
        "{:<label_width$} {:<group_width$} {:<location_width$}",
        "Label",
        "Group",
        "Location",
        label_width = label_width + 2,
        group_width = group_width + 2,
        location_width = location_width + 2,
    );
    println!(
        "{:<label_width$} {:<group_width$} {:<location_width$}",
        "-".repeat(label_width),
        "-".repeat(group_width),
        "-".repeat(location_width),
        label_width = label_width + 2,
        group_width = group_width + 2,
        location_width = location_width + 2,
    );
    for light in lights {
        println!(
            "{:<label_width$} {:<group_width$} {:<location_width$}",
            light.label,
            light.group.label,
            light.location.label,
            label_width = label_width + 2,
            group_width = group_width + 2,
            location_width = location_width + 2,
        );
    }
}
