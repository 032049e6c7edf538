use anyhow::{bail, Context};
use fieldmesh_core::{logging, Config, LogFormat};
use fieldmesh_mesh::FRAME_SIZE;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

mod field;

use field::Field;

const NODE_PROTOCOL_VERSION: u32 = 1;
const TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    protocol_version: u32,
    frame_size: usize,
}

#[derive(Debug, Default)]
struct Options {
    config_path: Option<PathBuf>,
    duration: Option<Duration>,
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: NODE_PROTOCOL_VERSION,
            frame_size: FRAME_SIZE,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let options = parse_options(&args)?;
    let mut config = match &options.config_path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default_config(),
    };
    if options.json_logs {
        config.logging.format = LogFormat::Json;
    }
    logging::init(&config.logging)?;

    let mut field = Field::build(&config)?;
    tracing::info!(
        node_id = %config.node.node_id,
        node_type = %config.node.node_type,
        channel = config.mesh.channel,
        "Field simulation started"
    );

    let started = Instant::now();
    let deadline = options.duration.map(|d| started + d);
    let mut ticker = tokio::time::interval(TICK);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => field.tick(started.elapsed()),
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested");
                break;
            }
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
    }

    println!("{}", serde_json::to_string_pretty(&field.statuses())?);
    Ok(())
}

fn parse_options(args: &[String]) -> anyhow::Result<Options> {
    let mut options = Options::default();
    let mut args_iter = args.iter().skip(1);
    while let Some(arg) = args_iter.next() {
        match arg.as_str() {
            "--config" => match args_iter.next() {
                Some(path) => options.config_path = Some(PathBuf::from(path)),
                None => bail!("--config was provided without a path"),
            },
            "--duration-secs" => {
                let value = args_iter
                    .next()
                    .context("--duration-secs was provided without a value")?;
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("invalid --duration-secs {value:?}"))?;
                options.duration = Some(Duration::from_secs(secs));
            }
            "--json-logs" => options.json_logs = true,
            other => bail!("unknown argument {other:?}"),
        }
    }
    Ok(options)
}
