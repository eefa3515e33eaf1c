use anyhow::{Context, anyhow};
use clap::Parser;
use heimdall_relay::config::Config;
use heimdall_relay::events::{EventSink, ProxyEvent};
use heimdall_relay::metrics::{RelayMetrics, spawn_reporter};
use heimdall_relay::{ProxyListener, logging};
use log::{debug, info, trace};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser)]
#[clap(
    version = "0.3.0",
    author = "Heimdall Relay",
    about = "A single-exchange forward HTTP relay proxy"
)]
struct Args {
    #[clap(
        short,
        long,
        value_name = "ADDR",
        help = "Listen address (e.g., 127.0.0.1:9088)"
    )]
    listen: Option<String>,

    #[clap(
        short,
        long,
        value_name = "PORT",
        help = "Listen port, keeping the configured address"
    )]
    port: Option<u16>,

    #[clap(short, long, value_name = "FILE", help = "Configuration file path")]
    config: Option<String>,

    #[clap(
        long,
        value_name = "FILE",
        help = "Generate a sample configuration file"
    )]
    generate_config: Option<String>,

    #[clap(long, value_name = "NUM", help = "Maximum simultaneous connections")]
    max_connections: Option<usize>,

    #[clap(long, value_name = "BYTES", help = "Response relay chunk size")]
    chunk_size: Option<usize>,

    #[clap(
        long,
        value_name = "SECONDS",
        help = "Upstream connect timeout (no timeout when omitted)"
    )]
    connect_timeout: Option<u64>,

    #[clap(
        long,
        value_name = "SECONDS",
        help = "Interval between transfer summary log lines (0 disables)"
    )]
    stats_interval: Option<u64>,

    #[clap(
        long,
        value_name = "NUM",
        help = "Runtime worker threads (default: CPU count)"
    )]
    worker_threads: Option<usize>,

    #[clap(
        long,
        value_name = "LEVEL",
        help = "Log level: trace, debug, info, warn, error"
    )]
    log_level: Option<String>,

    #[clap(long, value_name = "FORMAT", help = "Log format: text or json")]
    log_format: Option<String>,

    #[clap(long, help = "Do not observe relayed request lines and headers")]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(config_file) = &args.generate_config {
        generate_sample_config(config_file)?;
        println!("Sample configuration file generated: {}", config_file);
        return Ok(());
    }

    let mut config = if let Some(config_file) = &args.config {
        if !Path::new(config_file).exists() {
            return Err(anyhow!("Configuration file not found: {}", config_file));
        }
        Config::from_file(config_file)
            .map_err(|e| anyhow!("Failed to load {}: {}", config_file, e))?
    } else {
        create_config_from_args(&args)?
    };
    if let Some(port) = args.port {
        config.listen_addr.set_port(port);
    }

    let mut logging_config = config.logging.clone().unwrap_or_default();
    if let Some(level) = &args.log_level {
        logging_config.level = Some(logging::parse_log_level(level).map_err(|e| anyhow!("{}", e))?);
    }
    if let Some(format) = &args.log_format {
        logging_config.format =
            Some(logging::parse_log_format(format).map_err(|e| anyhow!("{}", e))?);
    }
    logging::init(&logging_config);

    config.validate()?;

    let worker_threads = config.worker_threads.unwrap_or_else(num_cpus::get);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    runtime.block_on(run(config, args.quiet))
}

async fn run(config: Config, quiet: bool) -> anyhow::Result<()> {
    let metrics = Arc::new(RelayMetrics::new());

    let events = if quiet {
        EventSink::disabled()
    } else {
        let (events, mut rx) = EventSink::channel(config.event_queue_size);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    ProxyEvent::RequestLine(line) => info!("> {}", line),
                    ProxyEvent::Header(line) => debug!("> {}", line),
                    ProxyEvent::ResponseChunk(chunk) => {
                        trace!("< {} response bytes", chunk.len());
                    }
                    ProxyEvent::BytesTransferred(total) => {
                        trace!("Bytes transferred: {}", total);
                    }
                }
            }
        });
        events
    };

    let _reporter = spawn_reporter(Arc::clone(&metrics), config.stats_interval_secs);

    info!("Starting relay...");
    let listener = ProxyListener::bind(&config, Arc::clone(&metrics), events).await?;

    tokio::select! {
        result = listener.run() => {
            result?;
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    let summary = metrics.summary();
    info!(
        "Relay stopped after {} connections and {} bytes. Goodbye!",
        summary.connections_total, summary.bytes_relayed
    );
    Ok(())
}

fn generate_sample_config(file_path: &str) -> anyhow::Result<()> {
    let sample = r#"{
  "listen_addr": "127.0.0.1:9088",
  "max_connections": 32,
  "chunk_size": 8192,
  "connect_timeout_secs": 10,
  "event_queue_size": 256,
  "stats_interval_secs": 60,
  "logging": {
    "level": "info",
    "format": "text"
  }
}"#;

    std::fs::write(file_path, sample)
        .with_context(|| format!("Failed to write {}", file_path))?;
    Ok(())
}

fn create_config_from_args(args: &Args) -> anyhow::Result<Config> {
    let mut config = Config::default();

    if let Some(listen) = &args.listen {
        config.listen_addr = listen
            .parse()
            .with_context(|| format!("Invalid listen address: {}", listen))?;
    }
    if let Some(n) = args.max_connections {
        config.max_connections = n;
    }
    if let Some(n) = args.chunk_size {
        config.chunk_size = n;
    }
    if args.connect_timeout.is_some() {
        config.connect_timeout_secs = args.connect_timeout;
    }
    if let Some(n) = args.stats_interval {
        config.stats_interval_secs = n;
    }
    if args.worker_threads.is_some() {
        config.worker_threads = args.worker_threads;
    }

    Ok(config)
}
