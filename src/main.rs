use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::info;

use perod::config::{ServerConfig, DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT, DEFAULT_SERVER_NAME};
use perod::surface::{http, transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Newline-delimited JSON-RPC on stdin/stdout (default).
    Stdio,
    /// JSON-RPC over HTTP POST /mcp.
    Http,
}

#[derive(Parser)]
#[command(
    name = "perod",
    about = "Pero Relay — MCP relay daemon over partner integrations",
    version
)]
struct Args {
    /// Server name reported in the MCP initialize handshake
    /// (falls back to the `[server]` config section)
    #[arg(long, short = 'n', env = "PEROD_NAME")]
    name: Option<String>,

    /// Transport to serve on
    #[arg(long, short = 't', env = "PEROD_TRANSPORT", value_enum, default_value = "stdio")]
    transport: Transport,

    /// Bind host (HTTP transport only)
    #[arg(long, env = "PEROD_HOST")]
    host: Option<String>,

    /// Bind port (HTTP transport only)
    #[arg(long, short = 'p', env = "PEROD_PORT")]
    port: Option<u16>,

    /// Path to perod.toml
    #[arg(long, env = "PEROD_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PEROD_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "PEROD_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Only log warnings and errors (ignored when --log is given)
    #[arg(long, short = 'q')]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Init once — must happen before any tracing calls. Logs always go to
    // stderr: on the stdio transport, stdout is the wire.
    let log_level = match (&args.log, args.quiet) {
        (Some(level), _) => level.clone(),
        (None, true) => "warn".to_string(),
        (None, false) => "info".to_string(),
    };
    let log_format = std::env::var("PEROD_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    let config = Arc::new(ServerConfig::load(args.config.as_deref())?);

    // CLI → [server] section → built-in default.
    let name = args
        .name
        .or_else(|| config.server.name.clone())
        .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string());
    let host = args
        .host
        .or_else(|| config.server.host.clone())
        .unwrap_or_else(|| DEFAULT_HTTP_HOST.to_string());
    let port = args.port.or(config.server.port).unwrap_or(DEFAULT_HTTP_PORT);

    let (surface, _orchestrator) = perod::build_surface(config)?;
    info!(
        server = %name,
        operations = surface.operation_count(),
        "surface ready"
    );

    match args.transport {
        Transport::Stdio => transport::serve_stdio(surface, &name).await,
        Transport::Http => http::serve_http(surface, &name, &host, port).await,
    }
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stderr and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default) or `"json"` (structured JSON for
/// log aggregators).
///
/// If the log directory cannot be created, falls back to stderr-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    let stderr_only = |use_json: bool| {
        if use_json {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(log_level)
                .with_writer(std::io::stderr)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(log_level)
                .with_writer(std::io::stderr)
                .compact()
                .init();
        }
    };

    let Some(path) = log_file else {
        stderr_only(use_json);
        return None;
    };

    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let filename = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("perod.log"));

    // Ensure the directory exists before tracing-appender tries to open it.
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!(
            "warn: could not create log directory '{}': {e} — falling back to stderr",
            dir.display()
        );
        stderr_only(use_json);
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    if use_json {
        tracing_subscriber::registry()
            .with(EnvFilter::new(log_level))
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(fmt::layer().json().with_writer(non_blocking))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(EnvFilter::new(log_level))
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .with(fmt::layer().with_writer(non_blocking))
            .init();
    }

    Some(guard)
}
