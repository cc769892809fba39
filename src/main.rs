//! loki-dispatch CLI
//!
//! Command-line interface for querying and tailing a Loki datasource.

use anyhow::{bail, Context};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use loki_dispatch::response::parse_labels;
use loki_dispatch::{
    generate_default_config, Config, ContextRow, Direction, HealthStatus, QueryDispatcher,
    QueryMode, QueryRequest, Target, TimeRange, TimeWindow, Variable, VariableTemplates,
};

#[derive(Parser)]
#[command(name = "loki-dispatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query and tail Loki, modern or legacy API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Loki base URL, overrides the config file
    #[arg(long, global = true)]
    pub url: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Dashboard,
    Logs,
    Metrics,
}

impl From<ModeArg> for QueryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Dashboard => QueryMode::Dashboard,
            ModeArg::Logs => QueryMode::Logs,
            ModeArg::Metrics => QueryMode::Metrics,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a query and print envelopes as JSON lines
    Query {
        /// Query expression, e.g. '{job="api"} |= "error"'
        expr: String,
        /// Time range (e.g., 30s, 15m, 1h, 2d)
        #[arg(short, long, default_value = "1h")]
        last: String,
        /// Routing mode
        #[arg(short, long, value_enum, default_value = "dashboard")]
        mode: ModeArg,
        /// Step interval in milliseconds
        #[arg(short, long, default_value = "15000")]
        interval_ms: i64,
        /// Maximum lines to return
        #[arg(long)]
        limit: Option<usize>,
        /// Oldest lines first
        #[arg(long)]
        forward: bool,
        /// Use the legacy query endpoint directly
        #[arg(long)]
        legacy: bool,
        /// Template variables in name=value format
        #[arg(long = "var")]
        vars: Vec<String>,
    },

    /// Tail a query until interrupted
    Tail {
        /// Query expression
        expr: String,
        /// Lines kept in the live buffer
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show the lines around a log row
    Context {
        /// Labels of the row, e.g. '{job="api", pod="a"}'
        labels: String,
        /// Row timestamp in nanoseconds since epoch
        #[arg(short, long)]
        timestamp_ns: i64,
        /// Lines after the row instead of before
        #[arg(long)]
        forward: bool,
        /// Number of lines
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List label names, or the values of one label
    Labels {
        /// Label name
        name: Option<String>,
    },

    /// Check connectivity
    Test,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(url) = cli.url {
        config.datasource.url = url;
    }

    init_logging(&config);

    match cli.command {
        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
        }

        Commands::Query {
            expr,
            last,
            mode,
            interval_ms,
            limit,
            forward,
            legacy,
            vars,
        } => {
            let mut templates = VariableTemplates::default();
            for var in vars {
                let Some((name, value)) = var.split_once('=') else {
                    bail!("Invalid variable {:?}, expected name=value", var);
                };
                templates.set(name, Variable::single(value));
            }
            let dispatcher = QueryDispatcher::new(&config)?.with_templates(Arc::new(templates));

            let to = Utc::now();
            let mut window = TimeWindow::new(to - parse_duration(&last)?, to)
                .interval_ms(interval_ms)
                .reverse(forward);
            if let Some(limit) = limit {
                window = window.max_data_points(limit);
            }

            let mut target = Target::new("A", expr);
            if legacy {
                target = target.legacy();
            }

            let mut stream =
                dispatcher.query(QueryRequest::new(vec![target], window).mode(mode.into()));
            let mut failed = false;
            while let Some(envelope) = stream.next().await {
                failed |= envelope.is_error();
                println!("{}", serde_json::to_string(&envelope)?);
            }
            if failed {
                std::process::exit(1);
            }
        }

        Commands::Tail { expr, limit } => {
            let dispatcher = QueryDispatcher::new(&config)?;

            let range = TimeRange::last_minutes(1);
            let mut window = TimeWindow::new(range.from, range.to);
            if let Some(limit) = limit {
                window = window.max_data_points(limit);
            }

            let mut stream =
                dispatcher.query(QueryRequest::new(vec![Target::new("A", expr).live()], window));
            loop {
                tokio::select! {
                    envelope = stream.next() => match envelope {
                        Some(envelope) => println!("{}", serde_json::to_string(&envelope)?),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Interrupted, closing live stream");
                        break;
                    }
                }
            }
        }

        Commands::Context {
            labels,
            timestamp_ns,
            forward,
            limit,
        } => {
            let dispatcher = QueryDispatcher::new(&config)?;
            let row = ContextRow {
                labels: parse_labels(&labels)?,
                timestamp_ns,
            };
            let direction = if forward {
                Direction::Forward
            } else {
                Direction::Backward
            };

            let mut target = Target::new("A", labels);
            if let Some(limit) = limit {
                target = target.context_limit(limit);
            }

            let frames = dispatcher.log_row_context(&target, &row, direction).await?;
            println!("{}", serde_json::to_string_pretty(&frames)?);
        }

        Commands::Labels { name } => {
            let dispatcher = QueryDispatcher::new(&config)?;
            let values = match name {
                Some(name) => dispatcher.label_values(&name).await?,
                None => dispatcher.labels().await?,
            };
            for value in values {
                println!("{}", value);
            }
        }

        Commands::Test => {
            let dispatcher = QueryDispatcher::new(&config)?;
            let check = dispatcher.test_datasource().await;
            println!("{}", check.message);
            if check.status == HealthStatus::Error {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("loki_dispatch={}", config.logging.level)));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries results; logs go to stderr
    if config.logging.is_json() {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(seconds) = s.strip_suffix('s') {
        Ok(Duration::seconds(seconds.parse()?))
    } else if let Some(minutes) = s.strip_suffix('m') {
        Ok(Duration::minutes(minutes.parse()?))
    } else if let Some(hours) = s.strip_suffix('h') {
        Ok(Duration::hours(hours.parse()?))
    } else if let Some(days) = s.strip_suffix('d') {
        Ok(Duration::days(days.parse()?))
    } else {
        bail!("Invalid duration format: {}. Use: 30s, 15m, 1h, 2d", s)
    }
}
