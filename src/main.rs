//! tsquery CLI
//!
//! Command-line interface for compiling query templates:
//! - Compile a template against a time range
//! - Generate a default config file

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tsquery::config::{generate_default_config, Config, LoggingConfig};
use tsquery::query::{QueryOptions, ScopedVars, SqlQuery, VariableValue};
use tsquery::time::{DateMath, TimeRange};

#[derive(Parser)]
#[command(name = "tsquery")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile time-series query templates into SQL")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (sql, json)
    #[arg(short, long, default_value = "sql", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a query template
    Compile {
        /// Template text, `-` for stdin (default: query from config)
        query: Option<String>,
        /// Range start (e.g. now-6h, 2024-03-01 00:00:00)
        #[arg(long, default_value = "now-6h")]
        from: String,
        /// Range end
        #[arg(long, default_value = "now")]
        to: String,
        /// Instant `now` resolves to, RFC 3339 (default: current time)
        #[arg(long)]
        now: Option<String>,
        /// Automatic interval used when the target sets none
        #[arg(short, long, default_value = "30s")]
        interval: String,
        /// Scoped variables in name=value format, commas make a multi value
        #[arg(short = 'V', long = "var")]
        vars: Vec<String>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    match cli.command {
        Commands::Compile {
            query,
            from,
            to,
            now,
            interval,
            vars,
        } => {
            let now = match now {
                Some(now) => DateTime::parse_from_rfc3339(&now)?.with_timezone(&Utc),
                None => Utc::now(),
            };

            let mut target = config.target.clone();
            match query.as_deref() {
                Some("-") => {
                    let mut text = String::new();
                    std::io::stdin().read_to_string(&mut text)?;
                    target.query = text;
                }
                Some(text) => target.query = text.to_string(),
                None => {}
            }
            if target.query.trim().is_empty() {
                return Err("No query given and none configured".into());
            }

            let variables = config.template_variables();
            let dates = DateMath::new(now);
            let options = QueryOptions::new(TimeRange::from_raw(&from, &to), interval)
                .scoped_vars(parse_vars(&vars)?);

            let compiled = SqlQuery::new(&target, &variables, &dates).compile(&options)?;

            match cli.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&compiled)?),
                _ => println!("{}", compiled.sql),
            }
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)?;
                    tracing::info!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tsquery={}", logging.level)));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Parse `name=value` pairs into scoped variables
fn parse_vars(vars: &[String]) -> Result<ScopedVars, String> {
    let mut scoped = ScopedVars::new();
    for var in vars {
        let (name, value) = var
            .split_once('=')
            .ok_or_else(|| format!("Invalid variable '{}', expected name=value", var))?;

        let value = if value.contains(',') {
            VariableValue::Multi(value.split(',').map(|v| v.trim().to_string()).collect())
        } else {
            VariableValue::Single(value.to_string())
        };
        scoped.insert(name.trim().to_string(), value);
    }
    Ok(scoped)
}
