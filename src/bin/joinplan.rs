//! joinplan: dry-run tooling for the query planner
//!
//! # Usage
//!
//! ```bash
//! # Root statement and deferred relations of a plan file
//! joinplan plan users.json --dialect oracle
//!
//! # Batched statement for one relation
//! joinplan batch users.json --node posts --keys 1,2,3
//!
//! # Keyset cursors
//! joinplan cursor encode id=2 created_at=2020-01-01T00:00:00Z
//! joinplan cursor decode eyJpZCI6Mn0=
//! ```

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use joinplan::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "joinplan")]
#[command(version)]
#[command(about = "Paginated, batched SQL from relation trees", long_about = None)]
#[command(after_help = "EXAMPLES:
    joinplan plan users.json
    joinplan plan users.json --dialect mariadb
    joinplan batch users.json --node posts --keys 1,2,3
    joinplan cursor encode id=2")]
struct Cli {
    /// Config file (default: $JOINPLAN_CONFIG or the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Dialect, overriding the config file
    #[arg(short, long, global = true, env = "JOINPLAN_DIALECT")]
    dialect: Option<DialectName>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the root statement of a JSON plan file
    Plan {
        file: PathBuf,
    },
    /// Print the batched statement of one relation
    Batch {
        file: PathBuf,
        /// Alias of the batched relation
        #[arg(short, long)]
        node: String,
        /// Parent key values
        #[arg(short, long, value_delimiter = ',', required = true)]
        keys: Vec<String>,
    },
    /// Encode or decode keyset cursors
    Cursor {
        #[command(subcommand)]
        action: CursorAction,
    },
    /// Show which pagination techniques each dialect renders
    Dialects,
}

#[derive(Subcommand)]
enum CursorAction {
    /// Encode column=value pairs, in sort-key order
    Encode { pairs: Vec<String> },
    /// Decode a cursor
    Decode { cursor: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("JOINPLAN_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Plan { file } => {
            let planner = planner(cli)?;
            let root = read_plan(file)?;
            let plan = planner.build(&root, &()).await?;
            print_plan(&planner, &plan);
        }
        Commands::Batch { file, node, keys } => {
            let planner = planner(cli)?;
            let root = read_plan(file)?;
            let scope = BatchScope::new(keys.iter().map(|k| parse_scalar(k)));
            let plan = planner.build_batch(&root, node, &scope, &()).await?;
            print_plan(&planner, &plan);
        }
        Commands::Cursor { action } => match action {
            CursorAction::Encode { pairs } => {
                let mut cursor = Cursor::new();
                for pair in pairs {
                    let (column, value) = pair
                        .split_once('=')
                        .with_context(|| format!("expected column=value, got '{}'", pair))?;
                    cursor = cursor.with(column.trim(), parse_scalar(value));
                }
                println!("{}", cursor.encode().cyan());
            }
            CursorAction::Decode { cursor } => {
                let cursor = Cursor::decode(cursor)?;
                for (column, value) in cursor.entries() {
                    println!("  {} = {}", column.white().bold(), value.to_string().yellow());
                }
            }
        },
        Commands::Dialects => show_dialects(),
    }
    Ok(())
}

fn planner(cli: &Cli) -> Result<Planner> {
    let mut config = PlannerConfig::load(cli.config.as_deref())?;
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect;
    }
    Ok(Planner::from_config(&config))
}

fn read_plan(path: &PathBuf) -> Result<PlanNode> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    Ok(joinplan::from_json(&content)?)
}

/// Integers and RFC 3339 timestamps keep their type; anything else is a string.
fn parse_scalar(input: &str) -> Scalar {
    let input = input.trim();
    if let Ok(n) = input.parse::<i64>() {
        Scalar::Integer(n)
    } else if let Ok(d) = DateTime::parse_from_rfc3339(input) {
        Scalar::Date(d.with_timezone(&Utc))
    } else {
        Scalar::String(input.to_string())
    }
}

fn print_plan(planner: &Planner, plan: &QueryPlan) {
    println!(
        "{} {}",
        "Generated SQL".green().bold(),
        format!("({})", planner.dialect().name()).dimmed()
    );
    println!("{}", plan.sql.white());

    if !plan.deferred.is_empty() {
        println!();
        println!("{}", "Deferred batches:".cyan());
        for d in &plan.deferred {
            println!(
                "  {} {} {} {}",
                d.alias.yellow(),
                "under".dimmed(),
                d.parent_alias,
                format!("({} = {})", d.child_key_column, d.parent_key_column).dimmed()
            );
        }
    }
}

fn show_dialects() {
    println!("{}", "Pagination support".cyan().bold());
    println!();
    print!("{:10}", "Dialect".white().bold());
    for technique in Technique::ALL {
        print!(" {:22}", technique.to_string().white().bold());
    }
    println!();
    println!("{}", "─".repeat(125).dimmed());

    for name in DialectName::ALL {
        let module = name.module();
        print!("{:10}", name.as_str().yellow());
        for technique in Technique::ALL {
            let mark = if module.supports(technique) {
                "✓".green()
            } else {
                "✗".red()
            };
            print!(" {:22}", mark);
        }
        println!();
    }
}
