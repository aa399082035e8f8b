use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::warn;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use raplan::query::planner::join_reordering::JoinOrder;
use raplan::{
    Optimizer, OptimizerConfig, PlanComparison, RaNode, SelectQuery, TableStatistics,
    build_ra_tree,
};

#[derive(Parser)]
#[command(author, version, about = "raplan - build, cost and optimize relational-algebra plans")]
struct Cli {
    /// Table statistics snapshot (JSON object of table name to row count)
    #[arg(short, long)]
    stats: Option<PathBuf>,

    /// Optimizer configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the relational-algebra plan of a query
    Build {
        /// Query AST as JSON, or `-` for stdin
        query: PathBuf,
    },

    /// Build a plan and annotate it with cost estimates
    Cost { query: PathBuf },

    /// Build a plan and push its selections toward the leaves
    Pushdown { query: PathBuf },

    /// Build a plan and reorder its join chain by cost
    Reorder { query: PathBuf },

    /// Run the full optimization pipeline
    Optimize { query: PathBuf },

    /// Optimize a plan and compare its cost with the original
    Compare { query: PathBuf },

    /// Show the loaded table statistics
    Stats,
}

/// Everything a command needs besides its query
struct Session {
    optimizer: Optimizer,
    stats: TableStatistics,
    format: OutputFormat,
}

impl Session {
    fn new(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str::<OptimizerConfig>(&text)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => OptimizerConfig::default(),
        };

        let stats = match &cli.stats {
            Some(path) => TableStatistics::load(path)
                .with_context(|| format!("Failed to load statistics {}", path.display()))?,
            None => {
                warn!("No statistics given; every table is estimated at 0 rows");
                TableStatistics::new()
            }
        };

        Ok(Session {
            optimizer: Optimizer::new(config),
            stats,
            format: cli.format,
        })
    }

    fn run(&self, command: &Commands) -> Result<()> {
        match command {
            Commands::Build { query } => {
                let plan = build_plan(query)?;
                self.print_plan(&plan)
            }
            Commands::Cost { query } => {
                let mut plan = build_plan(query)?;
                self.optimizer.estimate(&mut plan, &self.stats);
                self.print_plan(&plan)
            }
            Commands::Pushdown { query } => {
                let config = OptimizerConfig {
                    enable_pushdown: true,
                    enable_join_reorder: false,
                    ..self.optimizer.config().clone()
                };
                let plan = Optimizer::new(config).optimize(build_plan(query)?, &self.stats)?;
                self.print_plan(&plan)
            }
            Commands::Reorder { query } => self.reorder(query),
            Commands::Optimize { query } => {
                let plan = self.optimizer.optimize(build_plan(query)?, &self.stats)?;
                self.print_plan(&plan)
            }
            Commands::Compare { query } => self.compare(query),
            Commands::Stats => self.print_stats(),
        }
    }

    fn reorder(&self, query: &Path) -> Result<()> {
        let config = self.optimizer.config();
        let reordering = raplan::JoinReorderingOptimizer::new(
            config.cost.clone(),
            config.join_reorder.clone(),
        );

        let mut plan = build_plan(query)?;
        self.optimizer.estimate(&mut plan, &self.stats);
        let order = reordering.plan_join_order(&plan)?;
        let plan = reordering.optimize(plan, &self.stats)?;

        match self.format {
            OutputFormat::Json => {
                let output = json!({ "plan": plan, "join_order": order });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                print_join_order(order.as_ref());
                println!("{}", plan);
            }
        }
        Ok(())
    }

    fn compare(&self, query: &Path) -> Result<()> {
        let mut original = build_plan(query)?;
        let original_cost = self.optimizer.estimate(&mut original, &self.stats);
        let optimized = self.optimizer.optimize(original.clone(), &self.stats)?;
        let optimized_cost = optimized.cumulative_cost().unwrap_or_default();
        let comparison = self.optimizer.compare(original_cost, optimized_cost);

        match self.format {
            OutputFormat::Json => {
                let output = json!({
                    "original": original,
                    "optimized": optimized,
                    "original_cost": original_cost,
                    "optimized_cost": optimized_cost,
                    "comparison": comparison,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                println!("Original plan:");
                println!("{}", original);
                println!("Optimized plan:");
                println!("{}", optimized);
                display_table(
                    &["plan", "cumulative cost"],
                    &[
                        vec!["original".to_string(), format!("{:.2e}", original_cost)],
                        vec!["optimized".to_string(), format!("{:.2e}", optimized_cost)],
                    ],
                );
                println!("{}", comparison);
                if comparison == PlanComparison::MoreExpensive {
                    warn!("Optimization produced a more expensive plan");
                }
            }
        }
        Ok(())
    }

    fn print_plan(&self, plan: &RaNode) -> Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(plan)?),
            OutputFormat::Text => println!("{}", plan),
        }
        Ok(())
    }

    fn print_stats(&self) -> Result<()> {
        let mut entries: Vec<(&str, u64)> = self.stats.iter().collect();
        entries.sort_unstable();

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&self.stats)?),
            OutputFormat::Text => {
                let rows: Vec<Vec<String>> = entries
                    .iter()
                    .map(|(table, rows)| vec![table.to_string(), rows.to_string()])
                    .collect();
                display_table(&["table", "rows"], &rows);
            }
        }
        Ok(())
    }
}

/// Read a query AST from a JSON file, or stdin for `-`
fn read_query(path: &Path) -> Result<SelectQuery> {
    let text = if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read query from stdin")?;
        buffer
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read query {}", path.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("Invalid query AST in {}", path.display()))
}

fn build_plan(path: &Path) -> Result<RaNode> {
    let query = read_query(path)?;
    build_ra_tree(&query).context("Failed to build plan")
}

fn print_join_order(order: Option<&JoinOrder>) {
    let Some(order) = order else {
        println!("Join order unchanged (fewer than two joins in the chain)");
        return;
    };
    println!(
        "Join order ({:?} search, cost {:.2e}):",
        order.strategy, order.cost
    );
    for (step, edge) in order.edges.iter().enumerate() {
        println!("  {}. {}", step + 1, edge.condition);
    }
}

fn display_table(headers: &[&str], rows: &[Vec<String>]) {
    // Column widths, with a minimum of 3 characters per column
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len().max(3)).collect();
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            widths[i] = widths[i].max(value.len());
        }
    }

    print!("|");
    for (header, width) in headers.iter().zip(&widths) {
        print!(" {:<width$} |", header, width = width);
    }
    println!();

    print!("+");
    for width in &widths {
        print!("{:-<width$}+", "", width = width + 2);
    }
    println!();

    for row in rows {
        print!("|");
        for (value, width) in row.iter().zip(&widths) {
            print!(" {:<width$} |", value, width = width);
        }
        println!();
    }

    println!("({} rows)", rows.len());
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    // Logs go to stderr so JSON output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let session = Session::new(&cli)?;
    session.run(&cli.command)
}
