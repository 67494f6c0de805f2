use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use shardsql::route::{Column, Expression, Predicate, SelectStatement};
use shardsql::{AlgorithmRegistry, RoutingEngine, ShardingRule, ShardingRuleConfig, SqlStatement};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "shardsql")]
#[command(about = "ShardSQL - inspect sharding rules and routes", long_about = None)]
struct Args {
    /// Sharding rule file (TOML)
    #[arg(short, long, default_value = "sharding.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the data nodes of a logic table
    Nodes {
        #[arg(long)]
        table: String,
    },
    /// Route a SELECT and print its execution units
    Route {
        #[arg(long)]
        table: Option<String>,

        /// Equality predicate, e.g. --value order_id=7
        #[arg(long = "value")]
        values: Vec<String>,

        /// Statement descriptor as JSON, instead of --table/--value
        #[arg(long, conflicts_with = "table")]
        statement: Option<PathBuf>,

        /// Bound parameters as a JSON array
        #[arg(long, default_value = "[]")]
        params: String,
    },
    /// Build the rule and report what it contains
    Check,
}

/// `col=val`; the value is read as JSON when it parses, as a string otherwise.
fn parse_assignment(raw: &str) -> anyhow::Result<(String, Value)> {
    let (column, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected column=value, got '{}'", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((column.trim().to_string(), value))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shardsql=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ShardingRuleConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let rule = ShardingRule::new(&config, &AlgorithmRegistry::with_builtins())?;
    tracing::info!(
        "Loaded {} table rules over {} data sources",
        rule.table_rules().len(),
        rule.data_source_names().len()
    );

    match args.command {
        Command::Nodes { table } => {
            let table_rule = rule.table_rule(&table)?;
            for node in &table_rule.actual_data_nodes {
                println!("{}", node);
            }
        }
        Command::Route {
            table,
            values,
            statement,
            params,
        } => {
            let parameters: Vec<Value> =
                serde_json::from_str(&params).context("--params must be a JSON array")?;
            let statement = match (statement, table) {
                (Some(path), _) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    serde_json::from_str::<SqlStatement>(&text)?
                }
                (None, Some(table)) => {
                    let mut predicates = Vec::new();
                    for raw in &values {
                        let (column, value) = parse_assignment(raw)?;
                        predicates.push(Predicate::eq(Column::new(&column), Expression::Literal(value)));
                    }
                    let mut select = SelectStatement::new(&[table.as_str()]);
                    if !predicates.is_empty() {
                        select = select.filter(Predicate::and(predicates));
                    }
                    SqlStatement::Select(select)
                }
                (None, None) => bail!("Either --table or --statement is required"),
            };

            let context = RoutingEngine::new(&rule).route(&statement, &parameters, None)?;
            if context.route_result.is_no_targets() {
                println!("(no targets)");
            }
            for unit in context.units() {
                println!("{}", unit);
            }
            if let Some(key) = &context.generated_key {
                println!("generated {} = {}", key.column, Value::Array(key.values.clone()));
            }
        }
        Command::Check => {
            println!("data sources:   {}", rule.data_source_names().join(", "));
            println!("table rules:    {}", rule.table_rules().len());
            println!("binding groups: {}", rule.binding_table_rules().len());
            println!("broadcast:      {}", rule.broadcast_tables().len());
            if let Some(ds) = rule.default_data_source() {
                println!("default:        {}", ds);
            }
        }
    }

    Ok(())
}
