//! Binary entry point for mapstore.
//!
//! Inspects mapping directories, renders generated SQL, and runs mapped
//! commands against configured connections.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use mapstore::config::EngineConfig;
use mapstore::mapping::{LoadPolicy, MappingLoader};
use mapstore::observability::{self, LogFormat};
use mapstore::sql::{
    ClauseColumn, Column, Combinator, Dialect, Operator, Select, SortableColumn, SqlBuilder,
};
use mapstore::storage::{MappedStorage, Params, Record, Value};
use mapstore::Engine;
use std::path::PathBuf;
use std::process::ExitCode;

/// mapstore - SQL command mappings and storage bootstrap.
#[derive(Parser)]
#[command(name = "mapstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter directive (overrides the config file).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format: pretty or json.
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Load a mapping directory and report what it contains.
    Check {
        /// Mapping directory (defaults to the configured one).
        dir: Option<PathBuf>,

        /// Skip invalid files instead of failing on the first one.
        #[arg(long)]
        skip_invalid: bool,
    },

    /// Print one mapping, or one of its commands, as JSON.
    Show {
        /// Mapping directory.
        dir: PathBuf,

        /// Owner type name of the mapping.
        owner: String,

        /// Command key.
        key: Option<String>,
    },

    /// Render a generated statement without running it.
    Render {
        /// Statement: insert, update, delete, count, list or paged.
        #[arg(default_value = "list")]
        statement: String,

        /// Target table.
        #[arg(short, long)]
        table: String,

        /// Selected columns (comma-separated).
        #[arg(long)]
        columns: Option<String>,

        /// Values for insert/update as `column=value` (repeatable).
        #[arg(long = "set")]
        values: Vec<String>,

        /// Clause as `column:operator:value` (repeatable). `in` takes `a|b|c`.
        #[arg(short = 'w', long = "where")]
        clauses: Vec<String>,

        /// Join clauses with OR instead of AND.
        #[arg(long)]
        or: bool,

        /// Sort key; prefix with `-` for descending (repeatable).
        #[arg(short, long, allow_hyphen_values = true)]
        sort: Vec<String>,

        /// Paging dialect: limit_offset or row_number.
        #[arg(long, default_value = "limit_offset")]
        dialect: String,

        /// Page number (1-based).
        #[arg(long, default_value = "1")]
        page: u32,

        /// Rows per page.
        #[arg(long, default_value = "20")]
        page_size: u32,
    },

    /// Run a mapped query command and print its rows as JSON lines.
    Exec {
        /// Owner type name of the mapping.
        owner: String,

        /// Command key.
        key: String,

        /// Parameter as `name=value` (repeatable). `a|b|c` binds a list.
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Mapping directory (defaults to the configured one).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => EngineConfig::load_default()?,
    };
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(format) = &cli.log_format {
        config.logging.format =
            LogFormat::parse(format).ok_or_else(|| anyhow!("unknown log format '{format}'"))?;
    }
    Ok(config)
}

fn run_command(command: Commands, config: EngineConfig) -> Result<()> {
    match command {
        Commands::Check { dir, skip_invalid } => cmd_check(config, dir, skip_invalid),
        Commands::Show { dir, owner, key } => cmd_show(config, dir, &owner, key.as_deref()),
        Commands::Render {
            statement,
            table,
            columns,
            values,
            clauses,
            or,
            sort,
            dialect,
            page,
            page_size,
        } => cmd_render(&RenderArgs {
            statement,
            table,
            columns,
            values,
            clauses,
            or,
            sort,
            dialect,
            page,
            page_size,
        }),
        Commands::Exec {
            owner,
            key,
            params,
            dir,
        } => cmd_exec(config, &owner, &key, &params, dir),
    }
}

fn cmd_check(config: EngineConfig, dir: Option<PathBuf>, skip_invalid: bool) -> Result<()> {
    let dir = dir.unwrap_or(config.mapping_dir);
    let policy = if skip_invalid {
        LoadPolicy::SkipInvalid
    } else {
        config.load_policy
    };
    let (registry, report) = MappingLoader::new()
        .with_extension(config.mapping_extension)
        .with_policy(policy)
        .load_with_report(&dir)?;

    println!("Mapping directory: {}", dir.display());
    println!("  files:    {}", report.discovered);
    println!("  loaded:   {}", report.loaded);
    println!("  skipped:  {}", report.skipped.len());
    for owner in registry.owner_names() {
        let mapping = registry.get(&owner)?;
        println!(
            "  {owner} [{}] {} command(s)",
            mapping.connection_key,
            mapping.len()
        );
    }
    for skipped in &report.skipped {
        println!("  ! {}: {}", skipped.path.display(), skipped.reason);
    }
    Ok(())
}

fn cmd_show(config: EngineConfig, dir: PathBuf, owner: &str, key: Option<&str>) -> Result<()> {
    let registry = MappingLoader::new()
        .with_extension(config.mapping_extension)
        .with_policy(config.load_policy)
        .load_from(&dir)?;
    let mapping = registry.get(owner)?;

    let output = match key {
        Some(key) => serde_json::to_string_pretty(mapping.command(key)?)?,
        None => serde_json::to_string_pretty(&*mapping)?,
    };
    println!("{output}");
    Ok(())
}

struct RenderArgs {
    statement: String,
    table: String,
    columns: Option<String>,
    values: Vec<String>,
    clauses: Vec<String>,
    or: bool,
    sort: Vec<String>,
    dialect: String,
    page: u32,
    page_size: u32,
}

fn cmd_render(args: &RenderArgs) -> Result<()> {
    let dialect =
        Dialect::parse(&args.dialect).ok_or_else(|| anyhow!("unknown dialect '{}'", args.dialect))?;
    let builder = SqlBuilder::new(dialect);
    let combinator = if args.or {
        Combinator::Or
    } else {
        Combinator::And
    };

    let columns: Vec<Column> = args
        .columns
        .iter()
        .flat_map(|list| list.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Column::from)
        .collect();
    let values = args
        .values
        .iter()
        .map(|pair| {
            let (name, value) = split_pair(pair)?;
            Ok(mapstore::ValueColumn::new(name, parse_value(value)))
        })
        .collect::<Result<Vec<_>>>()?;
    let clauses = args
        .clauses
        .iter()
        .map(String::as_str)
        .map(parse_clause)
        .collect::<Result<Vec<_>>>()?;
    let sorts: Vec<SortableColumn> = args
        .sort
        .iter()
        .map(|key| match key.strip_prefix('-') {
            Some(name) => SortableColumn::desc(name),
            None => SortableColumn::asc(key.as_str()),
        })
        .collect();

    let select = Select::from(&args.table)
        .columns(&columns)
        .filter(&clauses, combinator)
        .order_by(&sorts);

    let built = match args.statement.to_lowercase().as_str() {
        "insert" => builder.insert(&args.table, &values)?,
        "update" => builder.update(&args.table, &values, &clauses, combinator)?,
        "delete" => builder.delete(&args.table, &clauses, combinator)?,
        "count" => builder.count(&args.table, &clauses, combinator)?,
        "list" => builder.list(&select)?,
        "paged" | "paged_list" => builder.paged_list(&select, args.page, args.page_size)?,
        other => bail!("unknown statement kind '{other}'"),
    };

    println!("{}", built.text);
    for (name, value) in built.params.iter() {
        println!("  @{name} = {value:?}");
    }
    Ok(())
}

fn cmd_exec(
    config: EngineConfig,
    owner: &str,
    key: &str,
    params: &[String],
    dir: Option<PathBuf>,
) -> Result<()> {
    let config = match dir {
        Some(dir) => config.with_mapping_dir(dir),
        None => config,
    };
    let params = params
        .iter()
        .map(|pair| split_pair(pair).map(|(name, value)| (name, parse_value(value))))
        .collect::<Result<Params>>()?;

    let engine = Engine::from_config(config)?;
    let mapping = engine.mappings().get(owner)?;
    let executor = engine.executor(&mapping.connection_key)?;
    let storage = MappedStorage::new(executor, mapping);

    let mut rows = 0usize;
    storage.query_command_unbuffered(key, &params, None, |record: Record| {
        rows += 1;
        println!("{}", record.to_json());
        Ok(())
    })?;
    tracing::info!(owner, key, rows, "command finished");
    Ok(())
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    pair.split_once('=')
        .map(|(name, value)| (name.trim(), value))
        .ok_or_else(|| anyhow!("expected name=value, got '{pair}'"))
}

fn parse_clause(raw: &str) -> Result<ClauseColumn> {
    let mut parts = raw.splitn(3, ':');
    let (Some(name), Some(op), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("expected column:operator:value, got '{raw}'");
    };
    let operator = Operator::parse(op).ok_or_else(|| anyhow!("unknown operator '{op}'"))?;
    let value = if operator == Operator::In {
        Value::List(value.split('|').map(parse_scalar).collect())
    } else {
        parse_scalar(value)
    };
    let clause = ClauseColumn::new(name, operator, value);
    clause.validate()?;
    Ok(clause)
}

fn parse_value(raw: &str) -> Value {
    if raw.contains('|') {
        Value::List(raw.split('|').map(parse_scalar).collect())
    } else {
        parse_scalar(raw)
    }
}

fn parse_scalar(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(r) = raw.parse::<f64>() {
        return Value::Real(r);
    }
    Value::Text(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar() {
        assert_eq!(parse_scalar("42"), Value::Integer(42));
        assert_eq!(parse_scalar("1.5"), Value::Real(1.5));
        assert_eq!(parse_scalar("NULL"), Value::Null);
        assert_eq!(parse_scalar("ada"), Value::Text("ada".to_string()));
    }

    #[test]
    fn test_parse_clause() {
        let clause = parse_clause("id:in:1|2|3").unwrap();
        assert_eq!(clause.operator, Operator::In);
        assert_eq!(
            clause.value,
            Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        );
        assert!(parse_clause("id:eq").is_err());
        assert!(parse_clause("id:between:3").is_err());
    }

    #[test]
    fn test_cli_parses_render() {
        let cli = Cli::try_parse_from([
            "mapstore", "render", "paged", "--table", "users", "--sort", "-id", "--page", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Render { page, sort, .. } => {
                assert_eq!(page, 2);
                assert_eq!(sort, vec!["-id".to_string()]);
            },
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn test_cli_render_where_and_config() {
        let cli = Cli::try_parse_from([
            "mapstore", "-c", "mapstore.toml", "render", "count", "-t", "users", "-w", "id:gt:3",
            "--where", "name:like:a%",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("mapstore.toml")));
        match cli.command {
            Commands::Render { clauses, .. } => {
                assert_eq!(clauses, vec!["id:gt:3".to_string(), "name:like:a%".to_string()]);
            },
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
