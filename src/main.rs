use anyhow::Result;
use artifact_finder::cli::{Cli, Commands, OutputFormat};
use artifact_finder::config::{SearchConfig, DEFAULT_CONTEXT_ID, DEFAULT_REPOSITORY_URL};
use artifact_finder::query::SearchCriteria;
use artifact_finder::session::{IndexSearcher, SearchResult};
use artifact_finder::store::format_timestamp;
use artifact_finder::sync::UpdateOutcome;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const ABSENT_FIELD: &str = "NA";

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = resolve_config(&cli)?;
    let searcher = IndexSearcher::new(config);

    match cli.command.clone() {
        Commands::Search {
            group_id,
            artifact_id,
            class_name,
            format,
        } => {
            let criteria = SearchCriteria {
                group_id,
                artifact_id,
                class_name,
            };
            let results = searcher.search(&criteria)?;
            write_search_output(&results, format)?;
        }
        Commands::Sync => {
            let outcome = searcher.synchronize()?;
            println!("{}", describe_outcome(&outcome));
        }
        Commands::Stats => {
            let stats = searcher.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<SearchConfig> {
    let context = cli
        .context
        .clone()
        .unwrap_or_else(|| DEFAULT_CONTEXT_ID.to_string());
    let repository = cli
        .repository
        .clone()
        .unwrap_or_else(|| DEFAULT_REPOSITORY_URL.to_string());

    let mut config = SearchConfig::new(context, repository)?;
    if let Some(dir) = cli.cache_dir.clone() {
        config.cache_dir = dir;
    }
    if let Some(dir) = cli.index_dir.clone() {
        config.index_dir = dir;
    }
    Ok(config)
}

fn write_search_output(results: &[SearchResult], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(results)?),
        OutputFormat::Text => print!("{}", render_search_text(results)),
    }
    Ok(())
}

fn render_search_text(results: &[SearchResult]) -> String {
    let mut out = String::new();
    for result in results {
        out.push_str(&format!(
            "{}:{}:{}:{}\n",
            field(&result.group_id),
            field(&result.artifact_id),
            field(&result.version),
            field(&result.packaging)
        ));
        if let Some(class_names) = result.class_names.as_ref()
            && !class_names.is_empty()
        {
            out.push_str("  Contains the matching class(es):\n");
            for name in class_names {
                out.push_str(&format!("  - {name}\n"));
            }
        }
    }
    out
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(ABSENT_FIELD)
}

fn describe_outcome(outcome: &UpdateOutcome) -> String {
    match outcome {
        UpdateOutcome::Full => "full update done".to_string(),
        UpdateOutcome::Unchanged => "no update needed".to_string(),
        UpdateOutcome::Incremental { from, to } => format!(
            "incremental update done: {} to {}",
            format_timestamp(from),
            format_timestamp(to)
        ),
    }
}
