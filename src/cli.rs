use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "artifact-finder")]
#[command(about = "Search a remote artifact repository through its locally synced index")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, value_name = "URL")]
    pub repository: Option<String>,

    #[arg(long, value_name = "ID")]
    pub context: Option<String>,

    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub index_dir: Option<PathBuf>,

    #[arg(long)]
    pub debug: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Search {
        #[arg(short = 'g', long, value_name = "GROUP")]
        group_id: Option<String>,

        #[arg(short = 'a', long, value_name = "ARTIFACT")]
        artifact_id: Option<String>,

        #[arg(short = 'c', long, value_name = "CLASS")]
        class_name: Option<String>,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    Sync,
    Stats,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
