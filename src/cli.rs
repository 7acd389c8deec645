use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Pivot analysis over delimited datasets", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Probe a delimited file and deduce a table schema as JSON
    Probe(ProbeArgs),
    /// Compile an analysis query JSON file into backend SQL
    Compile(CompileArgs),
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Input delimited file to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination schema JSON path (stdout if omitted)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
    /// Number of rows to sample when deducing types
    #[arg(long, default_value_t = 1000)]
    pub sample_rows: usize,
}

#[derive(Debug, Args)]
pub struct CompileArgs {
    /// Analysis query JSON file
    #[arg(short = 'q', long = "query")]
    pub query: PathBuf,
    /// Target table name
    #[arg(short, long)]
    pub table: String,
}
