pub mod cli;
pub mod compile;
pub mod config;
pub mod ingest;
pub mod query;
pub mod reader;
pub mod result;
pub mod schema;
pub mod store;
pub mod value;

use std::{env, fs::File, io::BufReader, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::cli::{Cli, Commands};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_pivot", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => handle_probe(&args),
        Commands::Compile(args) => handle_compile(&args),
    }
}

fn handle_probe(args: &cli::ProbeArgs) -> Result<()> {
    let file = File::open(&args.input)
        .with_context(|| format!("failed to open input file {:?}", args.input))?;
    let mut reader = reader::DelimitedReader::new(file)
        .with_context(|| format!("failed to open delimited reader over {:?}", args.input))?;
    info!(
        "probing '{}' with detected delimiter '{}'",
        args.input.display(),
        printable_delimiter(reader.delimiter())
    );
    let schema = schema::deduce_schema(&mut reader, args.sample_rows)
        .with_context(|| format!("failed to deduce schema from {:?}", args.input))?;
    match &args.out {
        Some(path) => {
            let out = File::create(path)
                .with_context(|| format!("failed to create schema file {path:?}"))?;
            serde_json::to_writer_pretty(out, &schema).context("failed to write schema JSON")?;
            info!(
                "deduced schema for {} column(s) written to {:?}",
                schema.column_count(),
                path
            );
        }
        None => {
            let rendered =
                serde_json::to_string_pretty(&schema).context("failed to encode schema JSON")?;
            println!("{rendered}");
        }
    }
    Ok(())
}

fn handle_compile(args: &cli::CompileArgs) -> Result<()> {
    let file = File::open(&args.query)
        .with_context(|| format!("failed to open query file {:?}", args.query))?;
    let parsed: query::AnalysisQuery =
        serde_json::from_reader(BufReader::new(file)).context("failed to parse query")?;
    let sql = compile::compile_analysis_query(&parsed, &args.table)
        .context("failed to compile analysis query")?;
    println!("{sql}");
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
