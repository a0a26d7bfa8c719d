use anyhow::{Context, Result};
use clap::{Arg, Command};
use log::LevelFilter;
use phish_triage::{EngineConfig, MessageRecord, ScoringEngine};
use std::io::{BufRead, Write};
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("phish-triage")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Multi-signal phishing risk scoring for bulk mail triage")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (YAML); defaults are used when absent"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write the default configuration file and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("Normalized message records, one JSON object per line (default: stdin)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Report destination, one JSON object per line (default: stdout)"),
        )
        .arg(
            Arg::new("max")
                .long("max")
                .value_name("N")
                .help("Process at most N messages")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-config") {
        if let Err(e) = EngineConfig::default().to_file(path) {
            eprintln!("Error writing configuration: {e}");
            process::exit(1);
        }
        println!("Default configuration written to {path}");
        return;
    }

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading configuration: {e}");
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    if matches.get_flag("test-config") {
        match config.validate() {
            Ok(()) => {
                println!("Configuration is valid.");
                println!("  signals weighted: 5");
                println!("  brand table entries: {}", config.brands.len());
                println!("  suspicious TLDs: {}", config.suspicious_tlds.len());
                return;
            }
            Err(e) => {
                eprintln!("Configuration invalid: {e}");
                process::exit(1);
            }
        }
    }

    if let Some(max) = matches.get_one::<usize>("max") {
        config.max_messages = Some(*max);
    }

    let input = matches.get_one::<String>("input").cloned();
    let output = matches.get_one::<String>("output").cloned();
    if let Err(e) = run(config, input.as_deref(), output.as_deref()).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(config: EngineConfig, input: Option<&str>, output: Option<&str>) -> Result<()> {
    let engine = Arc::new(ScoringEngine::new(config)?);

    let records = read_records(input)?;
    log::info!("loaded {} message records", records.len());

    let (reports, summary) = engine.assess_batch(records).await;

    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            std::fs::File::create(path).with_context(|| format!("cannot create {path}"))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };
    for report in &reports {
        serde_json::to_writer(&mut writer, report)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    eprintln!(
        "Processed {} messages: {} high, {} medium, {} low risk (lookup success {:.0}%)",
        summary.messages_processed,
        summary.high_risk,
        summary.medium_risk,
        summary.low_risk,
        summary.lookup_success_rate() * 100.0
    );
    Ok(())
}

/// Read one MessageRecord per line. A malformed line is logged and skipped;
/// one bad record never aborts the batch.
fn read_records(input: Option<&str>) -> Result<Vec<MessageRecord>> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(std::io::BufReader::new(
            std::fs::File::open(path).with_context(|| format!("cannot open {path}"))?,
        )),
        None => Box::new(std::io::stdin().lock()),
    };

    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MessageRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                log::debug!("skipping malformed record on line {}: {e}", line_no + 1);
            }
        }
    }
    Ok(records)
}
