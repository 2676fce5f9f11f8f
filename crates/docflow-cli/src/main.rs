//! `docflow` - operator tools for the document workflow engine
//!
//! - `check-config` validates an engine configuration file
//! - `reconcile` compares an exported search index object with an exported
//!   datastore snapshot, offline

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use docflow_core::{init_logging, reconcile, ConsistencyReport, EngineConfig, LogFormat};
use docflow_record::{DocumentSnapshot, SearchObject};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .short('c')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Engine configuration file (TOML)");

    Command::new("docflow")
        .version(docflow_core::VERSION)
        .about("Document workflow engine tools")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit JSON logs"),
        )
        .subcommand(
            Command::new("check-config")
                .about("Validate a configuration file")
                .arg(config_arg.clone()),
        )
        .subcommand(
            Command::new("reconcile")
                .about("Compare an index object with a datastore snapshot")
                .arg(config_arg)
                .arg(
                    Arg::new("index")
                        .long("index")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Search index object (JSON)"),
                )
                .arg(
                    Arg::new("record")
                        .long("record")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Datastore snapshot (JSON)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
}

fn path_arg<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a Path> {
    args.get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .with_context(|| format!("missing --{name}"))
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    EngineConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn check_config(path: &Path) -> Result<String> {
    let config = load_config(path)?;
    let mut out = format!(
        "{}: ok\n  base url: {}\n  email: {}\n",
        path.display(),
        config.base_url,
        if config.email.enabled { "enabled" } else { "disabled" },
    );
    for doc_type in &config.document_types {
        let _ = writeln!(
            out,
            "  {} ({} custom fields)",
            doc_type.name,
            doc_type.custom_fields.len()
        );
    }
    Ok(out)
}

fn reconcile_files(config: &Path, index: &Path, record: &Path) -> Result<ConsistencyReport> {
    let config = load_config(config)?;
    let index: SearchObject = read_json(index)?;
    let snapshot: DocumentSnapshot = read_json(record)?;
    Ok(ConsistencyReport {
        document_id: snapshot.row.id.clone(),
        discrepancies: reconcile(&index, &snapshot, &config.document_types),
    })
}

fn render(report: &ConsistencyReport, json: bool) -> Result<String> {
    if json {
        return serde_json::to_string_pretty(report).context("encoding report");
    }
    if report.is_consistent() {
        return Ok(format!("{}: consistent", report.document_id));
    }
    let mut out = format!(
        "{}: {} discrepancies",
        report.document_id,
        report.discrepancies.len()
    );
    for discrepancy in &report.discrepancies {
        let _ = write!(out, "\n  {discrepancy}");
    }
    Ok(out)
}

fn run(matches: &ArgMatches) -> Result<ExitCode> {
    match matches.subcommand() {
        Some(("check-config", args)) => {
            print!("{}", check_config(path_arg(args, "config")?)?);
            Ok(ExitCode::SUCCESS)
        }
        Some(("reconcile", args)) => {
            let report = reconcile_files(
                path_arg(args, "config")?,
                path_arg(args, "index")?,
                path_arg(args, "record")?,
            )?;
            report.log();
            println!("{}", render(&report, args.get_flag("json"))?);
            Ok(if report.is_consistent() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        _ => anyhow::bail!("no command given"),
    }
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_logging(if matches.get_flag("log-json") {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });

    match run(&matches) {
        Ok(code) => code,
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "command failed");
            eprintln!("error: {error:#}");
            ExitCode::from(2)
        }
    }
}
