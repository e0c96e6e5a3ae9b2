use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use elm_split::{Config, Splitter, report::Report};
use log::{LevelFilter, debug, error, info};

#[derive(Parser, Debug)]
#[command(
    name = "elm-split",
    version,
    about = "Split a multi-program Elm bundle into per-program ES modules and a shared module"
)]
struct Cli {
    /// Compiled Elm bundle
    input: PathBuf,

    /// Print a JSON report instead of human-readable lines
    #[arg(long)]
    json: bool,

    /// Analyze and report without writing any file
    #[arg(long)]
    dry_run: bool,

    /// Output directory; defaults to the input's directory
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Config file applied after the user and project config files
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[allow(clippy::print_stdout)]
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let (report, status) = match run(&cli) {
        Ok(report) => (report, ExitCode::SUCCESS),
        Err(err) => {
            error!("{err:#}");
            let input_bytes = fs::metadata(&cli.input).map_or(0, |meta| meta.len() as usize);
            (
                Report::failure(&cli.input, input_bytes, cli.dry_run, &err),
                ExitCode::FAILURE,
            )
        }
    };

    if cli.json {
        match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(err) => {
                error!("Failed to serialize report: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else if report.error.is_none() {
        print!("{}", report.to_human());
    }
    status
}

/// `RUST_LOG` wins over `-v`
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.parse_default_env();
    builder.init();
}

fn run(cli: &Cli) -> Result<Report> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read bundle {}", cli.input.display()))?;
    let stem = cli
        .input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("Input path {} has no file name", cli.input.display()))?;

    let result = Splitter::new(config)
        .split(&source, stem)
        .with_context(|| format!("Failed to split {}", cli.input.display()))?;

    let out_dir = output_dir(cli);
    if cli.dry_run {
        info!("Dry run, nothing written");
    } else {
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;
        for module in &result.modules {
            let path = out_dir.join(&module.file_name);
            fs::write(&path, &module.contents)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            debug!("Wrote {} ({} bytes)", path.display(), module.contents.len());
        }
    }

    Ok(Report::success(
        &cli.input,
        source.len(),
        &result,
        &out_dir,
        cli.dry_run,
    ))
}

fn output_dir(cli: &Cli) -> PathBuf {
    match &cli.out_dir {
        Some(dir) => dir.clone(),
        None => cli
            .input
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
    }
}
