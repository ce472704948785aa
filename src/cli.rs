//! Command-line interface definitions and command implementations.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;

use crate::config::{self, SmapConfig};
use crate::error::{Result, SmapError};
use crate::models::Smap;
use crate::parser::{ParseMode, SmapParser};
use crate::retrace::{FsLocator, SourceLocator, retrace_text};
use crate::writer::SmapWriter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Inspect and apply SMAP line mappings")]
pub struct Cli {
    /// Skip unknown sections and malformed entries instead of failing
    #[arg(long, global = true)]
    pub lenient: bool,

    /// Do not check mapping invariants after parsing
    #[arg(long, global = true)]
    pub no_validate: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse a SMAP and print it in canonical form
    Parse(ParseArgs),
    /// Validate SMAPs and verify they re-encode unchanged
    Check(CheckArgs),
    /// Resolve generated line numbers to source positions
    Resolve(ResolveArgs),
    /// Rewrite a stack trace read from stdin
    Retrace(RetraceArgs),
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    pub file: PathBuf,
    /// Print the parsed structure as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    pub file: PathBuf,
    #[arg(required = true)]
    pub lines: Vec<u32>,
}

#[derive(Args, Debug)]
pub struct RetraceArgs {
    /// SMAP of the class whose frames should be remapped
    pub file: PathBuf,
    /// Number of lines in the class's own source file
    #[arg(long)]
    pub class_lines: Option<u32>,
    /// Directories searched for the remapped source files
    #[arg(long = "source-root")]
    pub source_roots: Vec<PathBuf>,
}

impl Cli {
    /// Environment configuration with command-line flags applied on top.
    pub fn config(&self) -> SmapConfig {
        self.apply(config::get_config())
    }

    pub fn apply(&self, mut config: SmapConfig) -> SmapConfig {
        if self.lenient {
            config.parse_mode = ParseMode::Lenient;
        }
        if self.no_validate {
            config.validate = false;
        }
        config
    }
}

fn read_smap(parser: &SmapParser, path: &Path) -> Result<Smap> {
    let text = std::fs::read_to_string(path)?;
    parser.parse(&text)
}

/// Runs the parsed command. Returns `false` when the command completed but
/// found problems.
pub fn run(
    cli: &Cli,
    config: &SmapConfig,
    stdin: &mut impl Read,
    stdout: &mut impl Write,
) -> Result<bool> {
    let parser = SmapParser::from_config(config);
    let writer = SmapWriter::from_config(config);

    match &cli.command {
        Commands::Parse(args) => {
            let smap = read_smap(&parser, &args.file)?;
            if args.json {
                serde_json::to_writer_pretty(&mut *stdout, &smap)?;
                writeln!(stdout)?;
            } else {
                stdout.write_all(writer.write(&smap).as_bytes())?;
            }
            Ok(true)
        }
        Commands::Check(args) => {
            let reports: Vec<(PathBuf, std::result::Result<(), String>)> = args
                .files
                .par_iter()
                .map(|path| (path.clone(), check_file(&parser, &writer, path)))
                .collect();
            let mut ok = true;
            for (path, report) in reports {
                match report {
                    Ok(()) => writeln!(stdout, "{}: ok", path.display())?,
                    Err(problem) => {
                        ok = false;
                        writeln!(stdout, "{}: {problem}", path.display())?;
                    }
                }
            }
            Ok(ok)
        }
        Commands::Resolve(args) => {
            let smap = read_smap(&parser, &args.file)?;
            for &line in &args.lines {
                match smap.resolve(line) {
                    Some(pos) => match &pos.path {
                        Some(path) => writeln!(stdout, "{line}: {pos} ({path})")?,
                        None => writeln!(stdout, "{line}: {pos}")?,
                    },
                    None => writeln!(stdout, "{line}: unmapped")?,
                }
            }
            Ok(true)
        }
        Commands::Retrace(args) => {
            let smap = read_smap(&parser, &args.file)?;
            let locator = FsLocator::new(args.source_roots.iter().cloned());
            let mut trace = String::new();
            stdin.read_to_string(&mut trace)?;
            let source_name = smap.source_name().to_string();
            let out = retrace_text(&trace, |frame| {
                (frame.file_name == source_name.as_str()).then_some((&smap, args.class_lines))
            });
            stdout.write_all(out.as_bytes())?;
            if !args.source_roots.is_empty() {
                report_missing_sources(&smap, &locator);
            }
            Ok(true)
        }
    }
}

fn check_file(
    parser: &SmapParser,
    writer: &SmapWriter,
    path: &Path,
) -> std::result::Result<(), String> {
    let text = std::fs::read_to_string(path).map_err(|e| SmapError::from(e).to_string())?;
    let smap = parser.parse(&text).map_err(|e| e.to_string())?;
    smap.validate().map_err(|e| e.to_string())?;
    let encoded = writer.write(&smap);
    if encoded != text {
        return Err("re-encoding differs from input".to_string());
    }
    let reparsed = parser.parse(&encoded).map_err(|e| e.to_string())?;
    if reparsed != smap {
        return Err("re-parsed structure differs".to_string());
    }
    Ok(())
}

fn report_missing_sources(smap: &Smap, locator: &impl SourceLocator) {
    for file in smap.file_mappings() {
        let Some(first) = file.mappings().first() else {
            continue;
        };
        let Some(pos) = file.position_of(first.dest_start()) else {
            continue;
        };
        if locator.locate(&pos).is_none() {
            tracing::warn!("no location available for {}", file.name());
        }
    }
}
