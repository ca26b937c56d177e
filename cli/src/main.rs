use std::borrow::Cow;
use std::path::PathBuf;

use anyhow::Context as AnyhowContext;
use clap::{Parser, Subcommand};
use flexi_logger::{FileSpec, LevelFilter, LogSpecification, Logger, LoggerHandle, WriteMode};

use droidex::utils::ensure_dir_exists;
use droidex::{Context, DefaultContext};

mod printer;

mod check;
use check::Check;

mod acquire;
use acquire::Acquire;

mod backup;
use backup::{Extract, Inspect, ParseBackup};

mod verify;
use verify::{Hash, Verify};

mod rows;
use rows::Rows;

const SIMPLE_VERSION_STRING: &'static str =
    include!(concat!(env!("OUT_DIR"), "/simple_version_string"));
const VERSION_STRING: &'static str = include!(concat!(env!("OUT_DIR"), "/version_string"));

const LOG_FILE_NAME: &'static str = "droidex.log";

#[derive(Parser)]
#[command(name = "droidex")]
#[command(version(SIMPLE_VERSION_STRING))]
#[command(long_version(VERSION_STRING))]
struct Cli {
    /// `-e`, `--log-stderr`: Flag value, when enabled will cause logs to be output to `stderr`
    /// instead of a log file. Disabled by default (logs go to a file by default)
    #[arg(short = 'e', long, help = "Log to stderr instead of a file", action = clap::ArgAction::SetTrue, default_value_t = false)]
    log_stderr: bool,

    /// `-f`, `--log-file`: Path to desired log output file location. Optional, defaults to
    /// `<evidence dir>/droidex.log`
    #[arg(short = 'f', long, help = "Send log output to the given file")]
    log_file: Option<PathBuf>,

    /// `-s`, `--log-spec`: Raw [flexi_logger](https://docs.rs/flexi_logger/latest/flexi_logger/struct.LogSpecification.html) spec
    #[arg(short = 's', long, help = "Log spec for flexi_logger")]
    log_spec: Option<String>,

    /// `-l`, `--log-level`: Set the desired log verbosity. Defaults to 0, all values are listed
    /// below:
    ///
    /// | Value | Log Level |
    /// | ----- | --------- |
    /// | **0** | **Warn** |
    /// | 1 | Info |
    /// | 2 | Debug |
    /// | 3 | Trace |
    #[arg(
        short = 'l',
        long,
        help = "Set the log level, 0 = warn, 1 = info, etc",
        long_help = None,
        default_value_t = 0
    )]
    log_level: u8,

    /// `-d`, `--evidence-dir`: Case folder everything acquired is written to. Defaults to
    /// `$DROIDEX_EVIDENCE_DIR` or `./evidence`
    #[arg(short = 'd', long, help = "Evidence folder for this case")]
    evidence_dir: Option<PathBuf>,

    /// The command being called. See [Commands] for the implemented options
    #[command(subcommand)]
    command: Commands,
}

/// The currently implemented commands
#[derive(Subcommand)]
enum Commands {
    /// Display the full version string and exit
    #[command()]
    Version,

    /// Check that adb works and a device is ready for acquisition
    #[command()]
    Check(Check),

    /// Acquire artifacts from the connected device
    ///
    /// The direct strategy needs root and pulls databases from their device
    /// paths, the backup strategy goes through `adb backup` and also collects
    /// shell dumps, content provider queries and shared storage files.
    #[command()]
    Acquire(Acquire),

    /// Decode an Android backup (`.ab`) file into its tar archive
    #[command()]
    ParseBackup(ParseBackup),

    /// Extract one artifact from a decoded backup archive
    #[command()]
    Extract(Extract),

    /// List the members of a decoded backup archive
    #[command()]
    Inspect(Inspect),

    /// Open a database read only and report its tables and row counts
    #[command()]
    Verify(Verify),

    /// Print SHA-256 digests of files
    #[command()]
    Hash(Hash),

    /// Parse `content query` output into rows
    #[command()]
    Rows(Rows),
}

impl Cli {
    fn configure_loggers(&self, ctx: &DefaultContext) -> anyhow::Result<LoggerHandle> {
        let log_spec = match &self.log_spec {
            Some(s) => {
                LogSpecification::parse(s).with_context(|| format!("parsing log spec {}", s))?
            }
            None => {
                if self.log_level > 0 {
                    let lvl = if self.log_level == 1 {
                        LevelFilter::Info
                    } else if self.log_level == 2 {
                        LevelFilter::Debug
                    } else {
                        LevelFilter::Trace
                    };
                    LogSpecification::builder().module("droidex", lvl).build()
                } else {
                    LogSpecification::env().with_context(|| "getting log spec from env")?
                }
            }
        };

        let mut logger = Logger::with(log_spec);

        if !self.log_stderr {
            let path = match &self.log_file {
                Some(v) => {
                    if v.is_absolute() {
                        Some(Cow::Borrowed(v))
                    } else {
                        let full_path = std::env::current_dir()?.join(v);
                        Some(Cow::Owned(full_path))
                    }
                }
                None => {
                    let dir = ctx.get_evidence_dir();
                    ensure_dir_exists(&dir)
                        .ok()
                        .map(|_| Cow::Owned(dir.join(LOG_FILE_NAME)))
                }
            };

            if let Some(p) = &path {
                logger = logger
                    .log_to_file(
                        FileSpec::try_from(p.as_ref()).with_context(|| "creating filespec")?,
                    )
                    .append()
                    .write_mode(WriteMode::BufferAndFlush);
            }
        }

        Ok(logger.start().with_context(|| "starting logger")?)
    }

    fn context(&self) -> DefaultContext {
        match &self.evidence_dir {
            Some(dir) => DefaultContext::with_evidence_dir(dir.clone()),
            None => DefaultContext::default(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = &cli.command {
        println!("{}", VERSION_STRING);
        return Ok(());
    }

    let ctx = cli.context();

    let log_handle = cli.configure_loggers(&ctx)?;

    let res = match cli.command {
        Commands::Check(c) => c.run(&ctx),
        Commands::Acquire(c) => c.run(&ctx),
        Commands::ParseBackup(c) => c.run(),
        Commands::Extract(c) => c.run(&ctx),
        Commands::Inspect(c) => c.run(),
        Commands::Verify(c) => c.run(),
        Commands::Hash(c) => c.run(),
        Commands::Rows(c) => c.run(),

        Commands::Version => panic!("unreachable"),
    };

    log_handle.flush();
    res
}
