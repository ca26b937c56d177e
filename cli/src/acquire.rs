use anyhow::{bail, Context as AnyhowContext};
use clap::{self, Args, ValueEnum};

use droidex::progress::{EventMonitor, ProgressEvent};
use droidex::{
    Acquisition, AcquisitionOptions, ArtifactCatalog, ArtifactType, Context, EvidenceLayout,
    ExecAdb, Strategy,
};

use crate::printer::{print_json, print_remediation, separator};

struct PrintMonitor {
    quiet: bool,
}

fn progress_line(event: &ProgressEvent) -> String {
    format!("[{:>3}%] {}", event.percent, event.message)
}

impl EventMonitor<ProgressEvent> for PrintMonitor {
    fn on_event(&self, event: ProgressEvent) {
        if self.quiet {
            return;
        }
        eprintln!("{}", progress_line(&event));
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// Root required, pull databases from their device paths
    Direct,
    /// No root, `adb backup` plus shell collection
    Backup,
}

impl From<StrategyArg> for Strategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Direct => Strategy::Direct,
            StrategyArg::Backup => Strategy::Backup,
        }
    }
}

/// Struct to hold the acquire command options
#[derive(Args)]
pub struct Acquire {
    /// `-S`, `--strategy`: How to get the artifacts off the device
    #[arg(short = 'S', long, value_enum, default_value_t = StrategyArg::Direct)]
    strategy: StrategyArg,

    /// `-a`, `--artifacts`: Comma separated artifact types. Defaults to sms, calls and chrome
    #[arg(
        short,
        long,
        value_delimiter = ',',
        help = "Artifacts to acquire (sms,calls,chrome,contacts,wifi,packages,shared_storage,system_dump,content_query)"
    )]
    artifacts: Vec<ArtifactType>,

    #[arg(
        long,
        help = "Don't collect shell dumps, content queries or shared storage with the backup strategy",
        action = clap::ArgAction::SetTrue,
        default_value_t = false,
    )]
    no_supplemental: bool,

    /// Overrides `harvest.limit` from the config
    #[arg(long, help = "Maximum number of shared storage files to pull")]
    harvest_limit: Option<usize>,

    /// `-q`, `--quiet`: Flag to disable progress and summary output. Optional
    #[arg(
        short,
        long,
        help = "Don't print progress or the summary",
        action = clap::ArgAction::SetTrue,
        default_value_t = false,
    )]
    quiet: bool,
}

impl Acquire {
    fn options(&self, ctx: &dyn Context) -> anyhow::Result<AcquisitionOptions> {
        let mut options =
            AcquisitionOptions::from_context(ctx).with_context(|| "loading config")?;
        if !self.artifacts.is_empty() {
            options = options.with_artifacts(self.artifacts.clone());
        }
        if let Some(limit) = self.harvest_limit {
            options.harvest_limit = limit;
        }
        options.collect_supplemental = !self.no_supplemental;
        Ok(options)
    }

    pub fn run(&self, ctx: &dyn Context) -> anyhow::Result<()> {
        let adb = ExecAdb::new(ctx).with_context(|| "configuring adb")?;
        let options = self.options(ctx)?;
        let catalog = ArtifactCatalog::android_default();
        let layout = EvidenceLayout::new(ctx.get_evidence_dir());
        let monitor = PrintMonitor { quiet: self.quiet };

        let strategy = Strategy::from(self.strategy);
        log::info!(
            "starting {} acquisition of {:?} into {:?}",
            strategy,
            options.artifacts,
            layout.root()
        );

        let acq = Acquisition::new(&adb, &catalog, layout, options).with_monitor(&monitor);
        let result = acq.run(strategy);

        let result_path = acq.layout().result_path();
        result
            .write_json(&result_path)
            .with_context(|| format!("writing {}", result_path.display()))?;

        if !self.quiet {
            eprintln!("{}", separator(60));
            eprint!("{}", result.summary());
            for issue in result.errors.iter().chain(result.warnings.iter()) {
                print_remediation(format!("{}:", issue.step), &issue.remediation);
            }
            eprintln!("{}", separator(60));
            eprintln!("result written to {}", result_path.display());
        }

        print_json(&result)?;

        if !result.success {
            bail!("nothing was acquired");
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;
    use rstest::*;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        acquire: Acquire,
    }

    #[rstest]
    fn test_artifact_list() {
        let w = Wrapper::try_parse_from(["droidex", "-S", "backup", "-a", "sms,Chrome,system_dump"])
            .expect("valid args");
        assert!(matches!(w.acquire.strategy, StrategyArg::Backup));
        assert_eq!(
            w.acquire.artifacts,
            vec![ArtifactType::Sms, ArtifactType::Chrome, ArtifactType::SystemDump]
        );
        assert!(!w.acquire.no_supplemental);
    }

    #[rstest]
    fn test_unknown_artifact_rejected() {
        assert!(Wrapper::try_parse_from(["droidex", "-a", "sms,photos"]).is_err());
    }

    #[rstest]
    fn test_progress_line() {
        let evt = ProgressEvent {
            step: 4.0,
            message: String::from("Extracting sms..."),
            percent: 7,
        };
        assert_eq!(progress_line(&evt), "[  7%] Extracting sms...");
    }
}
