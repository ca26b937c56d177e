use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context as AnyhowContext};
use clap::{self, Args};

use droidex::backup::{self, ArchiveLocator};
use droidex::utils::ensure_dir_exists;
use droidex::{ArtifactCatalog, ArtifactType, Context, EvidenceLayout};

use crate::printer::print_json;

/// `foo.ab` becomes `foo.tar` next to it
fn default_archive_path(container: &Path) -> PathBuf {
    container.with_extension("tar")
}

#[derive(Args)]
pub struct ParseBackup {
    /// The `.ab` file written by `adb backup`
    container: PathBuf,

    /// `-o`, `--output`: Where to write the tar archive, defaults to the
    /// container path with a `.tar` extension
    #[arg(short, long, help = "Output archive path")]
    output: Option<PathBuf>,
}

impl ParseBackup {
    pub fn run(&self) -> anyhow::Result<()> {
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| default_archive_path(&self.container));
        if output == self.container {
            return Err(anyhow!(
                "refusing to overwrite {} with its own archive",
                self.container.display()
            ));
        }

        let parsed = backup::parse(&self.container, &output)
            .with_context(|| format!("parsing {}", self.container.display()))?;
        println!("{}", parsed.message());
        println!(
            "wrote {} bytes to {}",
            parsed.payload_len,
            parsed.archive_path.display()
        );
        Ok(())
    }
}

#[derive(Args)]
pub struct Extract {
    /// Tar archive from `parse-backup`
    archive: PathBuf,

    /// `-a`, `--artifact`: The artifact to pull out of the archive
    #[arg(short, long, help = "Artifact type to extract")]
    artifact: ArtifactType,
}

impl Extract {
    pub fn run(&self, ctx: &dyn Context) -> anyhow::Result<()> {
        let catalog = ArtifactCatalog::android_default();
        let spec = catalog
            .get(self.artifact)
            .ok_or_else(|| anyhow!("no catalog entry for {}", self.artifact))?;

        let layout = EvidenceLayout::new(ctx.get_evidence_dir());
        ensure_dir_exists(layout.root())
            .with_context(|| format!("creating {}", layout.root().display()))?;

        let locator = ArchiveLocator::open(&self.archive)
            .with_context(|| format!("opening {}", self.archive.display()))?;
        let file = locator
            .extract(spec, &layout)
            .with_context(|| format!("extracting {}", self.artifact))?;

        println!("{}", file.message);
        println!("{}", file.local_path.display());
        Ok(())
    }
}

#[derive(Args)]
pub struct Inspect {
    /// Tar archive from `parse-backup`
    archive: PathBuf,

    #[arg(
        short,
        long,
        help = "Print members as JSON",
        action = clap::ArgAction::SetTrue,
        default_value_t = false,
    )]
    json: bool,
}

impl Inspect {
    pub fn run(&self) -> anyhow::Result<()> {
        let locator = ArchiveLocator::open(&self.archive)
            .with_context(|| format!("opening {}", self.archive.display()))?;
        let members = locator.list_members();

        if self.json {
            return print_json(members);
        }

        for m in members {
            let kind = if m.is_file { "f" } else { "d" };
            println!("{} {:>12} {}", kind, m.size, m.name);
        }
        println!("{} members", members.len());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case("case/backup.ab", "case/backup.tar")]
    #[case("phone", "phone.tar")]
    fn test_default_archive_path(#[case] container: &str, #[case] expected: &str) {
        assert_eq!(default_archive_path(Path::new(container)), PathBuf::from(expected));
    }
}
