use std::path::PathBuf;

use anyhow::{anyhow, bail, Context as AnyhowContext};
use clap::{self, Args};

use droidex::verify::{try_hash_file, verify, verify_existence};
use droidex::{ArtifactCatalog, ArtifactType};

use crate::printer::print_json;

#[derive(Args)]
pub struct Verify {
    /// Database (or any file / folder for an existence check)
    file: PathBuf,

    /// `-t`, `--tables`: Comma separated tables that must exist
    #[arg(short, long, value_delimiter = ',', help = "Expected tables")]
    tables: Vec<String>,

    /// `-a`, `--artifact`: Take the expected tables from an artifact type
    #[arg(
        short,
        long,
        conflicts_with = "tables",
        help = "Use the expected tables of this artifact"
    )]
    artifact: Option<ArtifactType>,
}

impl Verify {
    fn expected_tables(&self) -> anyhow::Result<Vec<String>> {
        let kind = match self.artifact {
            None => return Ok(self.tables.clone()),
            Some(v) => v,
        };
        let catalog = ArtifactCatalog::android_default();
        let spec = catalog
            .get(kind)
            .ok_or_else(|| anyhow!("no catalog entry for {}", kind))?;
        Ok(spec.expected_tables())
    }

    pub fn run(&self) -> anyhow::Result<()> {
        let expected = self.expected_tables()?;

        let record = if expected.is_empty() {
            verify_existence(&self.file)
        } else {
            verify(&self.file, &expected)
                .with_context(|| format!("verifying {}", self.file.display()))?
        };

        print_json(&record)?;

        if !record.is_valid() {
            bail!("{} failed verification", self.file.display());
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct Hash {
    /// Files to hash
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

impl Hash {
    pub fn run(&self) -> anyhow::Result<()> {
        let mut failed = 0;
        for f in &self.files {
            match try_hash_file(f) {
                Ok(digest) => println!("{}  {}", digest, f.display()),
                Err(e) => {
                    failed += 1;
                    eprintln!("{}: {}", f.display(), e);
                }
            }
        }
        if failed > 0 {
            bail!("failed to hash {} file(s)", failed);
        }
        Ok(())
    }
}
