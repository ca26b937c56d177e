use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Context as AnyhowContext;
use clap::{self, Args};

use droidex::content_row::{parse_content_query_dir, parse_content_rows};

use crate::printer::print_json;

#[derive(Args)]
pub struct Rows {
    /// A saved `content query` output, or a folder of them
    path: PathBuf,
}

impl Rows {
    pub fn run(&self) -> anyhow::Result<()> {
        if self.path.is_dir() {
            let by_query: BTreeMap<String, _> = parse_content_query_dir(&self.path)
                .with_context(|| format!("reading {}", self.path.display()))?
                .into_iter()
                .collect();
            log::info!("parsed {} query outputs", by_query.len());
            return print_json(&by_query);
        }

        let bytes =
            fs::read(&self.path).with_context(|| format!("reading {}", self.path.display()))?;
        let rows = parse_content_rows(&String::from_utf8_lossy(&bytes));
        print_json(&rows)
    }
}
