#![allow(unused)]
use std::collections::HashMap;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::env;

use anyhow::Context as AnyhowContext;
use rand::Rng;
use rstest::fixture;

use crate::config::AcquisitionConfig;
use crate::utils::ensure_dir_exists;
use crate::Context;

#[fixture]
pub fn tmp_context() -> TestContext {
    TestContext::default()
}

pub struct TestContext {
    base_dir: PathBuf,
    env: HashMap<String, String>,
    bins: HashMap<String, String>,
    config: AcquisitionConfig,
}

pub enum TreeEntry<'a> {
    Dir,
    TxtFile(&'a str),
    BinFile(&'a [u8]),
}

impl TestContext {
    pub fn set_env<K: AsRef<str>, V: AsRef<str>>(&mut self, key: K, value: V) -> &mut Self {
        self.env.insert(key.as_ref().into(), value.as_ref().into());
        self
    }

    pub fn set_bin<K: AsRef<str>, V: AsRef<str>>(&mut self, key: K, bin: V) -> &mut Self {
        self.bins.insert(key.as_ref().into(), bin.as_ref().into());
        self
    }

    pub fn config_mut(&mut self) -> &mut AcquisitionConfig {
        &mut self.config
    }

    /// Create a collection of files with the given names and contents
    ///
    /// The tree is rooted at the base directory
    pub fn create_tree(&self, tree: &[(&str, TreeEntry)]) -> anyhow::Result<()> {
        for (relative, content) in tree {
            let file = self.base_dir.join(relative);
            if let Some(parent) = file.parent() {
                if !parent.exists() {
                    create_dir_all(&parent)
                        .with_context(|| format!("creating parent dirs for {relative}"))?;
                }
            }

            match content {
                TreeEntry::Dir => {
                    fs::create_dir(&file).with_context(|| format!("creating dir {relative}"))?
                }
                TreeEntry::BinFile(content) => fs::write(&file, content)
                    .with_context(|| format!("writing content to {relative}"))?,
                TreeEntry::TxtFile(content) => fs::write(&file, content)
                    .with_context(|| format!("writing content to {relative}"))?,
            }
        }
        Ok(())
    }

    pub fn to_abs<P: AsRef<Path> + ?Sized>(&self, path: &P) -> PathBuf {
        self.base_dir.join(path)
    }

    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn get_temp_path(&self, suffix: Option<&str>) -> PathBuf {
        let mut rng = rand::thread_rng();
        let rand_name: u64 = rng.gen();
        let name = match suffix {
            Some(v) => format!("{}.{}", rand_name, v),
            None => rand_name.to_string(),
        };
        self.base_dir.join(name)
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let td = &self.base_dir;
        if td.exists() {
            fs::remove_dir_all(td).expect("failed to clear test dir");
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        let mut rng = rand::thread_rng();
        let rand_name: u64 = rng.gen();
        let td = env::temp_dir().join(format!("droidex_test_base_{}", rand_name));

        if td.exists() {
            fs::remove_dir_all(&td).expect("failed to clear test dir");
        }

        ensure_dir_exists(&td.join("evidence")).expect("failed to create default test dir");

        let mut env = HashMap::new();
        env.insert("ANDROID_SERIAL".into(), "TESTSERIAL".into());

        // Nothing in unit tests should wait on a real device
        let mut config = AcquisitionConfig::default();
        config.timeouts.root_settle = Duration::ZERO;

        Self {
            base_dir: td,
            env,
            bins: HashMap::new(),
            config,
        }
    }
}

impl Context for TestContext {
    fn get_evidence_dir(&self) -> PathBuf {
        self.base_dir.join("evidence")
    }

    fn get_config(&self) -> crate::Result<&AcquisitionConfig> {
        Ok(&self.config)
    }

    fn maybe_get_env(&self, key: &str) -> Option<String> {
        self.env.get(key).map(String::from)
    }

    fn maybe_get_bin(&self, bin: &str) -> Option<String> {
        self.bins.get(bin).map(String::from)
    }

    fn get_user_config_dir(&self) -> crate::Result<PathBuf> {
        Ok(self.base_dir.join("config"))
    }
}
