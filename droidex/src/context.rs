use blanket::blanket;
use once_cell::sync::OnceCell;
use std::env;
use std::ops::DerefMut;
use std::path::PathBuf;
use std::sync::Mutex;

use directories::BaseDirs;
use which::{which, which_in};

use crate::config::{AcquisitionConfig, CONFIG_FILE_NAME};
use crate::Error;

pub const DEFAULT_EVIDENCE_DIR: &'static str = "evidence";

#[derive(Clone)]
struct CachedBin {
    name: String,
    path: String,
}

fn wrapped_which(bin: &str) -> Option<PathBuf> {
    if let Ok(search_path) = env::var("DROIDEX_PATH") {
        let cwd = env::current_dir().ok()?;
        return which_in(bin, Some(&search_path), &cwd).ok();
    }
    which(bin).ok()
}

#[inline(always)]
fn find_program(prog: &str) -> Option<String> {
    wrapped_which(prog).map(|it| it.to_string_lossy().into())
}

/// Context is the single place that knows about env vars, binaries, the
/// evidence directory and the acquisition config.
///
/// Most methods on this trait have a default implementation that is perfectly
/// safe to leave unchanged.
#[blanket(derive(Ref, Box))]
pub trait Context: Send + Sync {
    /// Root of the evidence folder for this case
    fn get_evidence_dir(&self) -> PathBuf;

    /// The parsed `droidex.toml`, or the defaults if there isn't one
    fn get_config(&self) -> crate::Result<&AcquisitionConfig>;

    fn maybe_get_env(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    fn maybe_get_bin(&self, bin: &str) -> Option<String> {
        find_program(bin)
    }

    fn has_bin(&self, bin: &str) -> bool {
        self.maybe_get_bin(bin).is_some()
    }

    fn get_bin(&self, bin: &str) -> crate::Result<String> {
        self.maybe_get_bin(bin)
            .ok_or_else(|| Error::MissingBin(bin.into()))
    }

    fn get_env(&self, key: &str) -> crate::Result<String> {
        self.maybe_get_env(key)
            .ok_or_else(|| Error::MissingEnv(key.into()))
    }

    fn get_evidence_config_file(&self) -> PathBuf {
        self.get_evidence_dir().join(CONFIG_FILE_NAME)
    }

    fn get_user_config_dir(&self) -> crate::Result<PathBuf> {
        let bd = BaseDirs::new().ok_or(Error::NoBaseDirs)?;
        Ok(bd.config_dir().join("droidex"))
    }
}

pub struct DefaultContext {
    evidence_dir: PathBuf,
    bin_cache: Mutex<Vec<CachedBin>>,
    config: OnceCell<AcquisitionConfig>,
}

impl DefaultContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evidence_dir(evidence_dir: PathBuf) -> Self {
        Self {
            evidence_dir,
            bin_cache: Mutex::new(Vec::new()),
            config: OnceCell::new(),
        }
    }

    fn load_config(&self) -> crate::Result<AcquisitionConfig> {
        let case_file = self.get_evidence_config_file();
        if case_file.exists() {
            log::debug!("using config {:?}", case_file);
            return AcquisitionConfig::from_file(&case_file);
        }

        if let Ok(dir) = self.get_user_config_dir() {
            let user_file = dir.join(CONFIG_FILE_NAME);
            if user_file.exists() {
                log::debug!("using config {:?}", user_file);
                return AcquisitionConfig::from_file(&user_file);
            }
        }

        Ok(AcquisitionConfig::default())
    }
}

impl Default for DefaultContext {
    fn default() -> Self {
        let evidence_dir = env::var("DROIDEX_EVIDENCE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_EVIDENCE_DIR));
        Self::with_evidence_dir(evidence_dir)
    }
}

impl Context for DefaultContext {
    fn get_evidence_dir(&self) -> PathBuf {
        self.evidence_dir.clone()
    }

    fn get_config(&self) -> crate::Result<&AcquisitionConfig> {
        self.config.get_or_try_init(|| self.load_config())
    }

    fn maybe_get_bin(&self, prog: &str) -> Option<String> {
        let mut cache_guard = self.bin_cache.lock().expect("failed to lock");
        let cache = cache_guard.deref_mut();
        if let Some(val) = cache.iter().find(|it| it.name == prog) {
            return Some(val.path.clone());
        }

        let found = find_program(prog)?;

        cache.push(CachedBin {
            name: prog.into(),
            path: found.clone(),
        });

        Some(found)
    }
}
