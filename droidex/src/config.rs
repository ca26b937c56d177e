use std::borrow::Cow;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;

use toml::{Table, Value};

use crate::utils::{path_must_str, read_file};

#[derive(Debug)]
pub enum Error {
    InvalidType,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::InvalidType => "InvalidType",
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub const CONFIG_FILE_NAME: &'static str = "droidex.toml";

pub struct ConfigMap<'c> {
    path: &'c Path,
    name: Option<Cow<'c, str>>,
    table: &'c Table,
}

/// Raw parsed configuration file
#[derive(Clone)]
pub struct Config {
    path: PathBuf,
    base: Table,
}

impl Config {
    pub fn parse(source: &Path) -> crate::Result<Self> {
        let as_str = read_file(source)?;
        Self::parse_str(source, &as_str)
    }

    pub fn parse_str(source: &Path, content: &str) -> crate::Result<Self> {
        let path = PathBuf::from(source);

        let base: Table = match toml::from_str(content) {
            Ok(v) => v,
            Err(e) => return Err(crate::Error::new_cfg(source, &e)),
        };
        Ok(Self { base, path })
    }

    pub fn get_map(&self) -> ConfigMap {
        ConfigMap {
            name: None,
            path: &self.path,
            table: &self.base,
        }
    }
}

/// Transport timeouts, every device interaction is bounded by one of these
#[derive(Clone, Debug, PartialEq)]
pub struct Timeouts {
    pub version: Duration,
    pub devices: Duration,
    pub root: Duration,
    /// Time given to adbd to restart after `adb root`
    pub root_settle: Duration,
    pub root_verify: Duration,
    pub pull: Duration,
    /// Spans the time a human needs to approve the prompt on the device
    pub backup: Duration,
    pub shell: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            version: Duration::from_secs(5),
            devices: Duration::from_secs(10),
            root: Duration::from_secs(10),
            root_settle: Duration::from_secs(2),
            root_verify: Duration::from_secs(5),
            pull: Duration::from_secs(30),
            backup: Duration::from_secs(120),
            shell: Duration::from_secs(20),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AdbConfig {
    pub executable: Option<String>,
    pub serial: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HarvestConfig {
    pub limit: Option<usize>,
    pub roots: Option<Vec<String>>,
}

/// Typed view of `droidex.toml`:
///
/// [adb]
/// executable = "..."
/// serial = "..."
///
/// [timeouts]
/// pull = 30
///
/// [harvest]
/// limit = 200
/// roots = ["/sdcard/DCIM"]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AcquisitionConfig {
    pub adb: AdbConfig,
    pub timeouts: Timeouts,
    pub harvest: HarvestConfig,
}

impl AcquisitionConfig {
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        parse_config(path, Self::from_map)
    }

    pub fn from_config(cfg: &Config) -> crate::Result<Self> {
        Self::from_map(&cfg.get_map())
    }

    pub fn from_map(map: &ConfigMap) -> crate::Result<Self> {
        let mut cfg = Self::default();

        if let Some(adb) = map.maybe_get_map_typecheck("adb")? {
            cfg.adb.executable = adb.maybe_get_str_typecheck("executable")?.map(String::from);
            cfg.adb.serial = adb.maybe_get_str_typecheck("serial")?.map(String::from);
        }

        if let Some(t) = map.maybe_get_map_typecheck("timeouts")? {
            let timeouts = &mut cfg.timeouts;
            let slots: [(&str, &mut Duration); 8] = [
                ("version", &mut timeouts.version),
                ("devices", &mut timeouts.devices),
                ("root", &mut timeouts.root),
                ("root-settle", &mut timeouts.root_settle),
                ("root-verify", &mut timeouts.root_verify),
                ("pull", &mut timeouts.pull),
                ("backup", &mut timeouts.backup),
                ("shell", &mut timeouts.shell),
            ];
            for (key, slot) in slots {
                if let Some(secs) = t.maybe_get_int_typecheck(key)? {
                    if secs < 0 {
                        return Err(t.invalid_key(key, "non-negative int"));
                    }
                    *slot = Duration::from_secs(secs as u64);
                }
            }
        }

        if let Some(h) = map.maybe_get_map_typecheck("harvest")? {
            if let Some(limit) = h.maybe_get_int_typecheck("limit")? {
                if limit < 0 {
                    return Err(h.invalid_key("limit", "non-negative int"));
                }
                cfg.harvest.limit = Some(limit as usize);
            }
            cfg.harvest.roots = h.maybe_get_str_list_typecheck("roots")?;
        }

        Ok(cfg)
    }
}

pub fn parse_config<R, F>(file: &Path, f: F) -> crate::Result<R>
where
    F: FnOnce(&ConfigMap) -> crate::Result<R>,
{
    let as_str = read_file(file)?;

    let table: Table = match toml::from_str(&as_str) {
        Ok(v) => v,
        Err(e) => return Err(crate::Error::new_cfg(file, &e)),
    };

    let base = ConfigMap {
        name: None,
        path: file,
        table: &table,
    };

    f(&base)
}

impl<'c> ConfigMap<'c> {
    fn get_full_path<'a>(&'a self) -> Option<&'a str> {
        self.name.as_ref().map(|it| it.as_ref())
    }

    fn key_path<'a>(&self, key: &'a str) -> Cow<'a, str> {
        match self.get_full_path() {
            None => Cow::Borrowed(key),
            Some(v) => Cow::Owned(format!("{}.{}", v, key)),
        }
    }

    /// Helper to create a crate::Error for an invalid key
    pub fn invalid_key(&self, key: &str, expected: &str) -> crate::Error {
        let path = self.key_path(key);
        crate::Error::InvalidConfig(
            path_must_str(self.path).into(),
            format!(
                "invalid value for key: {} (expected type: {})",
                path, expected
            ),
        )
    }

    pub fn has(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    fn get(&self, key: &str) -> Option<&'c Value> {
        self.table.get(key)
    }

    pub fn maybe_get_int(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            Some(v) => match v.as_integer() {
                Some(v) => Ok(Some(v)),
                None => Err(Error::InvalidType),
            },
            None => Ok(None),
        }
    }

    pub fn maybe_get_int_typecheck(&self, key: &str) -> crate::Result<Option<i64>> {
        self.maybe_get_int(key)
            .map_err(|_| self.invalid_key(key, "int"))
    }

    pub fn maybe_get_str(&self, key: &str) -> Result<Option<&'c str>> {
        match self.get(key) {
            Some(v) => match v.as_str() {
                Some(v) => Ok(Some(v)),
                None => Err(Error::InvalidType),
            },
            None => Ok(None),
        }
    }

    pub fn maybe_get_str_typecheck(&self, key: &str) -> crate::Result<Option<&'c str>> {
        self.maybe_get_str(key)
            .map_err(|_| self.invalid_key(key, "string"))
    }

    pub fn maybe_get_str_list(&self, key: &str) -> Result<Option<Vec<String>>> {
        let arr = match self.get(key) {
            Some(v) => v.as_array().ok_or(Error::InvalidType)?,
            None => return Ok(None),
        };
        let mut list = Vec::with_capacity(arr.len());
        for v in arr {
            list.push(v.as_str().ok_or(Error::InvalidType)?.to_string());
        }
        Ok(Some(list))
    }

    pub fn maybe_get_str_list_typecheck(&self, key: &str) -> crate::Result<Option<Vec<String>>> {
        self.maybe_get_str_list(key)
            .map_err(|_| self.invalid_key(key, "string array"))
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.table
            .get(key)
            .map(|it| it.as_bool().unwrap_or(default))
            .unwrap_or(default)
    }

    pub fn maybe_get_map(&'c self, key: &'c str) -> Result<Option<ConfigMap<'c>>> {
        match self.get(key) {
            Some(v) => match v.as_table() {
                Some(table) => {
                    let name = match &self.get_full_path() {
                        Some(parents) => Cow::Owned(format!("{parents}.{key}")),
                        None => Cow::Borrowed(key),
                    };
                    Ok(Some(Self {
                        name: Some(name),
                        path: self.path,
                        table,
                    }))
                }
                None => Err(Error::InvalidType),
            },
            None => Ok(None),
        }
    }

    pub fn maybe_get_map_typecheck(&'c self, key: &'c str) -> crate::Result<Option<ConfigMap<'c>>> {
        self.maybe_get_map(key)
            .map_err(|_| self.invalid_key(key, "table"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    fn parse(content: &str) -> crate::Result<AcquisitionConfig> {
        let cfg = Config::parse_str(Path::new("droidex.toml"), content)?;
        AcquisitionConfig::from_config(&cfg)
    }

    #[rstest]
    fn test_defaults_when_empty() {
        let cfg = parse("").expect("empty config is valid");
        assert_eq!(cfg, AcquisitionConfig::default());
        assert_eq!(cfg.timeouts.backup, Duration::from_secs(120));
        assert_eq!(cfg.timeouts.pull, Duration::from_secs(30));
        assert_eq!(cfg.timeouts.version, Duration::from_secs(5));
    }

    #[rstest]
    fn test_full_config() {
        let content = r#"
[adb]
executable = "/opt/platform-tools/adb"
serial = "emulator-5554"

[timeouts]
pull = 45
root-settle = 0

[harvest]
limit = 12
roots = ["/sdcard/DCIM", "/sdcard/Download"]
"#;
        let cfg = parse(content).expect("valid config");
        assert_eq!(cfg.adb.executable.as_deref(), Some("/opt/platform-tools/adb"));
        assert_eq!(cfg.adb.serial.as_deref(), Some("emulator-5554"));
        assert_eq!(cfg.timeouts.pull, Duration::from_secs(45));
        assert_eq!(cfg.timeouts.root_settle, Duration::ZERO);
        assert_eq!(cfg.timeouts.backup, Duration::from_secs(120));
        assert_eq!(cfg.harvest.limit, Some(12));
        assert_eq!(
            cfg.harvest.roots,
            Some(vec!["/sdcard/DCIM".to_string(), "/sdcard/Download".to_string()])
        );
    }

    #[rstest]
    fn test_invalid_types_name_the_key() {
        let err = parse("[timeouts]\npull = \"slow\"\n").expect_err("pull must be an int");
        let msg = err.to_string();
        assert!(msg.contains("timeouts.pull"), "message was {}", msg);

        let err = parse("adb = 3\n").expect_err("adb must be a table");
        assert!(err.to_string().contains("adb"));

        assert!(parse("[harvest]\nroots = [1, 2]\n").is_err());
        assert!(parse("[harvest]\nlimit = -1\n").is_err());
    }

    #[rstest]
    fn test_bad_toml() {
        assert!(matches!(
            parse("[adb"),
            Err(crate::Error::InvalidConfig(..))
        ));
    }
}
