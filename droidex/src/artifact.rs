use std::fmt::{self, Display};
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// One category of forensic data pulled off the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Sms,
    Calls,
    Chrome,
    Contacts,
    Wifi,
    Packages,
    SharedStorage,
    SystemDump,
    ContentQuery,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 9] = [
        Self::Sms,
        Self::Calls,
        Self::Chrome,
        Self::Contacts,
        Self::Wifi,
        Self::Packages,
        Self::SharedStorage,
        Self::SystemDump,
        Self::ContentQuery,
    ];

    /// The file artifacts acquired when nothing else is requested
    pub const DEFAULT_FILES: [ArtifactType; 3] = [Self::Sms, Self::Calls, Self::Chrome];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Calls => "calls",
            Self::Chrome => "chrome",
            Self::Contacts => "contacts",
            Self::Wifi => "wifi",
            Self::Packages => "packages",
            Self::SharedStorage => "shared_storage",
            Self::SystemDump => "system_dump",
            Self::ContentQuery => "content_query",
        }
    }

    /// Directory artifacts are produced by collectors rather than pulled as
    /// a single file
    pub fn is_directory(&self) -> bool {
        matches!(
            self,
            Self::SharedStorage | Self::SystemDump | Self::ContentQuery
        )
    }
}

impl Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown artifact type `{0}`")]
pub struct UnknownArtifact(pub String);

impl FromStr for ArtifactType {
    type Err = UnknownArtifact;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .find(|it| it.as_str() == lower)
            .copied()
            .ok_or_else(|| UnknownArtifact(s.into()))
    }
}

/// Where to find one artifact on the device and inside a backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSpec {
    pub kind: ArtifactType,
    /// File (or folder) name under the evidence root
    pub local_name: &'static str,
    /// Absolute device paths in priority order
    pub device_paths: &'static [&'static str],
    /// Package whose backup carries the artifact
    pub backup_package: Option<&'static str>,
    /// Member paths inside the inner backup archive in priority order
    pub backup_paths: &'static [&'static str],
    pub expected_tables: &'static [&'static str],
    /// Lower case substrings that tie an archive member to this artifact
    pub keywords: &'static [&'static str],
    /// Name fragment identifying an extensionless database (e.g. `History`)
    pub content_marker: Option<&'static str>,
}

impl ArtifactSpec {
    pub fn is_database(&self) -> bool {
        !self.expected_tables.is_empty()
    }

    pub fn expected_tables(&self) -> Vec<String> {
        self.expected_tables.iter().map(|it| it.to_string()).collect()
    }
}

static SMS: ArtifactSpec = ArtifactSpec {
    kind: ArtifactType::Sms,
    local_name: "mmssms.db",
    device_paths: &[
        "/data/data/com.android.providers.telephony/databases/mmssms.db",
        "/data/data/com.android.mms/databases/mmssms.db",
    ],
    backup_package: Some("com.android.providers.telephony"),
    backup_paths: &[
        "apps/com.android.providers.telephony/db/mmssms.db",
        "apps/com.android.providers.telephony/db/mmssms.db-journal",
        "apps/com.android.mms/db/mmssms.db",
    ],
    expected_tables: &["sms"],
    keywords: &["sms", "mms"],
    content_marker: None,
};

static CALLS: ArtifactSpec = ArtifactSpec {
    kind: ArtifactType::Calls,
    local_name: "calllog.db",
    device_paths: &[
        "/data/data/com.android.providers.contacts/databases/calllog.db",
        "/data/data/com.android.providers.contacts/databases/contacts2.db",
    ],
    backup_package: Some("com.android.providers.contacts"),
    backup_paths: &[
        "apps/com.android.providers.contacts/db/calllog.db",
        "apps/com.android.providers.contacts/db/contacts2.db",
    ],
    expected_tables: &["calls"],
    keywords: &["call"],
    content_marker: None,
};

static CHROME: ArtifactSpec = ArtifactSpec {
    kind: ArtifactType::Chrome,
    local_name: "History",
    device_paths: &[
        "/data/data/com.android.chrome/app_chrome/Default/History",
        "/data/data/com.chrome.browser/app_chrome/Default/History",
    ],
    backup_package: Some("com.android.chrome"),
    backup_paths: &[
        "apps/com.android.chrome/f/app_chrome/Default/History",
        "apps/com.android.chrome/f/app_chrome/Default/History-journal",
    ],
    expected_tables: &["urls"],
    keywords: &["chrome", "history"],
    content_marker: Some("History"),
};

static CONTACTS: ArtifactSpec = ArtifactSpec {
    kind: ArtifactType::Contacts,
    local_name: "contacts2.db",
    device_paths: &["/data/data/com.android.providers.contacts/databases/contacts2.db"],
    backup_package: Some("com.android.providers.contacts"),
    backup_paths: &["apps/com.android.providers.contacts/db/contacts2.db"],
    expected_tables: &["contacts", "raw_contacts", "data"],
    keywords: &["contact"],
    content_marker: None,
};

static WIFI: ArtifactSpec = ArtifactSpec {
    kind: ArtifactType::Wifi,
    local_name: "WifiConfigStore.xml",
    device_paths: &[
        "/data/misc/apexdata/com.android.wifi/WifiConfigStore.xml",
        "/data/misc/wifi/WifiConfigStore.xml",
    ],
    backup_package: None,
    backup_paths: &[],
    expected_tables: &[],
    keywords: &["wifi"],
    content_marker: None,
};

static PACKAGES: ArtifactSpec = ArtifactSpec {
    kind: ArtifactType::Packages,
    local_name: "packages.xml",
    device_paths: &["/data/system/packages.xml"],
    backup_package: None,
    backup_paths: &[],
    expected_tables: &[],
    keywords: &["packages"],
    content_marker: None,
};

const fn directory_spec(kind: ArtifactType, local_name: &'static str) -> ArtifactSpec {
    ArtifactSpec {
        kind,
        local_name,
        device_paths: &[],
        backup_package: None,
        backup_paths: &[],
        expected_tables: &[],
        keywords: &[],
        content_marker: None,
    }
}

static SHARED_STORAGE: ArtifactSpec = directory_spec(ArtifactType::SharedStorage, "shared_storage");
static SYSTEM_DUMP: ArtifactSpec = directory_spec(ArtifactType::SystemDump, "system_dump");
static CONTENT_QUERY: ArtifactSpec = directory_spec(ArtifactType::ContentQuery, "content_query");

/// Immutable table of artifact specs handed to an acquisition
#[derive(Debug, Clone)]
pub struct ArtifactCatalog {
    specs: Vec<ArtifactSpec>,
}

impl ArtifactCatalog {
    pub fn new(specs: Vec<ArtifactSpec>) -> Self {
        Self { specs }
    }

    /// Known locations on stock Android and AOSP derived builds
    pub fn android_default() -> Self {
        Self::new(vec![
            SMS.clone(),
            CALLS.clone(),
            CHROME.clone(),
            CONTACTS.clone(),
            WIFI.clone(),
            PACKAGES.clone(),
            SHARED_STORAGE.clone(),
            SYSTEM_DUMP.clone(),
            CONTENT_QUERY.clone(),
        ])
    }

    pub fn get(&self, kind: ArtifactType) -> Option<&ArtifactSpec> {
        self.specs.iter().find(|it| it.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArtifactSpec> {
        self.specs.iter()
    }

    /// Packages to back up for the given artifacts, in request order with
    /// duplicates removed
    pub fn backup_packages(&self, kinds: &[ArtifactType]) -> Vec<&'static str> {
        kinds
            .iter()
            .filter_map(|k| self.get(*k))
            .filter_map(|s| s.backup_package)
            .unique()
            .collect()
    }
}

impl Default for ArtifactCatalog {
    fn default() -> Self {
        Self::android_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case("sms", ArtifactType::Sms)]
    #[case("SMS", ArtifactType::Sms)]
    #[case("shared_storage", ArtifactType::SharedStorage)]
    #[case(" content_query ", ArtifactType::ContentQuery)]
    fn test_from_str(#[case] input: &str, #[case] expected: ArtifactType) {
        assert_eq!(input.parse::<ArtifactType>().expect("valid"), expected);
    }

    #[rstest]
    fn test_round_trip_names() {
        for kind in ArtifactType::ALL {
            assert_eq!(kind.as_str().parse::<ArtifactType>().expect("valid"), kind);
            assert_eq!(
                serde_json::to_string(&kind).expect("serialize"),
                format!("\"{}\"", kind.as_str())
            );
        }
        assert!("mms".parse::<ArtifactType>().is_err());
    }

    #[rstest]
    fn test_catalog_complete() {
        let cat = ArtifactCatalog::android_default();
        for kind in ArtifactType::ALL {
            let spec = cat.get(kind).expect("every type is in the default catalog");
            if kind.is_directory() {
                assert!(spec.device_paths.is_empty());
            } else {
                assert!(!spec.device_paths.is_empty());
            }
        }
        assert!(cat.get(ArtifactType::Sms).unwrap().is_database());
        assert!(!cat.get(ArtifactType::Wifi).unwrap().is_database());
    }

    #[rstest]
    fn test_backup_packages_dedup() {
        let cat = ArtifactCatalog::android_default();
        let pkgs = cat.backup_packages(&[
            ArtifactType::Sms,
            ArtifactType::Calls,
            ArtifactType::Contacts,
            ArtifactType::Wifi,
            ArtifactType::Chrome,
        ]);
        assert_eq!(
            pkgs,
            vec![
                "com.android.providers.telephony",
                "com.android.providers.contacts",
                "com.android.chrome",
            ]
        );
    }
}
