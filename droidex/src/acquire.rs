use std::fmt::{self, Display};
use std::path::Path;
use std::time::Duration;

use crate::adb::Adb;
use crate::artifact::{ArtifactCatalog, ArtifactSpec, ArtifactType};
use crate::backup::{self, ArchiveLocator};
use crate::collect::{collect_content_queries, collect_system_dump, CollectionReport};
use crate::config::AcquisitionConfig;
use crate::content_row::parse_content_query_dir;
use crate::errors::ErrorKind;
use crate::evidence::EvidenceLayout;
use crate::harvest::{harvest, DEFAULT_HARVEST_LIMIT, DEFAULT_HARVEST_ROOTS};
use crate::privilege;
use crate::progress::{EventMonitor, NoopMonitor, ProgressEvent, ProgressTracker};
use crate::puller::pull_artifact;
use crate::remediation;
use crate::result::{AcquiredFile, AcquisitionResult, Issue, Provenance, Strategy, VerificationRecord};
use crate::transport;
use crate::utils::file_size;
use crate::verify::{hash_file, is_hash_error, verify, verify_existence};
use crate::Context;

static NOOP_MONITOR: NoopMonitor = NoopMonitor;

/// Supplemental folders the backup strategy fills in addition to the
/// requested artifacts
const SUPPLEMENTAL: [ArtifactType; 3] = [
    ArtifactType::SystemDump,
    ArtifactType::ContentQuery,
    ArtifactType::SharedStorage,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    TransportCheck,
    DeviceCheck,
    PrivilegeCheck,
    PerArtifactAcquisition,
    SupplementalCollection,
    Hashing,
    Done,
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::TransportCheck => "transport check",
            Self::DeviceCheck => "device check",
            Self::PrivilegeCheck => "privilege check",
            Self::PerArtifactAcquisition => "per artifact acquisition",
            Self::SupplementalCollection => "supplemental collection",
            Self::Hashing => "hashing",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionOptions {
    /// Requested artifacts, in acquisition order
    pub artifacts: Vec<ArtifactType>,
    pub settle_delay: Duration,
    pub root_verify_timeout: Duration,
    pub harvest_roots: Vec<String>,
    pub harvest_limit: usize,
    pub shell_timeout: Duration,
    /// Run the shell dump, content queries and harvest in the backup strategy
    pub collect_supplemental: bool,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self::from_config(&AcquisitionConfig::default())
    }
}

impl AcquisitionOptions {
    pub fn from_config(cfg: &AcquisitionConfig) -> Self {
        Self {
            artifacts: ArtifactType::DEFAULT_FILES.to_vec(),
            settle_delay: cfg.timeouts.root_settle,
            root_verify_timeout: cfg.timeouts.root_verify,
            harvest_roots: cfg.harvest.roots.clone().unwrap_or_else(|| {
                DEFAULT_HARVEST_ROOTS.iter().map(|it| it.to_string()).collect()
            }),
            harvest_limit: cfg.harvest.limit.unwrap_or(DEFAULT_HARVEST_LIMIT),
            shell_timeout: cfg.timeouts.shell,
            collect_supplemental: true,
        }
    }

    pub fn from_context(ctx: &dyn Context) -> crate::Result<Self> {
        Ok(Self::from_config(ctx.get_config()?))
    }

    pub fn with_artifacts(mut self, artifacts: Vec<ArtifactType>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

fn step_name(kind: ArtifactType, what: &str) -> String {
    format!("{} {}", kind.as_str().to_uppercase(), what)
}

fn spread(start: u8, end: u8, idx: usize, total: usize) -> u8 {
    if total == 0 {
        return start;
    }
    let span = (end - start) as usize;
    start + (span * idx / total) as u8
}

/// A single acquisition run against one device.
///
/// Only a missing transport or device ends a run early, every other failure
/// is recorded on the result and the run moves on to the next step.
pub struct Acquisition<'a> {
    adb: &'a dyn Adb,
    catalog: &'a ArtifactCatalog,
    layout: EvidenceLayout,
    options: AcquisitionOptions,
    monitor: &'a dyn EventMonitor<ProgressEvent>,
}

impl<'a> Acquisition<'a> {
    pub fn new(
        adb: &'a dyn Adb,
        catalog: &'a ArtifactCatalog,
        layout: EvidenceLayout,
        options: AcquisitionOptions,
    ) -> Self {
        Self {
            adb,
            catalog,
            layout,
            options,
            monitor: &NOOP_MONITOR,
        }
    }

    pub fn with_monitor(mut self, monitor: &'a dyn EventMonitor<ProgressEvent>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn layout(&self) -> &EvidenceLayout {
        &self.layout
    }

    pub fn run(&self, strategy: Strategy) -> AcquisitionResult {
        match strategy {
            Strategy::Direct => self.run_direct(),
            Strategy::Backup => self.run_backup(),
        }
    }

    /// Privileged pulls from the known device paths
    pub fn run_direct(&self) -> AcquisitionResult {
        let mut result = AcquisitionResult::new(Strategy::Direct);
        let mut progress = ProgressTracker::new(self.monitor);

        if !self.preflight(&mut result, &mut progress, [10, 20]) {
            result.finish();
            return result;
        }

        self.enter(Stage::PrivilegeCheck);
        progress.update(3.0, "Attempting to enable root access...", 30);
        let status = privilege::negotiate(
            self.adb,
            self.options.settle_delay,
            self.options.root_verify_timeout,
        );
        result.root_available = Some(status.elevated);
        if !status.elevated {
            result.warn(
                Issue::new("Root Access", status.message)
                    .with_kind(ErrorKind::PrivilegeUnavailable)
                    .with_remediation(remediation::root_unavailable()),
            );
        }

        self.enter(Stage::PerArtifactAcquisition);
        let (files, dirs) = self.partition();
        for (idx, spec) in files.iter().enumerate() {
            let step = 4.0 + idx as f32;
            progress.update(
                step,
                format!("Extracting {}...", spec.kind),
                spread(30, 75, idx, files.len()),
            );

            match pull_artifact(self.adb, spec, &self.layout) {
                Ok(file) => {
                    progress.update(
                        step + 0.5,
                        format!("Verifying {} data...", spec.kind),
                        spread(30, 75, idx, files.len()) + 2,
                    );
                    self.accept(&mut result, spec, file);
                }
                Err(e) if !status.elevated => {
                    log::debug!("direct pull of {} failed without root: {}", spec.kind, e);
                    result.warn(
                        Issue::new(
                            step_name(spec.kind, "Extraction"),
                            format!(
                                "Root extraction failed ({}). Try the backup strategy for non-rooted devices.",
                                e
                            ),
                        )
                        .with_kind(e.kind()),
                    );
                }
                Err(e) => {
                    result.error(
                        Issue::new(step_name(spec.kind, "Extraction"), e.to_string())
                            .with_kind(e.kind())
                            .with_remediation(remediation::extraction(spec.kind.as_str())),
                    );
                }
            }
        }

        if !dirs.is_empty() {
            self.enter(Stage::SupplementalCollection);
            progress.update(7.0, "Collecting supplemental data...", 78);
            for kind in dirs {
                self.collect_directory(&mut result, kind);
            }
        }

        self.finish(&mut result, &mut progress, 8.0);
        result
    }

    /// One combined `adb backup`, then per artifact extraction from the
    /// archive plus the shell collectors
    pub fn run_backup(&self) -> AcquisitionResult {
        let mut result = AcquisitionResult::new(Strategy::Backup);
        let mut progress = ProgressTracker::new(self.monitor);

        if !self.preflight(&mut result, &mut progress, [5, 10]) {
            result.finish();
            return result;
        }

        self.enter(Stage::PerArtifactAcquisition);
        let (files, mut dirs) = self.partition();

        let mut from_backup = Vec::with_capacity(files.len());
        for spec in files {
            if spec.backup_package.is_some() {
                from_backup.push(spec);
            } else {
                result.warn(Issue::new(
                    step_name(spec.kind, "Backup"),
                    format!("{} is not part of any app backup, skipping", spec.kind),
                ));
            }
        }

        let kinds: Vec<ArtifactType> = from_backup.iter().map(|it| it.kind).collect();
        let packages = self.catalog.backup_packages(&kinds);

        let locator = if packages.is_empty() {
            None
        } else {
            progress.update(
                3.0,
                "Creating backup, approve it on the device screen...",
                15,
            );
            self.backup_archive(&mut result, &mut progress, &packages)
        };

        if let Some(locator) = &locator {
            for (idx, spec) in from_backup.iter().enumerate() {
                let step = 5.0 + idx as f32;
                let pct = spread(40, 75, idx, from_backup.len());
                progress.update(step, format!("Extracting {} from backup...", spec.kind), pct);

                match locator.extract(spec, &self.layout) {
                    Ok(file) => {
                        progress.update(
                            step + 0.5,
                            format!("Verifying {} data...", spec.kind),
                            pct + 2,
                        );
                        self.accept(&mut result, spec, file);
                    }
                    Err(e) => {
                        result.error(
                            Issue::new(step_name(spec.kind, "Extraction"), e.to_string())
                                .with_kind(e.kind())
                                .with_remediation(remediation::backup(spec.backup_package)),
                        );
                    }
                }
            }
        } else if !from_backup.is_empty() {
            log::debug!("no usable backup, skipping {} extraction(s)", from_backup.len());
        }

        if self.options.collect_supplemental {
            for kind in SUPPLEMENTAL {
                if !dirs.contains(&kind) {
                    dirs.push(kind);
                }
            }
        }

        if !dirs.is_empty() {
            self.enter(Stage::SupplementalCollection);
            for (idx, kind) in dirs.into_iter().enumerate() {
                progress.update(
                    10.0 + idx as f32,
                    format!("Collecting {}...", kind),
                    78 + idx.min(5) as u8,
                );
                self.collect_directory(&mut result, kind);
            }
        }

        self.finish(&mut result, &mut progress, 13.0);
        result
    }

    fn enter(&self, stage: Stage) {
        log::info!("acquisition stage: {}", stage);
    }

    /// Requested artifacts split into files and collected folders
    fn partition(&self) -> (Vec<&'a ArtifactSpec>, Vec<ArtifactType>) {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for kind in &self.options.artifacts {
            if kind.is_directory() {
                if !dirs.contains(kind) {
                    dirs.push(*kind);
                }
                continue;
            }
            match self.catalog.get(*kind) {
                Some(spec) if !files.iter().any(|it: &&ArtifactSpec| it.kind == *kind) => {
                    files.push(spec)
                }
                Some(_) => {}
                None => log::warn!("{} is not in the artifact catalog", kind),
            }
        }
        (files, dirs)
    }

    /// Transport and device checks, `false` means the run is over
    fn preflight(
        &self,
        result: &mut AcquisitionResult,
        progress: &mut ProgressTracker,
        percents: [u8; 2],
    ) -> bool {
        self.enter(Stage::Init);
        if let Err(e) = self.layout.ensure() {
            result.error(Issue::new(
                "Evidence Folder",
                format!("failed to create {:?}: {}", self.layout.root(), e),
            ));
            return false;
        }

        self.enter(Stage::TransportCheck);
        progress.update(1.0, "Checking ADB availability...", percents[0]);
        match transport::check_available(self.adb) {
            Ok(version) => log::info!("{}", version),
            Err(e) => {
                result.error(
                    Issue::new("ADB Check", e.to_string())
                        .with_kind(e.kind())
                        .with_remediation(remediation::transport()),
                );
                return false;
            }
        }

        self.enter(Stage::DeviceCheck);
        progress.update(2.0, "Checking device connection...", percents[1]);
        match transport::check_device_connected(self.adb) {
            Ok(dev) => {
                log::info!("Device connected: {}", dev.serial);
                true
            }
            Err(e) => {
                result.error(
                    Issue::new("Device Check", e.to_string())
                        .with_kind(e.kind())
                        .with_remediation(remediation::device()),
                );
                false
            }
        }
    }

    /// Create, parse and index the combined backup.
    ///
    /// Any failure is recorded once for the whole backup.
    fn backup_archive(
        &self,
        result: &mut AcquisitionResult,
        progress: &mut ProgressTracker,
        packages: &[&str],
    ) -> Option<ArchiveLocator> {
        let remediation = match packages {
            [single] => remediation::backup(Some(*single)),
            _ => remediation::backup(None),
        };
        let mut fail = |step: &str, kind: ErrorKind, message: String| {
            result.error(
                Issue::new(step, message)
                    .with_kind(kind)
                    .with_remediation(remediation.clone()),
            );
            None
        };

        let container = self.layout.backup_container_path();
        match backup::create_backup(self.adb, packages, &container) {
            Ok(outcome) => log::info!("{}", outcome.message()),
            Err(e) => return fail("Backup Creation", e.kind(), e.to_string()),
        }

        progress.update(4.0, "Parsing backup...", 30);
        let parsed = match backup::parse(&container, &self.layout.inner_archive_path()) {
            Ok(v) => v,
            Err(e) => return fail("Backup Parse", e.kind(), e.to_string()),
        };
        log::info!("{}", parsed.message());

        match ArchiveLocator::open(&parsed.archive_path) {
            Ok(v) => Some(v),
            Err(e) => fail("Backup Parse", e.kind(), e.to_string()),
        }
    }

    /// Record an acquired file along with its verification
    fn accept(&self, result: &mut AcquisitionResult, spec: &ArtifactSpec, file: AcquiredFile) {
        let record = self.verify_artifact(result, spec, &file.local_path);
        result.record_acquired(file);
        result.record_verification(spec.kind, record);
    }

    fn verify_artifact(
        &self,
        result: &mut AcquisitionResult,
        spec: &ArtifactSpec,
        path: &Path,
    ) -> VerificationRecord {
        if !spec.is_database() {
            return verify_existence(path);
        }

        let expected = spec.expected_tables();
        let (record, kind) = match verify(path, &expected) {
            Ok(v) => (v, None),
            Err(e) => (
                VerificationRecord::failed(
                    path.exists(),
                    file_size(path).unwrap_or(0),
                    &expected,
                    e.to_string(),
                ),
                Some(e.kind()),
            ),
        };

        if !record.is_valid() {
            let detail = match &record.error {
                Some(e) => e.clone(),
                None => {
                    let missing: Vec<&str> = expected
                        .iter()
                        .filter(|t| !record.tables_found.contains(t))
                        .map(String::as_str)
                        .collect();
                    format!("missing tables: {}", missing.join(", "))
                }
            };
            let mut issue = Issue::new(
                step_name(spec.kind, "Verification"),
                format!("Database verification issues: {}", detail),
            )
            .with_remediation(remediation::verification(spec.kind.as_str()));
            if let Some(kind) = kind {
                issue = issue.with_kind(kind);
            }
            result.warn(issue);
        }

        record
    }

    /// Fill one of the collected folders, recording it if anything came back
    fn collect_directory(&self, result: &mut AcquisitionResult, kind: ArtifactType) {
        let timeout = self.options.shell_timeout;

        let (dir, collected, message) = match kind {
            ArtifactType::SystemDump => {
                let dir = self.layout.system_dump_dir();
                let report = collect_system_dump(self.adb, &dir, timeout);
                let msg = format!(
                    "Collected {} of {} system dumps",
                    report.non_empty, report.attempted
                );
                (dir, files_collected(&report), msg)
            }
            ArtifactType::ContentQuery => {
                let dir = self.layout.content_query_dir();
                let report = collect_content_queries(self.adb, &dir, timeout);
                let rows: usize = match parse_content_query_dir(&dir) {
                    Ok(parsed) => parsed.iter().map(|(_, rows)| rows.len()).sum(),
                    Err(e) => {
                        log::warn!("failed to read back content queries: {}", e);
                        0
                    }
                };
                let msg = format!(
                    "Collected {} of {} content queries ({} rows)",
                    report.non_empty, report.attempted, rows
                );
                (dir, files_collected(&report), msg)
            }
            ArtifactType::SharedStorage => {
                let dir = self.layout.shared_storage_dir();
                let report = harvest(
                    self.adb,
                    &self.options.harvest_roots,
                    self.options.harvest_limit,
                    &dir,
                    timeout,
                );
                let msg = format!(
                    "Harvested {} of {} files from shared storage",
                    report.pulled, report.attempted
                );
                (dir, report.pulled, msg)
            }
            other => {
                log::warn!("{} is not a collected artifact", other);
                return;
            }
        };

        if collected == 0 {
            result.warn(Issue::new(
                step_name(kind, "Collection"),
                format!("Nothing collected for {}", kind),
            ));
            return;
        }

        result.record_acquired(AcquiredFile::new(
            kind,
            dir.clone(),
            Provenance::Collected { files: collected },
            message,
        ));
        result.record_verification(kind, verify_existence(&dir));
    }

    fn finish(&self, result: &mut AcquisitionResult, progress: &mut ProgressTracker, step: f32) {
        self.enter(Stage::Hashing);
        progress.update(step, "Calculating file hashes...", 85);

        let mut failures = Vec::new();
        for (kind, file) in result.acquired.iter_mut() {
            if kind.is_directory() {
                continue;
            }
            let digest = hash_file(&file.local_path);
            if is_hash_error(&digest) {
                failures.push(
                    Issue::new(step_name(*kind, "Hashing"), digest.clone())
                        .with_kind(ErrorKind::HashIOFailed),
                );
            }
            file.hash = Some(digest);
        }
        for issue in failures {
            result.warn(issue);
        }

        progress.update(step + 1.0, "Performing final verification...", 90);
        result.finish();

        self.enter(Stage::Done);
        let message = if result.success {
            "Extraction complete!"
        } else {
            "Extraction finished without acquiring any artifact"
        };
        progress.done(step + 2.0, message);
    }
}

fn files_collected(report: &CollectionReport) -> usize {
    if report.non_empty == 0 {
        0
    } else {
        report.files.len()
    }
}
