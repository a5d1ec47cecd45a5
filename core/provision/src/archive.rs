//! Archive extraction with entry exclusion.
//!
//! Supports ZIP (also `.vsix`/`.jar`, which are ZIP containers) and
//! `.tar.gz`/`.tgz`. Entries are processed one at a time in archive order:
//!
//! 1. An entry whose stored path starts with an excluded prefix
//!    (case-insensitive) is counted as skipped and never touches the
//!    filesystem.
//! 2. A directory entry ensures the directory exists.
//! 3. A file entry ensures its parent exists and overwrites the target.
//!
//! No entry may land outside the destination: stored paths with `..` or a
//! root are refused, tar symlinks must resolve inside the destination, and
//! nothing is written through a directory that is already a symlink.
//!
//! Extraction is therefore re-runnable into a non-empty destination. The
//! extractor does not know why a prefix is excluded; installing a
//! replacement for an excluded subtree is the caller's concern.
//!
//! [`is_extracted`] answers "is this archive already fully on disk?" by
//! comparing entry sizes with the files at their destinations, which lets
//! callers skip extraction on rerun without any recorded state.

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, warn};

use crate::errors::ProvisionError;
use crate::plan::Subtree;

/// Case-insensitive entry path prefixes that are never extracted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionRule {
    prefixes: Vec<String>,
}

impl ExclusionRule {
    /// Builds a rule from prefixes such as `"jbr/"` or `"plugins/ndk"`.
    #[must_use]
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| normalize(p.as_ref()).to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Returns a copy of this rule with one more prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        let prefix = normalize(prefix).to_lowercase();
        if !prefix.is_empty() && !self.prefixes.contains(&prefix) {
            self.prefixes.push(prefix);
        }
        self
    }

    /// Returns whether `entry_path` falls under any excluded prefix.
    #[must_use]
    pub fn matches(&self, entry_path: &str) -> bool {
        if self.prefixes.is_empty() {
            return false;
        }
        let entry = normalize(entry_path).to_lowercase();
        self.prefixes.iter().any(|p| entry.starts_with(p.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    #[must_use]
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

/// Extraction progress, reported each time another 5% of entries is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractProgress {
    pub processed: usize,
    pub total: usize,
    pub percent: u8,
}

/// Callback type for receiving extraction progress.
pub type ExtractProgressCallback = Arc<dyn Fn(ExtractProgress) + Send + Sync>;

/// Options controlling which entries are extracted and where.
#[derive(Clone, Default)]
pub struct ExtractOptions {
    pub exclusions: ExclusionRule,
    /// Only entries under this prefix are extracted, with the prefix removed.
    /// Entries outside it count as skipped.
    pub include_prefix: Option<String>,
    /// Remove a single folder that wraps every entry.
    pub strip_common_root: bool,
    pub progress: Option<ExtractProgressCallback>,
}

impl ExtractOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn exclude(mut self, exclusions: ExclusionRule) -> Self {
        self.exclusions = exclusions;
        self
    }

    #[must_use]
    pub fn include_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.include_prefix = Some(normalize(&prefix.into()));
        self
    }

    #[must_use]
    pub fn strip_common_root(mut self, strip: bool) -> Self {
        self.strip_common_root = strip;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Option<ExtractProgressCallback>) -> Self {
        self.progress = progress;
        self
    }
}

/// Counts produced by one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub files_written: usize,
    /// Excluded entries, directories included, plus entries outside the
    /// include prefix.
    pub files_skipped: usize,
    pub dirs_created: usize,
}

impl fmt::Display for ExtractionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files written, {} entries skipped, {} directories",
            self.files_written, self.files_skipped, self.dirs_created
        )
    }
}

/// Extracts an archive (ZIP or tar.gz) into `dest_root`.
///
/// The format is chosen from the file extension: `.tar.gz` and `.tgz` are
/// tarballs, anything else is read as ZIP.
///
/// # Errors
///
/// Returns `ExtractionError` if the archive cannot be read or contains an
/// entry that would escape `dest_root`, and `IoError` if writing fails.
pub fn extract(
    archive_path: &Path,
    dest_root: &Path,
    options: &ExtractOptions,
) -> Result<ExtractionReport, ProvisionError> {
    std::fs::create_dir_all(dest_root).map_err(|e| {
        ProvisionError::io_error(format!("failed to create {}", dest_root.display()), e)
    })?;

    let report = if is_tar_gz(archive_path) {
        extract_tar_gz(archive_path, dest_root, options)?
    } else {
        extract_zip(archive_path, dest_root, options)?
    };

    debug!(archive = %archive_path.display(), %report, "extraction finished");
    Ok(report)
}

/// Returns whether every entry `extract` would write is already present at
/// its destination with the same size.
///
/// # Errors
///
/// Returns `ExtractionError` if the archive cannot be read.
pub fn is_extracted(
    archive_path: &Path,
    dest_root: &Path,
    options: &ExtractOptions,
) -> Result<bool, ProvisionError> {
    if !dest_root.is_dir() {
        return Ok(false);
    }
    if is_tar_gz(archive_path) {
        is_tar_gz_extracted(archive_path, dest_root, options)
    } else {
        is_zip_extracted(archive_path, dest_root, options)
    }
}

fn is_tar_gz(path: &Path) -> bool {
    let name = path.to_string_lossy().to_lowercase();
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// What to do with one archive entry.
enum Disposition {
    /// Excluded or outside the include prefix.
    Skip,
    /// The wrapping root or include-prefix directory itself.
    Ignore,
    Write(PathBuf),
}

/// Maps stored entry paths to destinations.
struct EntryResolver<'a> {
    archive: &'a Path,
    dest_root: &'a Path,
    options: &'a ExtractOptions,
    strip_prefix: Option<String>,
}

impl EntryResolver<'_> {
    fn resolve(&self, stored_path: &str) -> Result<Disposition, ProvisionError> {
        let normalized = normalize(stored_path);

        if self.options.exclusions.matches(&normalized) {
            return Ok(Disposition::Skip);
        }

        let mut relative = normalized.as_str();
        if let Some(root) = &self.strip_prefix {
            relative = relative.strip_prefix(root.as_str()).unwrap_or(relative);
        }
        if let Some(prefix) = &self.options.include_prefix {
            match relative.strip_prefix(prefix.as_str()) {
                Some(rest) => relative = rest,
                None if format!("{relative}/") == *prefix => return Ok(Disposition::Ignore),
                None => return Ok(Disposition::Skip),
            }
        }

        let relative = relative.trim_start_matches('/');
        if relative.is_empty() {
            return Ok(Disposition::Ignore);
        }

        let target = safe_join(self.dest_root, relative).ok_or_else(|| {
            ProvisionError::extraction(
                self.archive.to_path_buf(),
                format!("refusing to extract `{stored_path}` outside the destination"),
            )
        })?;
        Ok(Disposition::Write(target))
    }
}

/// Emits progress each time the processed share crosses a 5% step.
struct ProgressTicker<'a> {
    total: usize,
    processed: usize,
    next_percent: usize,
    callback: Option<&'a ExtractProgressCallback>,
}

impl<'a> ProgressTicker<'a> {
    fn new(total: usize, callback: Option<&'a ExtractProgressCallback>) -> Self {
        Self {
            total,
            processed: 0,
            next_percent: 5,
            callback,
        }
    }

    fn tick(&mut self) {
        self.processed += 1;
        if self.total == 0 {
            return;
        }
        let percent = (self.processed * 100 / self.total).min(100);
        if percent < self.next_percent {
            return;
        }
        self.next_percent = (percent / 5 + 1) * 5;
        #[allow(clippy::cast_possible_truncation)]
        let progress = ExtractProgress {
            processed: self.processed,
            total: self.total,
            percent: percent as u8,
        };
        debug!(processed = progress.processed, total = progress.total, percent, "extracting");
        if let Some(cb) = self.callback {
            cb(progress);
        }
    }
}

fn extract_zip(
    archive_path: &Path,
    dest_root: &Path,
    options: &ExtractOptions,
) -> Result<ExtractionReport, ProvisionError> {
    let mut archive = open_zip(archive_path)?;

    let strip_prefix = options
        .strip_common_root
        .then(|| find_common_root(archive.file_names()))
        .flatten();
    let resolver = EntryResolver {
        archive: archive_path,
        dest_root,
        options,
        strip_prefix,
    };

    let mut report = ExtractionReport::default();
    let mut ticker = ProgressTicker::new(archive.len(), options.progress.as_ref());

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| {
            ProvisionError::extraction(archive_path.to_path_buf(), format!("entry {i}: {e}"))
        })?;

        match resolver.resolve(entry.name())? {
            Disposition::Skip => report.files_skipped += 1,
            Disposition::Ignore => {}
            Disposition::Write(target) => {
                reject_symlinked_parent(archive_path, dest_root, &target)?;
                if entry.is_dir() {
                    create_dir(&target, &mut report)?;
                } else {
                    ensure_parent(&target)?;
                    let mut outfile = File::create(&target).map_err(|e| {
                        ProvisionError::io_error(format!("failed to create {}", target.display()), e)
                    })?;
                    std::io::copy(&mut entry, &mut outfile).map_err(|e| {
                        ProvisionError::io_error(
                            format!("failed to extract {}", target.display()),
                            e,
                        )
                    })?;
                    #[cfg(unix)]
                    if let Some(mode) = entry.unix_mode() {
                        apply_mode(&target, mode)?;
                    }
                    report.files_written += 1;
                }
            }
        }
        ticker.tick();
    }

    Ok(report)
}

fn is_zip_extracted(
    archive_path: &Path,
    dest_root: &Path,
    options: &ExtractOptions,
) -> Result<bool, ProvisionError> {
    let mut archive = open_zip(archive_path)?;
    let strip_prefix = options
        .strip_common_root
        .then(|| find_common_root(archive.file_names()))
        .flatten();
    let resolver = EntryResolver {
        archive: archive_path,
        dest_root,
        options,
        strip_prefix,
    };

    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(|e| {
            ProvisionError::extraction(archive_path.to_path_buf(), format!("entry {i}: {e}"))
        })?;
        if let Disposition::Write(target) = resolver.resolve(entry.name())? {
            let present = if entry.is_dir() {
                target.is_dir()
            } else {
                file_has_len(&target, entry.size())
            };
            if !present {
                debug!(missing = %target.display(), "archive not fully extracted");
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn open_zip(archive_path: &Path) -> Result<zip::ZipArchive<File>, ProvisionError> {
    let file = File::open(archive_path).map_err(|e| {
        ProvisionError::io_error(format!("failed to open {}", archive_path.display()), e)
    })?;
    zip::ZipArchive::new(file).map_err(|e| {
        ProvisionError::extraction(archive_path.to_path_buf(), format!("not a valid ZIP: {e}"))
    })
}

fn extract_tar_gz(
    archive_path: &Path,
    dest_root: &Path,
    options: &ExtractOptions,
) -> Result<ExtractionReport, ProvisionError> {
    let (total, strip_prefix) = if options.progress.is_some() || options.strip_common_root {
        let names = tar_entry_names(archive_path)?;
        let root = options
            .strip_common_root
            .then(|| find_common_root(names.iter().map(String::as_str)))
            .flatten();
        (names.len(), root)
    } else {
        (0, None)
    };

    let resolver = EntryResolver {
        archive: archive_path,
        dest_root,
        options,
        strip_prefix,
    };
    let mut report = ExtractionReport::default();
    let mut ticker = ProgressTicker::new(total, options.progress.as_ref());

    let mut archive = open_tar_gz(archive_path)?;
    let entries = archive
        .entries()
        .map_err(|e| ProvisionError::extraction(archive_path.to_path_buf(), e.to_string()))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| ProvisionError::extraction(archive_path.to_path_buf(), e.to_string()))?;
        let stored = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        match resolver.resolve(&stored)? {
            Disposition::Skip => report.files_skipped += 1,
            Disposition::Ignore => {}
            Disposition::Write(target) => {
                reject_symlinked_parent(archive_path, dest_root, &target)?;
                if entry.header().entry_type().is_dir() {
                    create_dir(&target, &mut report)?;
                } else {
                    unpack_tar_entry(&mut entry, &resolver, &stored, &target)?;
                    report.files_written += 1;
                }
            }
        }
        ticker.tick();
    }

    Ok(report)
}

/// Writes one non-directory tar entry. A symlink must resolve inside the
/// destination and a hard link must name another extracted entry.
fn unpack_tar_entry<R: std::io::Read>(
    entry: &mut tar::Entry<'_, R>,
    resolver: &EntryResolver<'_>,
    stored: &str,
    target: &Path,
) -> Result<(), ProvisionError> {
    let archive = resolver.archive;
    let kind = entry.header().entry_type();
    let link = entry
        .link_name()
        .map_err(|e| ProvisionError::extraction(archive.to_path_buf(), e.to_string()))?
        .map(Cow::into_owned);
    ensure_parent(target)?;

    match link {
        Some(link) if kind.is_hard_link() => {
            let Disposition::Write(source) = resolver.resolve(&link.to_string_lossy())? else {
                return Err(ProvisionError::extraction(
                    archive.to_path_buf(),
                    format!("hard link `{stored}` points to a skipped entry"),
                ));
            };
            if target.symlink_metadata().is_ok() {
                remove_file(target)?;
            }
            std::fs::hard_link(&source, target).map_err(|e| {
                ProvisionError::io_error(format!("failed to link {}", target.display()), e)
            })
        }
        Some(link) if kind.is_symlink() && !link_stays_inside(resolver.dest_root, target, &link) => {
            Err(ProvisionError::extraction(
                archive.to_path_buf(),
                format!(
                    "refusing symlink `{stored}` -> `{}` outside the destination",
                    link.display()
                ),
            ))
        }
        _ => entry
            .unpack(target)
            .map(|_| ())
            .map_err(|e| {
                ProvisionError::io_error(format!("failed to extract {}", target.display()), e)
            }),
    }
}

fn is_tar_gz_extracted(
    archive_path: &Path,
    dest_root: &Path,
    options: &ExtractOptions,
) -> Result<bool, ProvisionError> {
    let strip_prefix = if options.strip_common_root {
        let names = tar_entry_names(archive_path)?;
        find_common_root(names.iter().map(String::as_str))
    } else {
        None
    };
    let resolver = EntryResolver {
        archive: archive_path,
        dest_root,
        options,
        strip_prefix,
    };

    let mut archive = open_tar_gz(archive_path)?;
    let entries = archive
        .entries()
        .map_err(|e| ProvisionError::extraction(archive_path.to_path_buf(), e.to_string()))?;
    for entry in entries {
        let entry = entry
            .map_err(|e| ProvisionError::extraction(archive_path.to_path_buf(), e.to_string()))?;
        let stored = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        if let Disposition::Write(target) = resolver.resolve(&stored)? {
            let kind = entry.header().entry_type();
            let present = if kind.is_dir() {
                target.is_dir()
            } else if kind.is_file() {
                file_has_len(&target, entry.size())
            } else {
                target.symlink_metadata().is_ok()
            };
            if !present {
                debug!(missing = %target.display(), "archive not fully extracted");
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn open_tar_gz(archive_path: &Path) -> Result<Archive<GzDecoder<File>>, ProvisionError> {
    let file = File::open(archive_path).map_err(|e| {
        ProvisionError::io_error(format!("failed to open {}", archive_path.display()), e)
    })?;
    Ok(Archive::new(GzDecoder::new(file)))
}

/// Reads every stored path of a tarball without unpacking anything.
fn tar_entry_names(archive_path: &Path) -> Result<Vec<String>, ProvisionError> {
    let mut archive = open_tar_gz(archive_path)?;
    let entries = archive
        .entries()
        .map_err(|e| ProvisionError::extraction(archive_path.to_path_buf(), e.to_string()))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| ProvisionError::extraction(archive_path.to_path_buf(), e.to_string()))?;
        names.push(String::from_utf8_lossy(&entry.path_bytes()).into_owned());
    }
    Ok(names)
}

/// Finds a folder shared by all entries, returned as `"name/"`.
///
/// Returns `None` unless every entry starts with the same first component
/// and at least one entry is nested below it, so a flat file at the archive
/// root is never mistaken for a wrapping folder.
fn find_common_root<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut common_root: Option<String> = None;
    let mut has_nested_entries = false;

    for name in names {
        let name = normalize(name);
        let mut parts = name.split('/').filter(|p| !p.is_empty());
        let first = parts.next()?;
        if parts.next().is_some() {
            has_nested_entries = true;
        }
        match &common_root {
            None => common_root = Some(first.to_string()),
            Some(existing) if existing != first => return None,
            Some(_) => {}
        }
    }

    if has_nested_entries {
        common_root.map(|root| format!("{root}/"))
    } else {
        None
    }
}

/// Converts backslashes and drops a leading `./`.
fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}

/// Joins `relative` to `root`, refusing anything that could escape it.
fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let rel = Path::new(relative);
    if rel.is_absolute()
        || rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    Some(root.join(rel))
}

/// Fails if a directory between `dest_root` and `target` is a symlink, since
/// writing through it could land outside the destination.
fn reject_symlinked_parent(
    archive: &Path,
    dest_root: &Path,
    target: &Path,
) -> Result<(), ProvisionError> {
    let Ok(relative) = target.strip_prefix(dest_root) else {
        return Ok(());
    };
    let mut current = dest_root.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        if current
            .symlink_metadata()
            .is_ok_and(|m| m.file_type().is_symlink())
        {
            return Err(ProvisionError::extraction(
                archive.to_path_buf(),
                format!("refusing to extract through symlink {}", current.display()),
            ));
        }
    }
    Ok(())
}

/// Returns whether a symlink created at `target` and pointing to `link`
/// resolves, lexically, to a path under `dest_root`.
fn link_stays_inside(dest_root: &Path, target: &Path, link: &Path) -> bool {
    let Ok(relative) = target.strip_prefix(dest_root) else {
        return false;
    };
    let mut depth = relative.components().count().saturating_sub(1);
    for component in link.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

fn remove_file(path: &Path) -> Result<(), ProvisionError> {
    std::fs::remove_file(path)
        .map_err(|e| ProvisionError::io_error(format!("failed to replace {}", path.display()), e))
}

fn create_dir(target: &Path, report: &mut ExtractionReport) -> Result<(), ProvisionError> {
    if !target.is_dir() {
        std::fs::create_dir_all(target).map_err(|e| {
            ProvisionError::io_error(format!("failed to create {}", target.display()), e)
        })?;
        report.dirs_created += 1;
    }
    Ok(())
}

fn ensure_parent(target: &Path) -> Result<(), ProvisionError> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ProvisionError::io_error(format!("failed to create {}", parent.display()), e)
        })?;
    }
    Ok(())
}

fn file_has_len(path: &Path, len: u64) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() == len)
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> Result<(), ProvisionError> {
    use std::os::unix::fs::PermissionsExt;

    // Only permission bits; zip stores the file type in the upper bits.
    let perms = std::fs::Permissions::from_mode(mode & 0o777);
    std::fs::set_permissions(path, perms).map_err(|e| {
        ProvisionError::io_error(format!("failed to set permissions: {}", path.display()), e)
    })
}

/// Presence of one expected subtree after extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeStatus {
    pub path: String,
    pub required: bool,
    pub present: bool,
}

/// Checks which expected subtrees exist under `root`.
#[must_use]
pub fn presence_checklist(root: &Path, subtrees: &[Subtree]) -> Vec<SubtreeStatus> {
    subtrees
        .iter()
        .map(|subtree| SubtreeStatus {
            path: subtree.path.clone(),
            required: subtree.required,
            present: root.join(subtree.path.trim_end_matches('/')).exists(),
        })
        .collect()
}

/// Fails on the first missing required subtree and warns about missing
/// optional ones.
///
/// # Errors
///
/// Returns `MissingArtifactError` naming the first required subtree that is
/// absent.
pub fn require_subtrees(root: &Path, checklist: &[SubtreeStatus]) -> Result<(), ProvisionError> {
    for status in checklist.iter().filter(|s| !s.present) {
        if status.required {
            return Err(ProvisionError::missing_artifact(
                status.path.clone(),
                root.to_path_buf(),
            ));
        }
        warn!(subtree = %status.path, root = %root.display(), "optional subtree is missing");
    }
    Ok(())
}

/// Sets executable permissions on the files of `dir/bin` (Unix only).
///
/// # Errors
///
/// Returns `IoError` if the directory cannot be read or permissions cannot
/// be set.
#[cfg(unix)]
pub fn set_executable_permissions(dir: &Path) -> Result<(), ProvisionError> {
    let bin_dir = dir.join("bin");
    if !bin_dir.is_dir() {
        return Ok(());
    }
    let entries = std::fs::read_dir(&bin_dir).map_err(|e| {
        ProvisionError::io_error(format!("failed to read {}", bin_dir.display()), e)
    })?;
    for entry in entries {
        let path = entry
            .map_err(|e| ProvisionError::io_error("failed to read directory entry", e))?
            .path();
        if path.is_file() {
            make_executable(&path)?;
        }
    }
    Ok(())
}

/// Sets executable permissions (no-op on Windows).
#[cfg(windows)]
#[allow(clippy::unnecessary_wraps)]
pub fn set_executable_permissions(_dir: &Path) -> Result<(), ProvisionError> {
    Ok(())
}

/// Adds the executable bits to one file (no-op on Windows).
///
/// # Errors
///
/// Returns `IoError` if metadata cannot be read or permissions cannot be set.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<(), ProvisionError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .map_err(|e| ProvisionError::io_error(format!("failed to stat {}", path.display()), e))?
        .permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms).map_err(|e| {
        ProvisionError::io_error(format!("failed to set permissions: {}", path.display()), e)
    })
}

#[cfg(windows)]
#[allow(clippy::unnecessary_wraps)]
pub fn make_executable(_path: &Path) -> Result<(), ProvisionError> {
    Ok(())
}
