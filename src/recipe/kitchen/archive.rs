// src/recipe/kitchen/archive.rs

//! Source preparation for the Kitchen
//!
//! Fetches the recipe's sources into `<workdir>/source`: a local tree is
//! copied, an archive is downloaded (or reused from `<workdir>/downloads`),
//! verified against its checksum and unpacked. Patches are applied last.

use crate::error::{Error, Result};
use crate::hash::{Checksum, verify_file};
use crate::recipe::format::SourceSection;
use crate::recipe::kitchen::layout::{BuildContext, resolve_inside};
use crate::recipe::kitchen::runner::{CommandRunner, Invocation, run_checked};
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tar::Archive;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use xz2::read::XzDecoder;

/// Timeout for a single source download
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Directory names never copied from a local source tree
const SKIPPED_DIRS: &[&str] = &[".git", ".svn", ".hg"];

/// Download `url` to `dest`
///
/// `http(s)` URLs need `allow_network`; `file://` URLs and plain paths are
/// copied. The file is written to a `.tmp` sibling and renamed on success.
pub fn download_file(url: &str, dest: &Path, allow_network: bool) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp = dest.with_extension("tmp");

    if url.starts_with("http://") || url.starts_with("https://") {
        if !allow_network {
            return Err(Error::Configuration(format!(
                "Network access is disabled; cannot download {}",
                url
            )));
        }
        info!("Downloading {}", url);
        let client = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {e}")))?;
        let mut response = client
            .get(url)
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to fetch {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }
        let mut file = File::create(&temp)?;
        io::copy(&mut response, &mut file)
            .map_err(|e| Error::DownloadError(format!("Failed to read response from {url}: {e}")))?;
    } else {
        let local = url.strip_prefix("file://").unwrap_or(url);
        debug!("Copying source archive from {}", local);
        fs::copy(local, &temp)
            .map_err(|e| Error::NotFound(format!("Source archive {}: {}", local, e)))?;
    }

    fs::rename(&temp, dest)?;
    Ok(())
}

/// Relative path of an archive entry, or `None` when it is stripped away
fn entry_path(path: &Path, strip_root: bool) -> Result<Option<PathBuf>> {
    let mut out = PathBuf::new();
    for (index, component) in path.components().enumerate() {
        match component {
            Component::Normal(part) => {
                if !(strip_root && index == 0) {
                    out.push(part);
                }
            }
            Component::CurDir => {}
            _ => {
                return Err(Error::ParseError(format!(
                    "Archive entry {} escapes the source folder",
                    path.display()
                )));
            }
        }
    }
    Ok(if out.as_os_str().is_empty() { None } else { Some(out) })
}

fn decoder(archive: &Path) -> Result<Box<dyn Read>> {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let file = File::open(archive)?;

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Ok(Box::new(GzDecoder::new(file)))
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        Ok(Box::new(XzDecoder::new(file)))
    } else if name.ends_with(".tar") {
        Ok(Box::new(file))
    } else {
        Err(Error::ParseError(format!("Unknown archive format: {}", name)))
    }
}

/// Whether a symlink stored at `entry` and pointing to `link` stays in the tree
fn link_stays_inside(entry: &Path, link: &Path) -> bool {
    let mut depth = entry.parent().map_or(0, |p| p.components().count());
    for component in link.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(up) => depth = up,
                None => return false,
            },
            _ => return false,
        }
    }
    true
}

/// Fail unless `path` resolves under `root` once existing symlinks are followed
fn ensure_inside(root: &Path, path: &Path) -> Result<()> {
    let mut existing = path;
    while fs::symlink_metadata(existing).is_err() {
        match existing.parent() {
            Some(parent) => existing = parent,
            None => break,
        }
    }
    let resolved = existing.canonicalize()?;
    if resolved.starts_with(root) {
        Ok(())
    } else {
        Err(Error::ParseError(format!(
            "Archive entry {} resolves outside the source folder",
            path.display()
        )))
    }
}

/// Extract a tarball into `dest`, returning the number of entries written
///
/// Supports `.tar.gz`, `.tgz`, `.tar.xz`, `.txz` and `.tar`. Symlinks must
/// point inside `dest` and no entry may be written through a link that
/// leaves it. Hard links are unpacked as copies.
pub fn extract_archive(archive: &Path, dest: &Path, strip_root: bool) -> Result<usize> {
    let mut tarball = Archive::new(decoder(archive)?);
    let mut count = 0;
    fs::create_dir_all(dest)?;
    let root = dest.canonicalize()?;

    let entries = tarball
        .entries()
        .map_err(|e| Error::ParseError(format!("Failed to read archive entries: {}", e)))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::ParseError(format!("Corrupt archive entry: {}", e)))?;
        let raw = entry
            .path()
            .map_err(|e| Error::ParseError(format!("Invalid archive path: {}", e)))?
            .into_owned();
        let Some(relative) = entry_path(&raw, strip_root)? else {
            continue;
        };

        let target = dest.join(&relative);
        ensure_inside(&root, &target)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            let link = entry
                .link_name()
                .map_err(|e| Error::ParseError(format!("Invalid link name: {}", e)))?
                .ok_or_else(|| {
                    Error::ParseError(format!("Link {} has no target", relative.display()))
                })?
                .into_owned();

            if kind.is_hard_link() {
                let linked = entry_path(&link, strip_root)?.ok_or_else(|| {
                    Error::ParseError(format!(
                        "Hard link {} points at the archive root",
                        relative.display()
                    ))
                })?;
                let source = dest.join(&linked);
                ensure_inside(&root, &source)?;
                fs::copy(&source, &target)?;
                count += 1;
                continue;
            }

            if !link_stays_inside(&relative, &link) {
                return Err(Error::ParseError(format!(
                    "Symlink {} -> {} escapes the source folder",
                    relative.display(),
                    link.display()
                )));
            }
        }

        entry.unpack(&target).map_err(|e| {
            Error::IoError(format!("Failed to unpack {}: {}", relative.display(), e))
        })?;
        count += 1;
    }

    debug!("Extracted {} entries from {}", count, archive.display());
    Ok(count)
}

/// Copy a local source tree into `dest`, returning the number of files
pub fn copy_tree(src: &Path, dest: &Path) -> Result<usize> {
    if !src.is_dir() {
        return Err(Error::NotFound(format!(
            "Source directory {} does not exist",
            src.display()
        )));
    }

    let mut count = 0;
    let walker = WalkDir::new(src).follow_links(false).into_iter().filter_entry(|e| {
        e.depth() == 0
            || !e
                .file_name()
                .to_str()
                .is_some_and(|name| SKIPPED_DIRS.contains(&name))
    });

    for entry in walker {
        let entry = entry.map_err(|e| Error::IoError(format!("Failed to walk source: {}", e)))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::IoError(e.to_string()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target).map_err(|e| {
                Error::IoError(format!("Failed to copy {}: {}", entry.path().display(), e))
            })?;
            count += 1;
        }
    }
    Ok(count)
}

/// Fetch an archive, reusing a previous download whose checksum matches
fn fetch_archive(
    ctx: &BuildContext<'_>,
    source: &SourceSection,
    url: &str,
    allow_network: bool,
) -> Result<PathBuf> {
    let checksum = source.sha256.as_deref().map(Checksum::parse).transpose()?;
    let archive = ctx
        .layout
        .root
        .join("downloads")
        .join(ctx.recipe.archive_filename());

    if archive.exists() {
        match &checksum {
            Some(expected) if verify_file(&archive, expected).is_ok() => {
                info!("Using cached {}", archive.display());
                return Ok(archive);
            }
            _ => {
                fs::remove_file(&archive)?;
            }
        }
    }

    download_file(url, &archive, allow_network)?;
    match &checksum {
        Some(expected) => verify_file(&archive, expected)?,
        None => warn!("No checksum recorded for {}; skipping verification", url),
    }
    Ok(archive)
}

/// Apply the recipe's patches whose conditions hold
fn apply_patches(
    ctx: &BuildContext<'_>,
    source: &SourceSection,
    runner: &dyn CommandRunner,
    log: &mut String,
) -> Result<()> {
    let conditions = ctx.condition_context();
    for patch in &source.patches {
        if !patch.when.holds(&conditions)? {
            debug!("Skipping patch {}: condition does not hold", patch.file);
            continue;
        }
        let path = resolve_inside(&ctx.recipe.root, &patch.file)?;
        if !path.is_file() {
            return Err(Error::NotFound(format!("Patch {}", path.display())));
        }

        match &patch.description {
            Some(description) => info!("Applying patch {}: {}", patch.file, description),
            None => info!("Applying patch {}", patch.file),
        }
        let invocation = Invocation::new("patch", &ctx.layout.source)
            .arg(format!("-p{}", patch.strip))
            .arg("-i")
            .arg(path.display().to_string());
        run_checked(runner, "build", &invocation, log)?;
    }
    Ok(())
}

/// Populate the source folder
pub fn prepare_sources(
    ctx: &BuildContext<'_>,
    allow_network: bool,
    runner: &dyn CommandRunner,
    log: &mut String,
) -> Result<()> {
    let Some(source) = ctx.recipe.source.as_ref() else {
        info!("Recipe declares no source; building from an empty source folder");
        return Ok(());
    };

    if let Some(path) = &source.path {
        let src = ctx.recipe.root.join(path);
        let count = copy_tree(&src, &ctx.layout.source)?;
        info!("Copied {} source files from {}", count, src.display());
    } else if let Some(url) = ctx.recipe.archive_url() {
        let archive = fetch_archive(ctx, source, &url, allow_network)?;
        let count = extract_archive(&archive, &ctx.layout.source, source.strip_root)?;
        info!("Unpacked {} entries from {}", count, ctx.recipe.archive_filename());
    }

    apply_patches(ctx, source, runner, log)
}
