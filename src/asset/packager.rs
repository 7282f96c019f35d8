//! Asset Packager
//!
//! Computes a content hash for a source tree and writes a reproducible
//! archive into the staging directory. The hash only depends on relative
//! paths, the executable bit and file contents, so touching a file or
//! changing its owner never produces a new artifact.

use crate::error::{Result, SynthError};
use flate2::{Compression, GzBuilder};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File name of staged directory archives
const ARCHIVE_FILE_NAME: &str = "archive.tar.gz";

/// Extension used when naming archive artifacts
const ARCHIVE_EXTENSION: &str = "tar.gz";

/// Asset id used by [`AssetPackager::package`]
const DEFAULT_ASSET_ID: &str = "asset";

/// Mode bits written for files without any execute bit
const MODE_REGULAR: u32 = 0o644;

/// Mode bits written for files with an execute bit
const MODE_EXECUTABLE: u32 = 0o755;

/// How a source path is turned into an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    /// A single file, staged as-is
    File,
    /// A directory, staged as a gzipped tarball
    Archive,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Archive => "archive",
        }
    }
}

/// Result of one packaging operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetDescriptor {
    pub source_path: PathBuf,
    /// Lowercase hex SHA-256 of the normalized source content
    pub hash: String,
    pub asset_type: AssetType,
    /// Where the artifact bytes were written
    pub staged_path: PathBuf,
    /// Extension used for the hash-derived object name
    pub extension: String,
}

/// One regular file of a source tree, with metadata already normalized
#[derive(Debug)]
struct SourceFile {
    /// Path relative to the source root, `/`-separated
    rel: String,
    executable: bool,
    content: Vec<u8>,
}

/// Packages source trees into a staging directory
#[derive(Debug, Clone)]
pub struct AssetPackager {
    staging_dir: PathBuf,
}

impl AssetPackager {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }

    /// Package `source`, archiving directories and staging single files as-is
    pub fn package(&self, source: &Path) -> Result<AssetDescriptor> {
        let asset_type = if source.is_file() {
            AssetType::File
        } else {
            AssetType::Archive
        };
        self.package_as(DEFAULT_ASSET_ID, source, asset_type)
    }

    /// Package `source` under an explicit asset id and type
    pub fn package_as(
        &self,
        id: &str,
        source: &Path,
        asset_type: AssetType,
    ) -> Result<AssetDescriptor> {
        validate_asset_id(id).map_err(|reason| SynthError::packaging(source, reason))?;

        let metadata = std::fs::metadata(source)
            .map_err(|e| SynthError::packaging(source, format!("cannot read source: {e}")))?;

        let files = match asset_type {
            AssetType::Archive => {
                if !metadata.is_dir() {
                    return Err(SynthError::packaging(
                        source,
                        "archive assets must be directories",
                    ));
                }
                collect_files(source)?
            }
            AssetType::File => {
                if !metadata.is_file() {
                    return Err(SynthError::packaging(source, "file assets must be regular files"));
                }
                vec![read_single_file(source, &metadata)?]
            }
        };

        if files.is_empty() {
            tracing::warn!("Source {:?} contains no files", source);
        }

        let hash = content_hash(&files);
        let (file_name, extension) = match asset_type {
            AssetType::Archive => (ARCHIVE_FILE_NAME.to_string(), ARCHIVE_EXTENSION.to_string()),
            AssetType::File => {
                let name = files[0].rel.clone();
                let extension = Path::new(&name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("bin")
                    .to_string();
                (name, extension)
            }
        };

        let target_dir = self.staging_dir.join("assets").join(id).join(&hash);
        let staged_path = target_dir.join(&file_name);

        if staged_path.is_file() {
            tracing::debug!("Asset {} already staged at {:?}", hash, staged_path);
        } else {
            let bytes = match asset_type {
                AssetType::Archive => build_archive(&files)
                    .map_err(|e| SynthError::packaging(source, format!("cannot build archive: {e}")))?,
                AssetType::File => files[0].content.clone(),
            };
            stage(&target_dir, &staged_path, &bytes)
                .map_err(|e| SynthError::packaging(&staged_path, format!("cannot stage asset: {e}")))?;
            tracing::info!(
                "Staged {} asset {} ({} files, {} bytes)",
                asset_type.as_str(),
                hash,
                files.len(),
                bytes.len()
            );
        }

        Ok(AssetDescriptor {
            source_path: source.to_path_buf(),
            hash,
            asset_type,
            staged_path,
            extension,
        })
    }
}

/// Asset ids become directory names under the staging root
fn validate_asset_id(id: &str) -> std::result::Result<(), &'static str> {
    if id.is_empty() {
        return Err("asset id must not be empty");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("asset id may only contain letters, digits, '-' and '_'");
    }
    Ok(())
}

/// Walk `root` and return its regular files sorted by relative path
fn collect_files(root: &Path) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| SynthError::packaging(root, format!("cannot walk source: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| SynthError::packaging(entry.path(), e))?;
        let rel = normalize_rel_path(rel)
            .ok_or_else(|| SynthError::packaging(entry.path(), "path is not valid UTF-8"))?;

        let metadata = entry
            .metadata()
            .map_err(|e| SynthError::packaging(entry.path(), e))?;
        let content = std::fs::read(entry.path())
            .map_err(|e| SynthError::packaging(entry.path(), format!("cannot read file: {e}")))?;

        files.push(SourceFile {
            rel,
            executable: is_executable(&metadata),
            content,
        });
    }

    // Walk order depends on the filesystem
    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    tracing::debug!("Collected {} files from {:?}", files.len(), root);
    Ok(files)
}

fn read_single_file(path: &Path, metadata: &std::fs::Metadata) -> Result<SourceFile> {
    let rel = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SynthError::packaging(path, "file name is not valid UTF-8"))?
        .to_string();
    let content = std::fs::read(path)
        .map_err(|e| SynthError::packaging(path, format!("cannot read file: {e}")))?;
    Ok(SourceFile {
        rel,
        executable: is_executable(metadata),
        content,
    })
}

/// Join path components with `/` regardless of platform
fn normalize_rel_path(rel: &Path) -> Option<String> {
    let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

/// SHA-256 over (path, exec flag, length, content) of every file in order
fn content_hash(files: &[SourceFile]) -> String {
    let mut hasher = Sha256::new();
    for file in files {
        hasher.update(file.rel.as_bytes());
        hasher.update([0u8]);
        hasher.update([u8::from(file.executable)]);
        hasher.update((file.content.len() as u64).to_le_bytes());
        hasher.update(&file.content);
    }
    hex::encode(hasher.finalize())
}

/// Build a gzipped tarball whose bytes depend only on the files given
fn build_archive(files: &[SourceFile]) -> std::io::Result<Vec<u8>> {
    let encoder = GzBuilder::new().mtime(0).write(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);

    for file in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(file.content.len() as u64);
        header.set_mode(if file.executable {
            MODE_EXECUTABLE
        } else {
            MODE_REGULAR
        });
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        builder.append_data(&mut header, &file.rel, file.content.as_slice())?;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()
}

/// Write `bytes` to `target` through a temp file in the same directory
fn stage(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}
