//! Backup archive access
//!
//! A backup archive is a gzip-compressed tarball laid out as:
//!
//! ```text
//! resources/<resource.group>/cluster/<name>.json
//! resources/<resource.group>/namespaces/<namespace>/<name>.json
//! ```
//!
//! Item IDs are file names without the `.json` suffix. Listings are sorted so
//! items are restored in a stable order.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use salvage_common::{GroupResource, ResourceScope, Unstructured};
use tempfile::TempDir;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::RestoreError;

/// Top-level directory holding resource documents
pub const RESOURCES_DIR: &str = "resources";
/// Subdirectory for cluster-scoped items
pub const CLUSTER_SCOPED_DIR: &str = "cluster";
/// Subdirectory for namespaced items
pub const NAMESPACE_SCOPED_DIR: &str = "namespaces";

const ITEM_SUFFIX: &str = ".json";

/// Read access to an unpacked backup archive
#[cfg_attr(test, automock)]
pub trait ArchiveReader: Send + Sync {
    /// Unpack the archive. Every other method fails until this succeeds.
    fn extract(&mut self) -> Result<(), RestoreError>;

    /// Scope of the archived resource type, or `None` when it wasn't backed up
    fn resource_scope(&self, gr: &GroupResource) -> Result<Option<ResourceScope>, RestoreError>;

    /// Namespaces holding items of a namespaced resource type
    fn list_namespaces(&self, gr: &GroupResource) -> Result<Vec<String>, RestoreError>;

    /// Item IDs of a resource type; an empty namespace lists cluster-scoped items
    fn list_contents(&self, gr: &GroupResource, namespace: &str)
        -> Result<Vec<String>, RestoreError>;

    /// Raw JSON of one item
    fn get(&self, gr: &GroupResource, namespace: &str, id: &str) -> Result<Vec<u8>, RestoreError>;

    /// Release whatever `extract` allocated
    fn close(&mut self) -> Result<(), RestoreError>;
}

/// A gzip+tar archive unpacked into a temporary directory
pub struct GzipTarArchive {
    source: Option<Box<dyn Read + Send + Sync>>,
    dir: Option<TempDir>,
}

impl GzipTarArchive {
    /// Archive read from `source` on [`extract`](ArchiveReader::extract)
    pub fn new(source: impl Read + Send + Sync + 'static) -> Self {
        Self {
            source: Some(Box::new(source)),
            dir: None,
        }
    }

    /// Archive held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(std::io::Cursor::new(bytes))
    }

    fn root(&self) -> Result<&Path, RestoreError> {
        self.dir
            .as_ref()
            .map(TempDir::path)
            .ok_or_else(|| RestoreError::Archive("archive has not been extracted".to_string()))
    }

    fn resource_dir(&self, gr: &GroupResource) -> Result<PathBuf, RestoreError> {
        let name = gr.to_string();
        check_segment(&name)?;
        Ok(self.root()?.join(RESOURCES_DIR).join(name))
    }

    fn items_dir(&self, gr: &GroupResource, namespace: &str) -> Result<PathBuf, RestoreError> {
        let dir = self.resource_dir(gr)?;
        if namespace.is_empty() {
            Ok(dir.join(CLUSTER_SCOPED_DIR))
        } else {
            check_segment(namespace)?;
            Ok(dir.join(NAMESPACE_SCOPED_DIR).join(namespace))
        }
    }
}

impl ArchiveReader for GzipTarArchive {
    fn extract(&mut self) -> Result<(), RestoreError> {
        let source = self
            .source
            .take()
            .ok_or_else(|| RestoreError::Archive("archive was already extracted".to_string()))?;

        let dir = tempfile::Builder::new()
            .prefix("salvage-restore-")
            .tempdir()
            .map_err(|e| RestoreError::Archive(format!("failed to create temp dir: {}", e)))?;

        tar::Archive::new(GzDecoder::new(source))
            .unpack(dir.path())
            .map_err(|e| RestoreError::Archive(format!("failed to unpack archive: {}", e)))?;

        debug!(path = %dir.path().display(), "Extracted backup archive");
        self.dir = Some(dir);
        Ok(())
    }

    fn resource_scope(&self, gr: &GroupResource) -> Result<Option<ResourceScope>, RestoreError> {
        let dir = self.resource_dir(gr)?;
        if !dir.is_dir() {
            return Ok(None);
        }
        if dir.join(CLUSTER_SCOPED_DIR).is_dir() {
            return Ok(Some(ResourceScope::Cluster));
        }
        if dir.join(NAMESPACE_SCOPED_DIR).is_dir() {
            return Ok(Some(ResourceScope::Namespaced));
        }
        Err(RestoreError::Archive(format!(
            "{} has neither a {} nor a {} directory",
            gr, CLUSTER_SCOPED_DIR, NAMESPACE_SCOPED_DIR
        )))
    }

    fn list_namespaces(&self, gr: &GroupResource) -> Result<Vec<String>, RestoreError> {
        let dir = self.resource_dir(gr)?.join(NAMESPACE_SCOPED_DIR);
        list_dir(&dir, |path, name| path.is_dir().then(|| name.to_string()))
    }

    fn list_contents(
        &self,
        gr: &GroupResource,
        namespace: &str,
    ) -> Result<Vec<String>, RestoreError> {
        let dir = self.items_dir(gr, namespace)?;
        list_dir(&dir, |path, name| {
            if !path.is_file() {
                return None;
            }
            name.strip_suffix(ITEM_SUFFIX).map(str::to_string)
        })
    }

    fn get(&self, gr: &GroupResource, namespace: &str, id: &str) -> Result<Vec<u8>, RestoreError> {
        check_segment(id)?;
        let path = self
            .items_dir(gr, namespace)?
            .join(format!("{}{}", id, ITEM_SUFFIX));
        fs::read(&path)
            .map_err(|e| RestoreError::Archive(format!("failed to read {}: {}", path.display(), e)))
    }

    fn close(&mut self) -> Result<(), RestoreError> {
        self.source = None;
        match self.dir.take() {
            Some(dir) => dir
                .close()
                .map_err(|e| RestoreError::Archive(format!("failed to remove temp dir: {}", e))),
            None => Ok(()),
        }
    }
}

fn list_dir(
    dir: &Path,
    mut keep: impl FnMut(&Path, &str) -> Option<String>,
) -> Result<Vec<String>, RestoreError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| RestoreError::Archive(format!("failed to list {}: {}", dir.display(), e)))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RestoreError::Archive(e.to_string()))?;
        let path = entry.path();
        if let Some(name) = entry.file_name().to_str() {
            if let Some(kept) = keep(&path, name) {
                names.push(kept);
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Reject names that would escape their directory
fn check_segment(segment: &str) -> Result<(), RestoreError> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains('/') {
        return Err(RestoreError::Archive(format!(
            "invalid archive path segment {:?}",
            segment
        )));
    }
    Ok(())
}

/// Produces archives in the layout [`GzipTarArchive`] reads
pub struct GzipTarWriter<W: Write> {
    builder: tar::Builder<GzEncoder<W>>,
}

impl<W: Write> GzipTarWriter<W> {
    /// Writer emitting a gzip stream into `sink`
    pub fn new(sink: W) -> Self {
        Self {
            builder: tar::Builder::new(GzEncoder::new(sink, Compression::default())),
        }
    }

    /// Add one item. An empty namespace writes a cluster-scoped item.
    pub fn write(
        &mut self,
        gr: &GroupResource,
        namespace: &str,
        name: &str,
        item: &Unstructured,
    ) -> Result<(), RestoreError> {
        let resource = gr.to_string();
        check_segment(&resource)?;
        check_segment(name)?;

        let mut path = PathBuf::from(RESOURCES_DIR).join(resource);
        if namespace.is_empty() {
            path.push(CLUSTER_SCOPED_DIR);
        } else {
            check_segment(namespace)?;
            path.push(NAMESPACE_SCOPED_DIR);
            path.push(namespace);
        }
        path.push(format!("{}{}", name, ITEM_SUFFIX));

        let data = serde_json::to_vec_pretty(item)?;
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);

        self.builder
            .append_data(&mut header, &path, data.as_slice())
            .map_err(|e| RestoreError::Archive(format!("failed to write {}: {}", path.display(), e)))
    }

    /// Flush the tarball and gzip stream, returning the sink
    pub fn finish(self) -> Result<W, RestoreError> {
        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| RestoreError::Archive(format!("failed to finish archive: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| RestoreError::Archive(format!("failed to finish archive: {}", e)))
    }
}
