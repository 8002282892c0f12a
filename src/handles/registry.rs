use std::{
    collections::HashMap,
    fmt,
    fs::{File, OpenOptions},
    io::Write as _,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::Context as _;

use crate::{
    encode::raster::OutputFormat,
    foundation::error::{FramecutError, FramecutResult},
};

/// Short-lived, revocable reference to encoded bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    /// Wrap a registry-specific reference string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the reference string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Allocator/revoker pair for output resources.
///
/// `label` is a caller hint (for example `cell-003`) that registries may use to name the
/// resource; it carries no identity.
pub trait HandleRegistry: Send + Sync {
    /// Make `bytes` addressable and return the new handle.
    fn register(
        &self,
        bytes: &[u8],
        format: OutputFormat,
        label: &str,
    ) -> FramecutResult<ResourceHandle>;

    /// Release a handle. Releasing an unknown handle is an error the caller may ignore.
    fn revoke(&self, handle: &ResourceHandle) -> FramecutResult<()>;
}

#[derive(Clone, Debug)]
struct MemoryEntry {
    format: OutputFormat,
    bytes: Arc<[u8]>,
}

/// In-memory registry handing out `mem:<uuid>` handles.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: Mutex<HashMap<ResourceHandle, MemoryEntry>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the bytes behind a live handle.
    pub fn resolve(&self, handle: &ResourceHandle) -> Option<Arc<[u8]>> {
        self.lock().get(handle).map(|e| Arc::clone(&e.bytes))
    }

    /// Output format a live handle was registered with.
    pub fn format_of(&self, handle: &ResourceHandle) -> Option<OutputFormat> {
        self.lock().get(handle).map(|e| e.format)
    }

    /// Number of handles not yet revoked.
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ResourceHandle, MemoryEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HandleRegistry for MemoryRegistry {
    fn register(
        &self,
        bytes: &[u8],
        format: OutputFormat,
        _label: &str,
    ) -> FramecutResult<ResourceHandle> {
        let handle = ResourceHandle::new(format!("mem:{}", uuid::Uuid::new_v4()));
        self.lock().insert(
            handle.clone(),
            MemoryEntry {
                format,
                bytes: Arc::from(bytes),
            },
        );
        Ok(handle)
    }

    fn revoke(&self, handle: &ResourceHandle) -> FramecutResult<()> {
        match self.lock().remove(handle) {
            Some(_) => Ok(()),
            None => Err(FramecutError::invalid_input(format!(
                "unknown handle '{handle}'"
            ))),
        }
    }
}

/// Registry that writes each resource to its own file under a directory.
///
/// Handles are the written file paths; revoking deletes the file.
#[derive(Debug)]
pub struct DirRegistry {
    root: PathBuf,
}

impl DirRegistry {
    /// Use `root` as the output directory, creating it if needed.
    pub fn create(root: impl Into<PathBuf>) -> FramecutResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create output directory '{}'", root.display()))?;
        Ok(Self { root })
    }

    /// Output directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stem_for(label: &str) -> String {
        let stem: String = label
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if stem.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            stem
        }
    }

    /// Create a file no other registration owns. The label is used as-is when free; on a
    /// collision a uuid suffix keeps every handle independently revocable.
    fn claim(&self, label: &str, format: OutputFormat) -> FramecutResult<(PathBuf, File)> {
        let stem = Self::stem_for(label);
        let ext = format.extension();
        let mut path = self.root.join(format!("{stem}.{ext}"));
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    path = self
                        .root
                        .join(format!("{stem}-{}.{ext}", uuid::Uuid::new_v4().simple()));
                }
                Err(e) => {
                    return Err(anyhow::Error::new(e)
                        .context(format!("failed to create output '{}'", path.display()))
                        .into());
                }
            }
        }
    }
}

impl HandleRegistry for DirRegistry {
    fn register(
        &self,
        bytes: &[u8],
        format: OutputFormat,
        label: &str,
    ) -> FramecutResult<ResourceHandle> {
        let (path, mut file) = self.claim(label, format)?;
        if let Err(e) = file.write_all(bytes).and_then(|()| file.flush()) {
            drop(file);
            let _ = std::fs::remove_file(&path);
            return Err(anyhow::Error::new(e)
                .context(format!("failed to write output '{}'", path.display()))
                .into());
        }
        Ok(ResourceHandle::new(path.to_string_lossy()))
    }

    fn revoke(&self, handle: &ResourceHandle) -> FramecutResult<()> {
        let path = Path::new(handle.as_str());
        if !path.starts_with(&self.root) {
            return Err(FramecutError::invalid_input(format!(
                "handle '{handle}' does not belong to '{}'",
                self.root.display()
            )));
        }
        std::fs::remove_file(path)
            .with_context(|| format!("failed to remove output '{}'", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/handles/registry.rs"]
mod tests;
