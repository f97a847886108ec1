//! Chart artifact files.
//!
//! Every render gets its own path, so concurrent renders never share a
//! file. An [`ArtifactFile`] deletes its file when dropped unless it was
//! explicitly persisted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::chart::Variant;
use crate::depth::Band;

/// Directory that chart images are written to.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Store rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a fresh, unique PNG path.
    ///
    /// Nothing is written yet; the returned guard only owns the path.
    pub fn allocate(&self) -> io::Result<ArtifactFile> {
        fs::create_dir_all(&self.dir)?;
        let name = format!("depth_{}_{}.png", std::process::id(), Uuid::new_v4().simple());
        Ok(ArtifactFile::new(self.dir.join(name)))
    }
}

/// Owns a file path and removes the file on drop.
#[derive(Debug)]
pub struct ArtifactFile {
    path: PathBuf,
    armed: bool,
}

impl ArtifactFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// File location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now. A file that is already gone is not an error.
    pub fn remove(&mut self) -> io::Result<()> {
        if !self.armed {
            return Ok(());
        }
        self.armed = false;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Removed artifact");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Keep the file on disk and hand back its path.
    pub fn persist(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ArtifactFile {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!(path = %self.path.display(), error = %e, "Failed to remove artifact");
        }
    }
}

/// A rendered chart: the PNG on disk plus its caption.
#[derive(Debug)]
pub struct ChartArtifact {
    file: ArtifactFile,
    description: String,
    band: Band,
    variant: Variant,
}

impl ChartArtifact {
    pub(crate) fn new(file: ArtifactFile, description: String, band: Band, variant: Variant) -> Self {
        Self {
            file,
            description,
            band,
            variant,
        }
    }

    /// PNG location.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Human-readable caption, e.g. `Depth (5% Bid/Ask)`.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Depth band the chart shows.
    pub fn band(&self) -> Band {
        self.band
    }

    /// Chart variant.
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Delete the PNG.
    pub fn release(mut self) -> io::Result<()> {
        self.file.remove()
    }

    /// Keep the PNG and return its path.
    pub fn persist(self) -> PathBuf {
        self.file.persist()
    }
}
