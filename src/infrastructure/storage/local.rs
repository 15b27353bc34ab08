use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const TEMP_PREFIX: &str = "temp_";

/// The directory shared by every job for converter output and final MP3s.
///
/// Temporary names handed out by [`OutputDir::reserve_temp`], and final names
/// held through [`TempSlot::hold`], stay registered as in-flight until the
/// returned [`TempSlot`] is dropped, so the retention sweep can leave them
/// alone.
#[derive(Clone, Debug)]
pub struct OutputDir {
    root: PathBuf,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl OutputDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure(&self) -> io::Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
            info!("📁 Created output directory {}", self.root.display());
        }
        Ok(())
    }

    /// Reserves a collision-free temporary name: unix seconds plus a random suffix.
    pub fn reserve_temp(&self) -> TempSlot {
        let suffix = Uuid::new_v4().simple().to_string();
        let prefix = format!(
            "{}{}_{}",
            TEMP_PREFIX,
            OffsetDateTime::now_utc().unix_timestamp(),
            &suffix[..12]
        );

        self.register(&prefix);

        TempSlot {
            prefix,
            held: Vec::new(),
            dir: self.clone(),
        }
    }

    fn register(&self, name: &str) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
    }

    pub fn is_in_flight(&self, file_name: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|prefix| file_name.starts_with(prefix.as_str()))
    }

    /// Regular files whose name starts with `prefix`, sorted by name.
    pub fn find_by_prefix(&self, prefix: &str) -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with(prefix) {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }

    /// Moves `artifact` to `<stem>.<ext>`, appending ` (n)` when the name is
    /// taken. A failed rename keeps the artifact where it is.
    ///
    /// The artifact's mtime is reset first: converters may stamp the upload
    /// date on it, and retention is measured from when the file was produced.
    pub fn claim_name(&self, artifact: &Path, stem: &str, ext: &str) -> PathBuf {
        if let Err(e) = touch(artifact) {
            warn!(artifact = %artifact.display(), error = %e, "Could not refresh artifact mtime");
        }

        let Some(target) = self.free_name(artifact, stem, ext) else {
            warn!(artifact = %artifact.display(), "No free filename, keeping generated name");
            return artifact.to_path_buf();
        };

        if target == artifact {
            return target;
        }

        match fs::rename(artifact, &target) {
            Ok(()) => {
                debug!(from = %artifact.display(), to = %target.display(), "Renamed artifact");
                target
            }
            Err(e) => {
                warn!(artifact = %artifact.display(), error = %e, "Rename failed, keeping generated name");
                artifact.to_path_buf()
            }
        }
    }

    fn free_name(&self, artifact: &Path, stem: &str, ext: &str) -> Option<PathBuf> {
        (0..1000).find_map(|n| {
            let name = match n {
                0 => format!("{}.{}", stem, ext),
                n => format!("{} ({}).{}", stem, n, ext),
            };
            let candidate = self.root.join(name);
            (candidate == artifact || !candidate.exists()).then_some(candidate)
        })
    }
}

fn touch(path: &Path) -> io::Result<()> {
    fs::File::options()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now())
}

/// A reserved temporary name inside an [`OutputDir`].
#[derive(Debug)]
pub struct TempSlot {
    prefix: String,
    held: Vec<String>,
    dir: OutputDir,
}

impl TempSlot {
    #[cfg(test)]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Keeps the file at `path` out of retention sweeps until the slot drops.
    pub fn hold(&mut self, path: &Path) {
        let Some(name) = path.file_name() else {
            return;
        };
        let name = name.to_string_lossy().into_owned();
        self.dir.register(&name);
        self.held.push(name);
    }

    /// Output template handed to the converter; it substitutes `%(ext)s` itself.
    pub fn template(&self) -> PathBuf {
        self.dir.root.join(format!("{}.%(ext)s", self.prefix))
    }

    pub fn artifacts(&self) -> io::Result<Vec<PathBuf>> {
        self.dir.find_by_prefix(&self.prefix)
    }
}

impl Drop for TempSlot {
    fn drop(&mut self) {
        let mut in_flight = self.dir.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.remove(&self.prefix);
        for name in &self.held {
            in_flight.remove(name);
        }
    }
}
