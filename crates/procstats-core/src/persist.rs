//! Atomic on-disk persistence with a single pending-write slot.
//!
//! [`AtomicFile`] gives all-or-nothing file replacement (write a temp
//! sibling, fsync, rename over the target). [`Persistor`] layers the write
//! scheduling on top: callers hand it a fully serialized blob; the blob
//! parks in a one-deep pending slot and is committed to disk either inline
//! (sync) or from a spawned background thread. A second write scheduled
//! while a commit is in flight simply replaces the pending blob, so at most
//! one disk write is ever queued and the last snapshot wins.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

/// A file replaced atomically via a temp sibling and rename.
pub struct AtomicFile {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl AtomicFile {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        Self {
            path,
            tmp_path: PathBuf::from(tmp),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current contents in full.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        File::open(&self.path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Replace the contents with `data`. Either the whole write lands or the
    /// previous contents survive; a failed attempt removes its temp file.
    pub fn write(&self, data: &[u8]) -> std::io::Result<()> {
        let result = self.write_inner(data);
        if result.is_err() {
            let _ = fs::remove_file(&self.tmp_path);
        }
        result
    }

    fn write_inner(&self, data: &[u8]) -> std::io::Result<()> {
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.tmp_path)?;
        tmp.write_all(data)?;
        tmp.sync_all()?;
        drop(tmp);
        fs::rename(&self.tmp_path, &self.path)
    }
}

/// Write scheduler for serialized stats blobs.
///
/// Two locks, mirroring the snapshot contract:
/// - the *pending* lock guards the one-deep blob slot;
/// - the *serializer* lock guards the disk I/O and is acquired while the
///   pending lock is still held, so commits drain the slot in order.
///
/// The pending lock is only ever held briefly; disk I/O happens under the
/// serializer lock alone.
pub struct Persistor {
    file: AtomicFile,
    pending: Mutex<Option<Vec<u8>>>,
    serializer: Mutex<()>,
}

impl Persistor {
    /// Persistor for `<base_dir>/<file_name>`, creating the directory.
    pub fn new(base_dir: &Path, file_name: &str) -> std::io::Result<Self> {
        fs::create_dir_all(base_dir)?;
        Ok(Self {
            file: AtomicFile::new(base_dir.join(file_name)),
            pending: Mutex::new(None),
            serializer: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn file(&self) -> &AtomicFile {
        &self.file
    }

    /// Read the persisted blob, or `None` when no file exists yet.
    pub fn read(&self) -> std::io::Result<Option<Vec<u8>>> {
        match self.file.read() {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Park `blob` in the pending slot and commit it: inline when `sync`,
    /// otherwise from a background thread. Replaces any blob still waiting.
    pub fn schedule(self: &Arc<Self>, blob: Vec<u8>, sync: bool) {
        *self.pending.lock().expect("pending lock") = Some(blob);
        if sync {
            self.commit();
        } else {
            let this = Arc::clone(self);
            std::thread::spawn(move || this.commit());
        }
    }

    /// Drain the pending slot to disk. A no-op when another commit already
    /// took the blob.
    pub fn commit(&self) {
        let data: Vec<u8>;
        let _serializer: MutexGuard<'_, ()>;
        {
            let mut pending = self.pending.lock().expect("pending lock");
            match pending.take() {
                Some(blob) => {
                    // Take the serializer lock before releasing the slot so
                    // a racing commit cannot write a newer blob first.
                    _serializer = self.serializer.lock().expect("serializer lock");
                    data = blob;
                }
                None => return,
            }
        }

        match self.file.write(&data) {
            Ok(()) => debug!(path = %self.file.path().display(), bytes = data.len(), "committed stats"),
            Err(err) => warn!("error writing process statistics: {err}"),
        }
    }

    /// True when a blob is parked awaiting commit.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.lock().expect("pending lock").is_some()
    }
}
