//! Segment registry.
//!
//! The registry is the durable list of persistent segment names plus the
//! counter used to mint new ones. Every name it lists must exist on disk;
//! a segment directory it does not list is garbage.
//!
//! ## Format (big-endian)
//!
//! ```text
//! | counter (i32) | count (i32) | count x (len: u16 | utf-8 name) |
//! ```
//!
//! ## Rewrite
//!
//! 1. Serialize to `segments.new` and fsync it
//! 2. Delete `segments`
//! 3. Rename `segments.new` to `segments` and fsync the directory
//!
//! A crash between 2 and 3 leaves only `segments.new`, which the next read
//! adopts.

use crate::dir::sync_directory;
use crate::error::{IndexError, IndexResult};
use crate::types::SegmentName;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffix of the temporary file used during a rewrite.
const TEMP_SUFFIX: &str = ".new";

/// Durable ledger of persistent segment names.
#[derive(Debug)]
pub struct SegmentRegistry {
    path: PathBuf,
    counter: u32,
    names: Vec<SegmentName>,
    dirty: bool,
}

impl SegmentRegistry {
    /// Opens the registry stored at `path`, reading it if present.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing registry file cannot be read or
    /// decoded.
    pub fn open(path: impl Into<PathBuf>) -> IndexResult<Self> {
        let mut registry = Self {
            path: path.into(),
            counter: 0,
            names: Vec::new(),
            dirty: false,
        };
        registry.read()?;
        Ok(registry)
    }

    /// Path of the registry file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(TEMP_SUFFIX);
        PathBuf::from(name)
    }

    /// Reloads counter and names from disk, discarding unsaved changes.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Index`] for a corrupt file, or an I/O error.
    pub fn read(&mut self) -> IndexResult<()> {
        let temp = self.temp_path();
        let (counter, names) = match fs::read(&self.path) {
            Ok(bytes) => {
                if temp.exists() {
                    warn!(path = %temp.display(), "removing stale registry rewrite");
                    fs::remove_file(&temp)?;
                }
                Self::decode(&bytes)?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => match fs::read(&temp) {
                Ok(bytes) => {
                    let decoded = Self::decode(&bytes)?;
                    warn!(path = %temp.display(), "adopting interrupted registry rewrite");
                    fs::rename(&temp, &self.path)?;
                    decoded
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => (0, Vec::new()),
                Err(e) => return Err(e.into()),
            },
            Err(e) => return Err(e.into()),
        };
        self.counter = counter;
        self.names = names;
        self.dirty = false;
        Ok(())
    }

    /// Mints a fresh segment name.
    pub fn new_name(&mut self) -> SegmentName {
        let name = SegmentName::from_counter(self.counter);
        self.counter += 1;
        self.dirty = true;
        name
    }

    /// Registers a segment.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidArgument`] if the name is already listed.
    pub fn add_name(&mut self, name: SegmentName) -> IndexResult<()> {
        if self.names.contains(&name) {
            return Err(IndexError::invalid_argument(format!(
                "segment {name} is already registered"
            )));
        }
        self.names.push(name);
        self.dirty = true;
        Ok(())
    }

    /// Unregisters a segment, returning whether it was listed.
    pub fn remove_name(&mut self, name: &SegmentName) -> bool {
        let before = self.names.len();
        self.names.retain(|n| n != name);
        let removed = self.names.len() != before;
        self.dirty |= removed;
        removed
    }

    /// Registered names in registration order.
    #[must_use]
    pub fn names(&self) -> &[SegmentName] {
        &self.names
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &SegmentName) -> bool {
        self.names.contains(name)
    }

    /// Current counter value.
    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Returns true if there are unsaved changes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Forgets every name, keeping the counter.
    pub fn clear(&mut self) {
        if !self.names.is_empty() {
            self.names.clear();
            self.dirty = true;
        }
    }

    /// Atomically rewrites the registry file if anything changed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if any step fails; the previous durable file is
    /// left in place unless it had already been deleted, in which case the
    /// fully written temporary file is adopted on the next read.
    pub fn write(&mut self) -> IndexResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let bytes = self.encode()?;
        let temp = self.temp_path();

        let mut file = File::create(&temp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::rename(&temp, &self.path)?;
        if let Some(dir) = self.path.parent() {
            sync_directory(dir)?;
        }

        self.dirty = false;
        debug!(segments = self.names.len(), counter = self.counter, "registry written");
        Ok(())
    }

    fn encode(&self) -> IndexResult<Vec<u8>> {
        let counter = i32::try_from(self.counter)
            .map_err(|_| IndexError::index("segment counter overflow"))?;
        let count = i32::try_from(self.names.len())
            .map_err(|_| IndexError::index("too many segments"))?;

        let mut buf = Vec::with_capacity(8 + self.names.len() * 8);
        buf.extend_from_slice(&counter.to_be_bytes());
        buf.extend_from_slice(&count.to_be_bytes());
        for name in &self.names {
            let bytes = name.as_str().as_bytes();
            let len = u16::try_from(bytes.len())
                .map_err(|_| IndexError::index(format!("segment name too long: {name}")))?;
            buf.extend_from_slice(&len.to_be_bytes());
            buf.extend_from_slice(bytes);
        }
        Ok(buf)
    }

    fn decode(data: &[u8]) -> IndexResult<(u32, Vec<SegmentName>)> {
        let mut cursor = 0;

        let counter = read_i32(data, &mut cursor)?;
        let counter = u32::try_from(counter)
            .map_err(|_| IndexError::index(format!("negative segment counter {counter}")))?;
        let count = read_i32(data, &mut cursor)?;
        let count = usize::try_from(count)
            .map_err(|_| IndexError::index(format!("negative segment count {count}")))?;

        let mut names = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            if cursor + 2 > data.len() {
                return Err(IndexError::index("registry truncated"));
            }
            let len = u16::from_be_bytes([data[cursor], data[cursor + 1]]) as usize;
            cursor += 2;
            if cursor + len > data.len() {
                return Err(IndexError::index("registry truncated"));
            }
            let name = std::str::from_utf8(&data[cursor..cursor + len])
                .map_err(|_| IndexError::index("registry name is not UTF-8"))?;
            cursor += len;
            names.push(SegmentName::parse(name)?);
        }

        if cursor != data.len() {
            return Err(IndexError::index(format!(
                "{} trailing bytes in registry",
                data.len() - cursor
            )));
        }
        Ok((counter, names))
    }
}

fn read_i32(data: &[u8], cursor: &mut usize) -> IndexResult<i32> {
    let bytes: [u8; 4] = data
        .get(*cursor..*cursor + 4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| IndexError::index("registry truncated"))?;
    *cursor += 4;
    Ok(i32::from_be_bytes(bytes))
}
