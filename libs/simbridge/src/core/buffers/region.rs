// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! File-backed shared memory region.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU32;

use memmap2::MmapMut;

use super::layout::{BufferKind, RegionLayout, HEADER_SIZE};
use crate::core::dtype::DType;
use crate::core::error::{BridgeError, Result};

const MAGIC: [u8; 8] = *b"SIMBRDG1";
const VERSION: u32 = 1;

const MAGIC_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 8;
const RENDEZVOUS_OFFSET: usize = 12;
const N_OFFSET: usize = 16;
const NN_OFFSET: usize = 24;
const DTYPE_OFFSET: usize = 32;

/// A mapped view of the shared region file.
///
/// The simulation side [`create`](Self::create)s the file and owns its
/// contents; the compute side [`open`](Self::open)s it and only ever holds
/// views into it. The mapping stays valid until the last `Arc` is dropped.
pub struct SharedRegion {
    path: PathBuf,
    layout: RegionLayout,
    base: *mut u8,
    len: usize,
    _mmap: MmapMut,
}

// SAFETY: the region is plain shared memory. Concurrent access to the buffer
// area is serialized by the rendezvous turn (one side at a time), and the
// rendezvous word itself is only touched through `AtomicU32`.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Create (or truncate) the region file at `path` and write its header.
    ///
    /// Buffers start zeroed and the rendezvous word starts with the
    /// simulation side holding the turn.
    pub fn create(path: impl AsRef<Path>, layout: RegionLayout) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                BridgeError::Buffer(format!("Failed to create region {}: {}", path.display(), e))
            })?;
        let len = layout.total_len();
        file.set_len(len as u64)?;

        // SAFETY: the file was just created and sized by us; other processes
        // only map it after the startup message names it.
        let mut mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| {
            BridgeError::Buffer(format!("Failed to map region {}: {}", path.display(), e))
        })?;

        mmap[VERSION_OFFSET..VERSION_OFFSET + 4].copy_from_slice(&VERSION.to_ne_bytes());
        mmap[N_OFFSET..N_OFFSET + 8].copy_from_slice(&(layout.n as u64).to_ne_bytes());
        mmap[NN_OFFSET..NN_OFFSET + 8].copy_from_slice(&(layout.nn as u64).to_ne_bytes());
        mmap[DTYPE_OFFSET..DTYPE_OFFSET + 4].copy_from_slice(&layout.dtype.code().to_ne_bytes());
        mmap[MAGIC_OFFSET..MAGIC_OFFSET + 8].copy_from_slice(&MAGIC);

        let base = mmap.as_mut_ptr();
        tracing::info!(
            "Created shared region {} ({} bytes, N={}, NN={}, {}) at {:#x}",
            path.display(),
            len,
            layout.n,
            layout.nn,
            layout.dtype,
            base as usize
        );

        Ok(Self {
            path: path.to_path_buf(),
            layout,
            base,
            len,
            _mmap: mmap,
        })
    }

    /// Map an existing region and validate its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                BridgeError::Buffer(format!("Failed to open region {}: {}", path.display(), e))
            })?;
        let file_len = file.metadata()?.len() as usize;
        if file_len < HEADER_SIZE {
            return Err(BridgeError::Buffer(format!(
                "Region {} is {} bytes, smaller than its header",
                path.display(),
                file_len
            )));
        }

        // SAFETY: the simulation side keeps the file at this size for the run.
        let mut mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| {
            BridgeError::Buffer(format!("Failed to map region {}: {}", path.display(), e))
        })?;

        if mmap[MAGIC_OFFSET..MAGIC_OFFSET + 8] != MAGIC {
            return Err(BridgeError::Buffer(format!(
                "{} is not a shared buffer region",
                path.display()
            )));
        }
        let version = read_u32(&mmap, VERSION_OFFSET);
        if version != VERSION {
            return Err(BridgeError::Buffer(format!(
                "Region {} has version {}, expected {}",
                path.display(),
                version,
                VERSION
            )));
        }
        let dtype_code = read_u32(&mmap, DTYPE_OFFSET);
        let dtype = DType::from_code(dtype_code).ok_or_else(|| {
            BridgeError::Buffer(format!("Region {} has unknown dtype code {}", path.display(), dtype_code))
        })?;
        let layout = RegionLayout::new(
            read_u64(&mmap, N_OFFSET) as usize,
            read_u64(&mmap, NN_OFFSET) as usize,
            dtype,
        );
        if layout.total_len() != file_len {
            return Err(BridgeError::Buffer(format!(
                "Region {} is {} bytes but its header describes {}",
                path.display(),
                file_len,
                layout.total_len()
            )));
        }

        let base = mmap.as_mut_ptr();
        tracing::info!(
            "Mapped shared region {} (N={}, NN={}, {}) at {:#x}",
            path.display(),
            layout.n,
            layout.nn,
            layout.dtype,
            base as usize
        );

        Ok(Self {
            path: path.to_path_buf(),
            layout,
            base,
            len: file_len,
            _mmap: mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> RegionLayout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address of this process's mapping.
    pub fn base_address(&self) -> usize {
        self.base as usize
    }

    /// Local address of the first element of `kind`.
    pub fn buffer_address(&self, kind: BufferKind) -> usize {
        self.base_address() + self.layout.offset(kind)
    }

    pub(crate) fn buffer_ptr(&self, kind: BufferKind) -> *mut u8 {
        // SAFETY: offsets come from the layout validated against the file length.
        unsafe { self.base.add(self.layout.offset(kind)) }
    }

    /// The word both sides synchronize the turn on.
    pub(crate) fn rendezvous_word(&self) -> &AtomicU32 {
        // SAFETY: the header is inside the mapping, the offset is 4-byte
        // aligned, and the word is only ever accessed atomically.
        unsafe { AtomicU32::from_ptr(self.base.add(RENDEZVOUS_OFFSET).cast::<u32>()) }
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("path", &self.path)
            .field("layout", &self.layout)
            .field("base", &format_args!("{:#x}", self.base as usize))
            .finish()
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_ne_bytes(raw)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_ne_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_reads_back_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("region.shm");
        let layout = RegionLayout::new(4, 2, DType::Float32);
        let created = SharedRegion::create(&path, layout).unwrap();

        let opened = SharedRegion::open(&path).unwrap();
        assert_eq!(opened.layout(), layout);
        assert_eq!(opened.len(), created.len());
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("not-a-region");
        std::fs::write(&path, vec![7u8; 256]).unwrap();
        assert!(matches!(SharedRegion::open(&path), Err(BridgeError::Buffer(_))));
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short");
        std::fs::write(&path, b"tiny").unwrap();
        assert!(SharedRegion::open(&path).is_err());
    }
}
