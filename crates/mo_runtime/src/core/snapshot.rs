//! Saving and restoring the pool.
//!
//! All integers are little-endian 32-bit:
//!
//! ```text
//! [magic][version][count]
//! v1: count is the saved high-water mark; slots 1..count follow in order as
//!     [type name\0][blob len][blob][refcount], a lone empty type name marks a free slot
//! v2: count live entries follow as [handle][type name\0][blob len][blob][refcount]
//! ```
//!
//! Saving always writes version 2. Loading accepts both.

use std::io::{self, Read, Write};
use std::rc::Rc;

use mo_core::Handle;

use super::manager::{ObjectReader, SerializeOutcome, TypeManager};
use super::pool::ManagedObjectPool;
use crate::errors::PoolError;

pub const SNAPSHOT_MAGIC: i32 = 0xa30b;
pub const SNAPSHOT_VERSION: i32 = 2;
pub const LEGACY_SNAPSHOT_VERSION: i32 = 1;

const MAX_TYPE_NAME: usize = 1024;

/// What a successful load found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub version: i32,
    pub restored: usize,
}

impl ManagedObjectPool {
    /// Writes every referenced object. Unreferenced objects are swept first so they are
    /// not saved. Returns the number of entries written.
    ///
    /// The snapshot is assembled in memory; `sink` receives nothing unless every object
    /// saved successfully.
    pub fn serialize<W: Write>(&mut self, sink: &mut W) -> Result<usize, PoolError> {
        self.run_gc();
        let handles: Vec<Handle> = self.live_handles().collect();

        let mut image: Vec<u8> = Vec::new();
        write_i32(&mut image, SNAPSHOT_MAGIC)?;
        write_i32(&mut image, SNAPSHOT_VERSION)?;
        write_i32(&mut image, handles.len() as i32)?;

        for &handle in &handles {
            let Some(object) = self.handle_to_object(handle) else {
                return Err(PoolError::Corrupt("object vanished while saving"));
            };
            let address = object.address;
            let ref_count = object.ref_count;
            let manager = Rc::clone(&object.manager);
            let type_name = manager.type_name();
            if type_name.is_empty() {
                return Err(PoolError::EmptyTypeName(handle));
            }
            if type_name.len() >= MAX_TYPE_NAME || type_name.as_bytes().contains(&0) {
                return Err(PoolError::Corrupt("type name cannot be stored"));
            }

            let len = self.save_object(manager.as_ref(), address)?;
            write_i32(&mut image, handle.get())?;
            write_cstr(&mut image, type_name)?;
            write_i32(&mut image, len as i32)?;
            image.write_all(&self.serialize_buffer[..len])?;
            write_i32(&mut image, ref_count)?;
        }
        sink.write_all(&image)?;
        log::debug!("serialize: wrote {} objects, {} bytes", handles.len(), image.len());
        Ok(handles.len())
    }

    /// Saves one object into the scratch buffer, growing it once if the manager asks.
    fn save_object(
        &mut self,
        manager: &dyn TypeManager,
        address: mo_core::NativeAddress,
    ) -> Result<usize, PoolError> {
        let outcome = match manager.serialize(address, &mut self.serialize_buffer) {
            SerializeOutcome::NeedsAtLeast(needed) => {
                log::debug!(
                    "serialize: growing buffer from {} to {needed} bytes for {}",
                    self.serialize_buffer.len(),
                    manager.type_name()
                );
                if needed > self.serialize_buffer.len() {
                    self.serialize_buffer.resize(needed, 0);
                }
                manager.serialize(address, &mut self.serialize_buffer)
            }
            written => written,
        };
        match outcome {
            SerializeOutcome::Written(len) if len <= self.serialize_buffer.len() => Ok(len),
            SerializeOutcome::Written(_) => {
                Err(PoolError::Corrupt("manager wrote past the serialize buffer"))
            }
            SerializeOutcome::NeedsAtLeast(needed) => Err(PoolError::SerializeBufferRejected {
                type_name: manager.type_name().to_string(),
                needed,
            }),
        }
    }

    /// Restores objects from a snapshot. Each entry is handed to `reader`, which must
    /// register the re-created object under the saved handle; afterwards the recycle queue
    /// is rebuilt from the final occupancy.
    pub fn deserialize<R: Read>(
        &mut self,
        input: &mut R,
        reader: &mut dyn ObjectReader,
    ) -> Result<SnapshotSummary, PoolError> {
        let magic = read_i32(input)?;
        if magic != SNAPSHOT_MAGIC {
            log::error!("deserialize: bad signature {magic:#x}");
            return Err(PoolError::BadMagic(magic));
        }
        let version = read_i32(input)?;
        let restored = match version {
            LEGACY_SNAPSHOT_VERSION => self.read_legacy_entries(input, reader)?,
            SNAPSHOT_VERSION => self.read_entries(input, reader)?,
            other => {
                log::error!("deserialize: unsupported version {other}");
                return Err(PoolError::UnsupportedVersion(other));
            }
        };
        self.rebuild_free_handles();
        log::debug!(
            "deserialize: restored {restored} objects (v{version}), next handle {}",
            self.next_handle()
        );
        Ok(SnapshotSummary { version, restored })
    }

    fn read_legacy_entries<R: Read>(
        &mut self,
        input: &mut R,
        reader: &mut dyn ObjectReader,
    ) -> Result<usize, PoolError> {
        let high_water = read_i32(input)?;
        let mut restored = 0;
        for index in 1..high_water {
            let type_name = read_cstr(input)?;
            if type_name.is_empty() {
                continue;
            }
            self.restore_entry(input, reader, Handle(index), &type_name)?;
            restored += 1;
        }
        Ok(restored)
    }

    fn read_entries<R: Read>(
        &mut self,
        input: &mut R,
        reader: &mut dyn ObjectReader,
    ) -> Result<usize, PoolError> {
        let count = read_i32(input)?;
        if count < 0 {
            return Err(PoolError::Corrupt("negative object count"));
        }
        for _ in 0..count {
            let handle = Handle(read_i32(input)?);
            let type_name = read_cstr(input)?;
            self.restore_entry(input, reader, handle, &type_name)?;
        }
        Ok(count as usize)
    }

    fn restore_entry<R: Read>(
        &mut self,
        input: &mut R,
        reader: &mut dyn ObjectReader,
        handle: Handle,
        type_name: &str,
    ) -> Result<(), PoolError> {
        if handle.get() < 1 || handle.get() as usize > self.config().max_handles {
            log::error!("deserialize: {type_name} saved under invalid handle {}", handle.get());
            return Err(PoolError::InvalidHandle(handle.get()));
        }
        let len = read_i32(input)?;
        if len < 0 {
            return Err(PoolError::Corrupt("negative blob length"));
        }
        let mut blob = Vec::new();
        Read::take(&mut *input, len as u64).read_to_end(&mut blob)?;
        if blob.len() != len as usize {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        let ref_count = read_i32(input)?;

        reader.reconstruct(self, handle, type_name, &blob)?;
        if !self.set_ref_count(handle, ref_count) {
            return Err(PoolError::NotReconstructed {
                handle,
                type_name: type_name.to_string(),
            });
        }
        log::trace!("deserialize: {handle} {type_name} ({len} bytes, refcount {ref_count})");
        Ok(())
    }
}

pub(crate) fn write_i32<W: Write + ?Sized>(out: &mut W, value: i32) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

pub(crate) fn read_i32<R: Read + ?Sized>(input: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn write_cstr<W: Write + ?Sized>(out: &mut W, s: &str) -> io::Result<()> {
    out.write_all(s.as_bytes())?;
    out.write_all(&[0])
}

fn read_cstr<R: Read + ?Sized>(input: &mut R) -> Result<String, PoolError> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        input.read_exact(&mut byte)?;
        if byte[0] == 0 {
            break;
        }
        if bytes.len() >= MAX_TYPE_NAME {
            return Err(PoolError::Corrupt("unterminated type name"));
        }
        bytes.push(byte[0]);
    }
    String::from_utf8(bytes).map_err(|_| PoolError::Corrupt("type name is not UTF-8"))
}
