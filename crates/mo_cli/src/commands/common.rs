//! Opaque snapshot entries.
//!
//! The CLI has no native object kinds of its own, so every entry is kept as the blob it was
//! saved as. One store backs every type name, which keeps addresses unique across types.

use std::cell::RefCell;
use std::fs::File;
use std::io::BufReader;
use std::rc::Rc;

use mo_core::{FastHashMap, Handle, NativeAddress, ObjectKind, fast_map_new};
use mo_runtime::{
    ManagedObjectPool, ObjectReader, PoolError, SerializeOutcome, SnapshotSummary, TypeManager,
};

#[derive(Default)]
pub(crate) struct BlobStore {
    blobs: RefCell<Vec<Option<Vec<u8>>>>,
}

impl BlobStore {
    fn insert(&self, blob: &[u8]) -> NativeAddress {
        let mut blobs = self.blobs.borrow_mut();
        blobs.push(Some(blob.to_vec()));
        NativeAddress(blobs.len() as u64)
    }

    fn slot(address: NativeAddress) -> Option<usize> {
        (address.0 as usize).checked_sub(1)
    }

    pub(crate) fn len_of(&self, address: NativeAddress) -> Option<usize> {
        let blobs = self.blobs.borrow();
        blobs.get(Self::slot(address)?)?.as_ref().map(Vec::len)
    }

    fn remove(&self, address: NativeAddress) {
        if let Some(slot) = Self::slot(address) {
            if let Some(blob) = self.blobs.borrow_mut().get_mut(slot) {
                *blob = None;
            }
        }
    }
}

/// Pass-through manager: saves exactly the bytes it was restored from.
pub(crate) struct BlobManager {
    type_name: String,
    store: Rc<BlobStore>,
}

impl TypeManager for BlobManager {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn serialize(&self, address: NativeAddress, buf: &mut [u8]) -> SerializeOutcome {
        let blobs = self.store.blobs.borrow();
        let Some(blob) = BlobStore::slot(address).and_then(|i| blobs.get(i)?.as_ref()) else {
            return SerializeOutcome::Written(0);
        };
        if buf.len() < blob.len() {
            return SerializeOutcome::NeedsAtLeast(blob.len());
        }
        buf[..blob.len()].copy_from_slice(blob);
        SerializeOutcome::Written(blob.len())
    }

    fn unserialize(&self, blob: &[u8]) -> Result<(NativeAddress, ObjectKind), PoolError> {
        Ok((self.store.insert(blob), ObjectKind::Dynamic))
    }

    fn dispose(&self, address: NativeAddress, _forced: bool, _pool: &mut ManagedObjectPool) -> bool {
        log::debug!("dropping unreferenced {} at {address}", self.type_name);
        self.store.remove(address);
        true
    }
}

/// Creates a [`BlobManager`] for each type name the snapshot mentions.
pub(crate) struct BlobReader {
    store: Rc<BlobStore>,
    managers: FastHashMap<String, Rc<BlobManager>>,
}

impl BlobReader {
    pub(crate) fn new() -> Self {
        Self {
            store: Rc::default(),
            managers: fast_map_new(),
        }
    }

    pub(crate) fn store(&self) -> &BlobStore {
        &self.store
    }

    fn manager(&mut self, type_name: &str) -> Rc<BlobManager> {
        let store = &self.store;
        Rc::clone(
            self.managers
                .entry(type_name.to_string())
                .or_insert_with(|| {
                    Rc::new(BlobManager {
                        type_name: type_name.to_string(),
                        store: Rc::clone(store),
                    })
                }),
        )
    }
}

impl ObjectReader for BlobReader {
    fn reconstruct(
        &mut self,
        pool: &mut ManagedObjectPool,
        handle: Handle,
        type_name: &str,
        blob: &[u8],
    ) -> Result<(), PoolError> {
        let manager = self.manager(type_name);
        let (address, kind) = manager.unserialize(blob)?;
        pool.allocate_with_handle(address, manager, kind, handle)?;
        Ok(())
    }
}

pub(crate) struct Loaded {
    pub pool: ManagedObjectPool,
    pub summary: SnapshotSummary,
    pub reader: BlobReader,
}

/// Reads a snapshot file. Exits 2 when the file cannot be opened and 1 when it does not
/// parse.
pub(crate) fn load_or_exit(path: &str) -> Loaded {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Read failed: {path}: {e}");
            std::process::exit(2);
        }
    };
    let mut pool = ManagedObjectPool::new();
    let mut reader = BlobReader::new();
    match pool.deserialize(&mut BufReader::new(file), &mut reader) {
        Ok(summary) => {
            log::info!("{path}: version {}, {} objects", summary.version, summary.restored);
            Loaded {
                pool,
                summary,
                reader,
            }
        }
        Err(e) => {
            eprintln!("{path}: {e}");
            std::process::exit(1);
        }
    }
}
