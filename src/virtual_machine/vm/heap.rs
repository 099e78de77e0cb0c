use crate::storage::record_file::{RecordFile, StorageError};
use crate::virtual_machine::errors::VMError;
use crate::warn;
use std::collections::BTreeMap;
use std::path::Path;

/// Key-addressed byte buffers owned by the VM.
///
/// Entries iterate in ascending key order. When a [`RecordFile`] is attached
/// every mutation is written through to it before the call returns.
#[derive(Debug, Default)]
pub struct Heap {
    entries: BTreeMap<i32, Vec<u8>>,
    /// Write-through target; `None` keeps the heap in memory only.
    record_file: Option<RecordFile>,
}

impl Heap {
    /// Creates an empty in-memory heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the heap from the record file at `path`.
    ///
    /// With `writeable` the file becomes the write-through target and is
    /// created empty if missing. Without it a missing file only warns and the
    /// heap starts empty.
    pub fn open<P: AsRef<Path>>(path: P, writeable: bool) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let file = RecordFile::new(path);
        if !file.exists() {
            if !writeable {
                warn!(
                    "record file {} not found, starting with an empty heap",
                    path.display()
                );
                return Ok(Self::new());
            }
            RecordFile::create(path)?;
        }

        let snapshot = file.read()?;
        let entries = snapshot
            .records
            .into_iter()
            .map(|record| (record.key, record.data))
            .collect();
        Ok(Self {
            entries,
            record_file: writeable.then_some(file),
        })
    }

    pub fn is_write_through(&self) -> bool {
        self.record_file.is_some()
    }

    pub fn find(&self, key: i32) -> Option<&[u8]> {
        self.entries.get(&key).map(Vec::as_slice)
    }

    /// Like [`Heap::find`], but a missing key is an error.
    pub fn get(&self, key: i32) -> Result<&[u8], VMError> {
        self.find(key).ok_or(VMError::HeapKey { key })
    }

    /// Adds or replaces the entry for `key`.
    pub fn insert(&mut self, key: i32, data: Vec<u8>) -> Result<(), StorageError> {
        if let Some(file) = &self.record_file {
            file.append(key, &data)?;
        }
        self.entries.insert(key, data);
        Ok(())
    }

    /// Removes and returns the entry for `key`.
    pub fn delete(&mut self, key: i32) -> Result<Option<Vec<u8>>, StorageError> {
        let removed = self.entries.remove(&key);
        if removed.is_some()
            && let Some(file) = &self.record_file
        {
            file.remove(key)?;
        }
        Ok(removed)
    }

    /// Replaces the entry for `key`: delete, then insert.
    pub fn store(&mut self, key: i32, data: Vec<u8>) -> Result<(), StorageError> {
        self.delete(key)?;
        self.insert(key, data)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &[u8])> + '_ {
        self.entries.iter().map(|(key, data)| (*key, data.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all entry lengths.
    pub fn total_bytes(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::scratch_file;
    use proptest::prelude::*;

    #[test]
    fn get_missing_key() {
        let heap = Heap::new();
        assert!(heap.find(3).is_none());
        assert!(matches!(heap.get(3), Err(VMError::HeapKey { key: 3 })));
    }

    #[test]
    fn store_replaces_and_iterates_sorted() {
        let mut heap = Heap::new();
        heap.insert(9, vec![1]).unwrap();
        heap.insert(-2, vec![2, 2]).unwrap();
        heap.store(9, vec![3, 3, 3]).unwrap();
        let keys: Vec<i32> = heap.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![-2, 9]);
        assert_eq!(heap.get(9).unwrap(), &[3, 3, 3]);
        assert_eq!(heap.total_bytes(), 5);
        assert_eq!(heap.delete(-2).unwrap(), Some(vec![2, 2]));
        assert_eq!(heap.delete(-2).unwrap(), None);
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn missing_file_read_only_starts_empty() {
        let (_dir, path) = scratch_file("boot.dat");
        let heap = Heap::open(&path, false).unwrap();
        assert!(heap.is_empty());
        assert!(!heap.is_write_through());
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_writeable_is_created() {
        let (_dir, path) = scratch_file("boot.dat");
        let heap = Heap::open(&path, true).unwrap();
        assert!(heap.is_write_through());
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn read_only_heap_leaves_file_alone() {
        let (_dir, path) = scratch_file("boot.dat");
        Heap::open(&path, true).unwrap().insert(1, vec![5]).unwrap();
        let before = std::fs::read(&path).unwrap();

        let mut heap = Heap::open(&path, false).unwrap();
        assert_eq!(heap.get(1).unwrap(), &[5]);
        heap.store(1, vec![6]).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn delete_is_written_through() {
        let (_dir, path) = scratch_file("boot.dat");
        let mut heap = Heap::open(&path, true).unwrap();
        heap.insert(1, vec![1]).unwrap();
        heap.insert(2, vec![2]).unwrap();
        heap.delete(1).unwrap();
        let reloaded = Heap::open(&path, false).unwrap();
        assert!(reloaded.find(1).is_none());
        assert_eq!(reloaded.get(2).unwrap(), &[2]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]
        #[test]
        fn reload_reproduces_heap(
            writes in prop::collection::vec((-50i32..50, prop::collection::vec(any::<u8>(), 0..32)), 0..12)
        ) {
            let (_dir, path) = scratch_file("boot.dat");
            let mut heap = Heap::open(&path, true).unwrap();
            for (key, data) in &writes {
                heap.store(*key, data.clone()).unwrap();
            }

            let reloaded = Heap::open(&path, true).unwrap();
            let expected: Vec<_> = heap.iter().collect();
            let actual: Vec<_> = reloaded.iter().collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
