//! Key-value storage collaborator

use crate::error::Result;
use crate::types::ByteString;
use parking_lot::RwLock;
use std::collections::HashMap;

/// A single write inside a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(ByteString, ByteString),
    Delete(ByteString),
}

/// Persistent key-value store.
///
/// `get` distinguishes a missing key (`Ok(None)`) from a failing store (`Err`);
/// any `Err` is treated as fatal by the chain.
pub trait Storage: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<ByteString>>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Apply all ops or none. The default applies them in order and is only
    /// atomic if the backend never fails midway.
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        for op in ops {
            match op {
                BatchOp::Put(key, value) => self.put(&key, &value)?,
                BatchOp::Delete(key) => self.delete(&key)?,
            }
        }
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<ByteString, ByteString>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<ByteString>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        let mut data = self.data.write();
        for op in ops {
            match op {
                BatchOp::Put(key, value) => {
                    data.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let db = MemoryStorage::new();
        assert_eq!(db.get(b"k").unwrap(), None);

        db.put(b"k", b"v").unwrap();
        assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));

        db.delete(b"k").unwrap();
        assert_eq!(db.get(b"k").unwrap(), None);
        assert!(db.is_empty());
    }

    #[test]
    fn test_write_batch() {
        let db = MemoryStorage::new();
        db.put(b"old", b"1").unwrap();
        db.write_batch(vec![
            BatchOp::Put(b"a".to_vec(), b"2".to_vec()),
            BatchOp::Put(b"b".to_vec(), b"3".to_vec()),
            BatchOp::Delete(b"old".to_vec()),
        ])
        .unwrap();
        assert_eq!(db.len(), 2);
        assert_eq!(db.get(b"old").unwrap(), None);
        assert_eq!(db.get(b"b").unwrap(), Some(b"3".to_vec()));
    }
}
