//! Handle and correlation-id index of tracked windows
//!
//! The registry owns every [`WindowRecord`]. It keeps two maps that are
//! always exact inverses of each other: handle to record, and cid to handle.

use anyhow::{bail, Result};
use std::collections::{BTreeMap, HashMap};

use super::WindowRecord;
use crate::ids::CorrelationId;
use crate::native::WindowHandle;

#[derive(Debug, Default)]
pub struct WindowRegistry {
    by_handle: HashMap<WindowHandle, WindowRecord>,
    by_cid: BTreeMap<CorrelationId, WindowHandle>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record. Fails if its handle or cid is already tracked.
    pub fn insert(&mut self, record: WindowRecord) -> Result<()> {
        if self.by_handle.contains_key(&record.handle()) {
            bail!("Window {} is already tracked", record.handle());
        }
        if self.by_cid.contains_key(&record.cid()) {
            bail!("Correlation id {} is already in use", record.cid());
        }
        self.by_cid.insert(record.cid(), record.handle());
        self.by_handle.insert(record.handle(), record);
        Ok(())
    }

    pub fn contains(&self, handle: WindowHandle) -> bool {
        self.by_handle.contains_key(&handle)
    }

    pub fn get(&self, handle: WindowHandle) -> Option<&WindowRecord> {
        self.by_handle.get(&handle)
    }

    pub fn get_mut(&mut self, handle: WindowHandle) -> Option<&mut WindowRecord> {
        self.by_handle.get_mut(&handle)
    }

    pub fn handle_for(&self, cid: CorrelationId) -> Option<WindowHandle> {
        self.by_cid.get(&cid).copied()
    }

    pub fn get_by_cid(&self, cid: CorrelationId) -> Option<&WindowRecord> {
        self.handle_for(cid).and_then(|handle| self.by_handle.get(&handle))
    }

    /// Removes a window from both maps. Removing an untracked handle is a
    /// no-op returning `None`.
    pub fn remove(&mut self, handle: WindowHandle) -> Option<WindowRecord> {
        let record = self.by_handle.remove(&handle)?;
        self.by_cid.remove(&record.cid());
        Some(record)
    }

    /// Moves a record to a new handle, keeping its cid. Returns false when
    /// `old` is not tracked or `new` already is.
    pub fn rekey(&mut self, old: WindowHandle, new: WindowHandle) -> bool {
        if old == new || self.by_handle.contains_key(&new) {
            return false;
        }
        let Some(mut record) = self.by_handle.remove(&old) else {
            return false;
        };
        record.rekey(new);
        self.by_cid.insert(record.cid(), new);
        self.by_handle.insert(new, record);
        true
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    /// Records in cid (admission) order.
    pub fn records(&self) -> impl Iterator<Item = &WindowRecord> {
        self.by_cid
            .values()
            .filter_map(move |handle| self.by_handle.get(handle))
    }

    /// Removes and returns every record in cid order.
    pub fn drain(&mut self) -> Vec<WindowRecord> {
        let handles: Vec<_> = std::mem::take(&mut self.by_cid).into_values().collect();
        handles
            .into_iter()
            .filter_map(|handle| self.by_handle.remove(&handle))
            .collect()
    }

    /// True when the two maps are exact inverses.
    pub fn is_consistent(&self) -> bool {
        self.by_handle.len() == self.by_cid.len()
            && self.by_handle.iter().all(|(handle, record)| {
                record.handle() == *handle && self.by_cid.get(&record.cid()) == Some(handle)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::ProcessId;
    use proptest::prelude::*;

    fn record(cid: u64, handle: u64) -> WindowRecord {
        WindowRecord::new(
            CorrelationId(cid),
            WindowHandle(handle),
            "Edit".to_string(),
            String::new(),
            String::new(),
            ProcessId(1),
            true,
        )
    }

    #[test]
    fn test_insert_and_lookup() -> Result<()> {
        let mut registry = WindowRegistry::new();
        registry.insert(record(1, 0x10))?;
        registry.insert(record(2, 0x20))?;

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.handle_for(CorrelationId(2)), Some(WindowHandle(0x20)));
        assert_eq!(registry.get(WindowHandle(0x10)).map(|r| r.cid()), Some(CorrelationId(1)));
        assert!(registry.is_consistent());
        Ok(())
    }

    #[test]
    fn test_duplicates_are_rejected() -> Result<()> {
        let mut registry = WindowRegistry::new();
        registry.insert(record(1, 0x10))?;

        assert!(registry.insert(record(2, 0x10)).is_err());
        assert!(registry.insert(record(1, 0x11)).is_err());
        assert_eq!(registry.len(), 1);
        assert!(registry.is_consistent());
        Ok(())
    }

    #[test]
    fn test_remove_is_idempotent() -> Result<()> {
        let mut registry = WindowRegistry::new();
        registry.insert(record(1, 0x10))?;

        assert!(registry.remove(WindowHandle(0x10)).is_some());
        assert!(registry.remove(WindowHandle(0x10)).is_none());
        assert_eq!(registry.handle_for(CorrelationId(1)), None);
        assert!(registry.is_empty());
        Ok(())
    }

    #[test]
    fn test_rekey_keeps_cid() -> Result<()> {
        let mut registry = WindowRegistry::new();
        registry.insert(record(1, 0x10))?;
        registry.insert(record(2, 0x20))?;

        assert!(registry.rekey(WindowHandle(0x10), WindowHandle(0x11)));
        assert_eq!(registry.handle_for(CorrelationId(1)), Some(WindowHandle(0x11)));
        assert!(!registry.contains(WindowHandle(0x10)));

        // Target already tracked, or source unknown
        assert!(!registry.rekey(WindowHandle(0x11), WindowHandle(0x20)));
        assert!(!registry.rekey(WindowHandle(0x99), WindowHandle(0x98)));
        assert!(registry.is_consistent());
        Ok(())
    }

    #[test]
    fn test_records_in_cid_order() -> Result<()> {
        let mut registry = WindowRegistry::new();
        registry.insert(record(3, 0x10))?;
        registry.insert(record(1, 0x30))?;
        registry.insert(record(2, 0x20))?;

        let cids: Vec<_> = registry.records().map(|r| r.cid().0).collect();
        assert_eq!(cids, vec![1, 2, 3]);

        let drained: Vec<_> = registry.drain().into_iter().map(|r| r.cid().0).collect();
        assert_eq!(drained, vec![1, 2, 3]);
        assert!(registry.is_empty());
        Ok(())
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(u64, u64),
        Remove(u64),
        Rekey(u64, u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..20, 0u64..20).prop_map(|(cid, handle)| Op::Insert(cid, handle)),
            (0u64..20).prop_map(Op::Remove),
            (0u64..20, 0u64..20).prop_map(|(old, new)| Op::Rekey(old, new)),
        ]
    }

    proptest! {
        #[test]
        fn test_maps_stay_inverse(ops in proptest::collection::vec(op(), 0..64)) {
            let mut registry = WindowRegistry::new();
            for op in ops {
                match op {
                    Op::Insert(cid, handle) => { let _ = registry.insert(record(cid, handle)); }
                    Op::Remove(handle) => { registry.remove(WindowHandle(handle)); }
                    Op::Rekey(old, new) => { registry.rekey(WindowHandle(old), WindowHandle(new)); }
                }
                prop_assert!(registry.is_consistent());
            }
        }
    }
}
