//! Per-device memory pools and owned device buffers

use crate::context::Context;
use npuarray_core::{NpuError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Snapshot of one device's pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    pub bytes_in_use: usize,
    pub peak_bytes: usize,
    pub live_buffers: usize,
    pub limit: Option<usize>,
}

pub(crate) struct MemoryPool {
    device: u32,
    buffers: HashMap<u64, Arc<Vec<u8>>>,
    in_use: usize,
    peak: usize,
    limit: Option<usize>,
}

impl MemoryPool {
    pub fn new(device: u32, limit: Option<usize>) -> Self {
        Self {
            device,
            buffers: HashMap::new(),
            in_use: 0,
            peak: 0,
            limit,
        }
    }

    /// Fails when `requested` more bytes would exceed the limit
    pub fn check(&self, requested: usize) -> Result<()> {
        let Some(limit) = self.limit else {
            return Ok(());
        };
        match self.in_use.checked_add(requested) {
            Some(total) if total <= limit => Ok(()),
            _ => Err(NpuError::AllocationFailed {
                device: self.device,
                requested,
                in_use: self.in_use,
                limit,
            }),
        }
    }

    pub fn insert(&mut self, id: u64, bytes: Vec<u8>) -> Result<()> {
        let requested = bytes.len();
        self.check(requested)?;
        self.in_use += requested;
        self.peak = self.peak.max(self.in_use);
        self.buffers.insert(id, Arc::new(bytes));
        Ok(())
    }

    /// Shared handle to the contents of buffer `id`
    pub fn get(&self, id: u64) -> Option<Arc<Vec<u8>>> {
        self.buffers.get(&id).cloned()
    }

    pub fn remove(&mut self, id: u64) {
        if let Some(bytes) = self.buffers.remove(&id) {
            self.in_use -= bytes.len();
        }
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
        self.in_use = 0;
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            bytes_in_use: self.in_use,
            peak_bytes: self.peak,
            live_buffers: self.buffers.len(),
            limit: self.limit,
        }
    }
}

/// Exclusively owned device allocation; returned to its pool on drop
pub(crate) struct DeviceBuffer {
    ctx: Context,
    device: u32,
    id: u64,
    generation: u64,
    nbytes: usize,
}

impl DeviceBuffer {
    pub fn new(ctx: Context, device: u32, id: u64, generation: u64, nbytes: usize) -> Self {
        Self {
            ctx,
            device,
            id,
            generation,
            nbytes,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn device(&self) -> u32 {
        self.device
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn nbytes(&self) -> usize {
        self.nbytes
    }

    /// Run `f` over the buffer contents
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        self.ctx.with_bytes(self, f)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        self.read(|bytes| bytes.to_vec())
    }

    /// Fails with `UseAfterTeardown` once the owning generation is gone
    pub fn check_live(&self) -> Result<()> {
        if self.ctx.is_live(self) {
            Ok(())
        } else {
            Err(NpuError::UseAfterTeardown)
        }
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("device", &self.device)
            .field("id", &self.id)
            .field("nbytes", &self.nbytes)
            .finish()
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.ctx.release(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_limit() {
        let mut pool = MemoryPool::new(0, Some(10));
        pool.insert(0, vec![0; 6]).unwrap();
        assert!(pool.insert(1, vec![0; 6]).is_err());
        pool.insert(2, vec![0; 4]).unwrap();
        assert_eq!(pool.stats().bytes_in_use, 10);
        pool.remove(0);
        assert_eq!(pool.stats().bytes_in_use, 4);
        assert_eq!(pool.stats().peak_bytes, 10);
    }

    #[test]
    fn test_pool_check_before_building() {
        let pool = MemoryPool::new(0, Some(16));
        assert!(pool.check(16).is_ok());
        let err = pool.check(usize::MAX).unwrap_err();
        assert!(matches!(err, NpuError::AllocationFailed { requested: usize::MAX, limit: 16, .. }));
        assert!(MemoryPool::new(0, None).check(usize::MAX).is_ok());
    }

    #[test]
    fn test_pool_clear() {
        let mut pool = MemoryPool::new(1, None);
        pool.insert(7, vec![1, 2]).unwrap();
        assert_eq!(pool.get(7).as_deref(), Some(&vec![1u8, 2]));
        pool.clear();
        assert_eq!(pool.get(7), None);
        assert_eq!(pool.live_buffers(), 0);
        // removing a cleared id is a no-op
        pool.remove(7);
        assert_eq!(pool.stats().bytes_in_use, 0);
    }
}
