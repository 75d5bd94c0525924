//! Persistently mapped ring of equally sized chunks, each guarded by a fence.
//!
//! The buffer is split into `chunk_count` chunks (three by default) that are
//! handed out round-robin. A chunk is returned by [`SyncedRingBuffer::acquire_chunk`]
//! only after the device has finished with its previous contents:
//!
//! ```text
//! acquire_chunk -> chunk_mut (write) -> flush -> fence
//! ```
//!
//! With three chunks the CPU can fill one while the device reads a second
//! and a third drains, so waits are rare in steady state.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::Buffer;
use crate::device::{BufferFlags, Device, MapAccess};
use crate::error::GpuError;
use crate::fence::FenceSync;

static NEXT_RING_ID: AtomicU64 = AtomicU64::new(1);

pub const DEFAULT_CHUNK_COUNT: usize = 3;
pub const DEFAULT_FENCE_TIMEOUT: Duration = Duration::from_millis(100);

/// Which direction data flows through the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RingAccess {
    /// CPU writes, device reads.
    #[default]
    Write,
    /// Device writes, CPU reads.
    Read,
    ReadWrite,
}

impl RingAccess {
    fn storage_flags(self) -> BufferFlags {
        let base = BufferFlags::MAP_PERSISTENT;
        match self {
            RingAccess::Write => base | BufferFlags::MAP_WRITE,
            RingAccess::Read => base | BufferFlags::MAP_READ,
            RingAccess::ReadWrite => base | BufferFlags::MAP_READ | BufferFlags::MAP_WRITE,
        }
    }

    fn map_access(self) -> MapAccess {
        let base = MapAccess::PERSISTENT;
        // Writable mappings are flushed by hand and never wait on the driver.
        let write = MapAccess::WRITE | MapAccess::FLUSH_EXPLICIT | MapAccess::UNSYNCHRONIZED;
        match self {
            RingAccess::Write => base | write,
            RingAccess::Read => base | MapAccess::READ,
            RingAccess::ReadWrite => base | MapAccess::READ | write,
        }
    }

    fn writable(self) -> bool {
        !matches!(self, RingAccess::Read)
    }
}

#[derive(Debug, Clone)]
pub struct RingConfig {
    pub chunk_size: usize,
    pub chunk_count: usize,
    pub access: RingAccess,
    /// Upper bound on one fence wait inside `acquire_chunk`.
    pub fence_timeout: Duration,
    /// Chunk offsets are multiples of this. Use
    /// [`Device::uniform_buffer_offset_alignment`] for rings bound as uniform ranges.
    pub alignment: usize,
}

impl RingConfig {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            chunk_count: DEFAULT_CHUNK_COUNT,
            access: RingAccess::Write,
            fence_timeout: DEFAULT_FENCE_TIMEOUT,
            alignment: 1,
        }
    }
}

/// A region of one ring buffer, valid between acquire and fence/release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHandle {
    ring: u64,
    index: usize,
    offset: usize,
    size: usize,
}

impl ChunkHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Byte offset of the chunk within the ring's buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

pub struct SyncedRingBuffer {
    id: u64,
    buffer: Buffer,
    mapping: NonNull<u8>,
    chunk_size: usize,
    stride: usize,
    access: RingAccess,
    fences: Vec<FenceSync>,
    open: Vec<bool>,
    cursor: usize,
    fence_timeout: Duration,
}

// The mapping is only dereferenced through `&self`/`&mut self` methods, which
// carry the usual aliasing guarantees.
unsafe impl Send for SyncedRingBuffer {}
unsafe impl Sync for SyncedRingBuffer {}

impl std::fmt::Debug for SyncedRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncedRingBuffer")
            .field("buffer", &self.buffer.id())
            .field("chunk_size", &self.chunk_size)
            .field("stride", &self.stride)
            .field("chunk_count", &self.fences.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl SyncedRingBuffer {
    pub fn new(device: &Arc<dyn Device>, config: &RingConfig) -> Result<Self, GpuError> {
        if config.chunk_size == 0 || config.chunk_count == 0 || config.alignment == 0 {
            return Err(GpuError::InvalidOperation(format!(
                "ring buffer needs a non-zero chunk size, count and alignment (got {} x {}, aligned to {})",
                config.chunk_size, config.chunk_count, config.alignment
            )));
        }
        let overflow = || GpuError::InvalidOperation("ring buffer size overflows".into());
        let stride = config.chunk_size.div_ceil(config.alignment).checked_mul(config.alignment).ok_or_else(overflow)?;
        let total = stride.checked_mul(config.chunk_count).ok_or_else(overflow)?;
        let buffer = Buffer::new(device, total, None, config.access.storage_flags())?;
        buffer.set_label("synced_ring_buffer");
        let mapping = buffer.map_range(0, total, config.access.map_access())?;
        let fences = (0..config.chunk_count).map(|_| FenceSync::new(Arc::clone(device))).collect();
        log::debug!(
            "ring buffer {}: {} chunks of {} bytes, stride {} ({:?})",
            buffer.id(),
            config.chunk_count,
            config.chunk_size,
            stride,
            config.access
        );
        Ok(Self {
            id: NEXT_RING_ID.fetch_add(1, Ordering::Relaxed),
            buffer,
            mapping,
            chunk_size: config.chunk_size,
            stride,
            access: config.access,
            fences,
            open: vec![false; config.chunk_count],
            cursor: 0,
            fence_timeout: config.fence_timeout,
        })
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Distance between chunk offsets; `chunk_size` rounded up to the alignment.
    pub fn chunk_stride(&self) -> usize {
        self.stride
    }

    pub fn chunk_count(&self) -> usize {
        self.fences.len()
    }

    pub fn fence_timeout(&self) -> Duration {
        self.fence_timeout
    }

    pub fn set_fence_timeout(&mut self, timeout: Duration) {
        self.fence_timeout = timeout;
    }

    /// Wait for the next chunk in rotation to drain and hand it out.
    ///
    /// Fails with [`GpuError::FenceTimeout`] (transient: the cursor does not
    /// move and the fence stays armed, so retrying waits on the same chunk)
    /// or [`GpuError::ChunkStillOpen`] when the chunk's previous handle was
    /// never fenced or released.
    pub fn acquire_chunk(&mut self) -> Result<ChunkHandle, GpuError> {
        let index = self.cursor;
        if self.open[index] {
            return Err(GpuError::ChunkStillOpen { index });
        }
        self.fences[index].wait(self.fence_timeout)?;
        self.open[index] = true;
        self.cursor = (index + 1) % self.fences.len();
        log::trace!("ring buffer {}: acquired chunk {}", self.buffer.id(), index);
        Ok(ChunkHandle { ring: self.id, index, offset: index * self.stride, size: self.chunk_size })
    }

    fn check(&self, handle: &ChunkHandle) -> Result<(), GpuError> {
        if handle.ring != self.id || handle.index >= self.open.len() {
            return Err(GpuError::ForeignChunk);
        }
        if !self.open[handle.index] {
            return Err(GpuError::InvalidOperation(format!("chunk {} is not acquired", handle.index)));
        }
        Ok(())
    }

    /// Writable view of an acquired chunk.
    pub fn chunk_mut(&mut self, handle: &ChunkHandle) -> Result<&mut [u8], GpuError> {
        self.check(handle)?;
        if !self.access.writable() {
            return Err(GpuError::InvalidOperation("ring buffer is read-only".into()));
        }
        // SAFETY: the mapping spans stride * chunk_count bytes and stays
        // valid until drop; `&mut self` keeps the slice unique.
        Ok(unsafe { std::slice::from_raw_parts_mut(self.mapping.as_ptr().add(handle.offset), handle.size) })
    }

    pub fn chunk(&self, handle: &ChunkHandle) -> Result<&[u8], GpuError> {
        self.check(handle)?;
        // SAFETY: see `chunk_mut`.
        Ok(unsafe { std::slice::from_raw_parts(self.mapping.as_ptr().add(handle.offset), handle.size) })
    }

    /// Publish CPU writes to the chunk. No-op for read-only rings.
    pub fn flush(&self, handle: &ChunkHandle) -> Result<(), GpuError> {
        self.check(handle)?;
        if self.access.writable() {
            self.buffer.flush_range(handle.offset, handle.size)?;
        }
        Ok(())
    }

    /// Arm the chunk's fence after the commands that read it, closing the handle.
    pub fn fence(&mut self, handle: ChunkHandle) -> Result<(), GpuError> {
        self.check(&handle)?;
        self.fences[handle.index].arm()?;
        self.open[handle.index] = false;
        Ok(())
    }

    /// Close a chunk the device never saw. Its fence stays as it was.
    pub fn release(&mut self, handle: ChunkHandle) -> Result<(), GpuError> {
        self.check(&handle)?;
        self.open[handle.index] = false;
        Ok(())
    }
}

impl Drop for SyncedRingBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.buffer.unmap() {
            log::warn!("ring buffer {}: unmap failed: {}", self.buffer.id(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    fn ring(device: &Arc<HeadlessDevice>, chunk_size: usize) -> SyncedRingBuffer {
        let dev: Arc<dyn Device> = device.clone();
        let mut config = RingConfig::new(chunk_size);
        config.fence_timeout = Duration::from_millis(2);
        SyncedRingBuffer::new(&dev, &config).unwrap()
    }

    #[test]
    fn chunks_rotate_round_robin() {
        let device = HeadlessDevice::new(4, 4);
        let mut ring = ring(&device, 64);
        let mut seen = Vec::new();
        for _ in 0..6 {
            let handle = ring.acquire_chunk().unwrap();
            seen.push((handle.index(), handle.offset()));
            ring.flush(&handle).unwrap();
            ring.fence(handle).unwrap();
        }
        assert_eq!(seen, vec![(0, 0), (1, 64), (2, 128), (0, 0), (1, 64), (2, 128)]);
    }

    #[test]
    fn chunk_offsets_honor_the_alignment() {
        let device = HeadlessDevice::new(4, 4);
        let dev: Arc<dyn Device> = device.clone();
        let config = RingConfig { alignment: 256, ..RingConfig::new(100) };
        let mut ring = SyncedRingBuffer::new(&dev, &config).unwrap();
        assert_eq!(ring.chunk_stride(), 256);
        assert_eq!(ring.buffer().size(), 768);
        let mut seen = Vec::new();
        for _ in 0..3 {
            let handle = ring.acquire_chunk().unwrap();
            seen.push((handle.offset(), handle.size()));
            assert_eq!(ring.chunk_mut(&handle).unwrap().len(), 100);
            ring.fence(handle).unwrap();
        }
        assert_eq!(seen, vec![(0, 100), (256, 100), (512, 100)]);

        let zero = RingConfig { alignment: 0, ..RingConfig::new(100) };
        assert!(matches!(SyncedRingBuffer::new(&dev, &zero), Err(GpuError::InvalidOperation(_))));
    }

    #[test]
    fn flushed_writes_reach_the_buffer() {
        let device = HeadlessDevice::new(4, 4);
        let mut ring = ring(&device, 16);
        let first = ring.acquire_chunk().unwrap();
        ring.release(first).unwrap();
        let handle = ring.acquire_chunk().unwrap();
        ring.chunk_mut(&handle).unwrap().copy_from_slice(&[7u8; 16]);
        ring.flush(&handle).unwrap();
        let mut out = [0u8; 16];
        ring.buffer().read(16, &mut out).unwrap();
        assert_eq!(out, [7u8; 16]);
        ring.fence(handle).unwrap();
    }

    #[test]
    fn timeout_is_transient_and_retryable() {
        let device = HeadlessDevice::new(4, 4);
        device.hold_fences(true);
        let mut ring = ring(&device, 32);
        for _ in 0..3 {
            let handle = ring.acquire_chunk().unwrap();
            ring.fence(handle).unwrap();
        }
        let err = ring.acquire_chunk().unwrap_err();
        assert!(err.is_transient());
        let err = ring.acquire_chunk().unwrap_err();
        assert!(matches!(err, GpuError::FenceTimeout(_)));

        device.signal_fences();
        let handle = ring.acquire_chunk().unwrap();
        assert_eq!(handle.index(), 0);
    }

    #[test]
    fn reacquiring_an_open_chunk_fails() {
        let device = HeadlessDevice::new(4, 4);
        let mut config = RingConfig::new(8);
        config.chunk_count = 1;
        let dev: Arc<dyn Device> = device.clone();
        let mut ring = SyncedRingBuffer::new(&dev, &config).unwrap();
        let handle = ring.acquire_chunk().unwrap();
        assert!(matches!(ring.acquire_chunk(), Err(GpuError::ChunkStillOpen { index: 0 })));
        ring.release(handle).unwrap();
        assert!(ring.acquire_chunk().is_ok());
    }

    #[test]
    fn handles_are_bound_to_their_ring() {
        let device = HeadlessDevice::new(4, 4);
        let mut a = ring(&device, 8);
        let mut b = ring(&device, 8);
        let handle = a.acquire_chunk().unwrap();
        assert!(matches!(b.chunk_mut(&handle), Err(GpuError::ForeignChunk)));
        assert!(matches!(b.fence(handle), Err(GpuError::ForeignChunk)));
        a.fence(handle).unwrap();
    }

    #[test]
    fn mapping_released_on_drop() {
        let device = HeadlessDevice::new(4, 4);
        let ring = ring(&device, 8);
        let id = ring.buffer().id();
        assert!(device.is_mapped(id));
        drop(ring);
        assert_eq!(device.live_objects(crate::device::ObjectKind::Buffer), 0);
    }
}
