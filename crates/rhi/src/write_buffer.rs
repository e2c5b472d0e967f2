//! Sub-allocated, host-written GPU buffers.
//!
//! # Overview
//!
//! A [`WriteBuffer`] is one GPU allocation split into an ordered list of
//! sub-buffers. Sub-buffer *i* starts at the first multiple of the device
//! alignment at or after the end of sub-buffer *i - 1*, and the allocation is
//! exactly as large as the end of the last sub-buffer. The layout math lives
//! in [`SubBufferLayout`] and does not need a device.
//!
//! Writes follow an open / write / close cycle. Only one sub-buffer may be
//! open at a time, and every write is bounds-checked against the open
//! sub-buffer before any byte is copied. Misuse is logged and returned as a
//! [`BufferMisuse`]; it never panics and never touches memory.
//!
//! # Example
//!
//! ```no_run
//! use engine_rhi::buffer::BufferUsage;
//! use engine_rhi::deletion::DeletionStack;
//! use engine_rhi::write_buffer::WriteBuffer;
//!
//! # fn example(device: &engine_rhi::device::Device) -> engine_rhi::RhiResult<()> {
//! let mut deletion = DeletionStack::new("main");
//! // One 64-byte slot per ring slot, padded to the uniform alignment.
//! let mut camera = WriteBuffer::build_constant(
//!     device, 2, 64, device.min_uniform_alignment(),
//!     BufferUsage::Uniform, "camera", &mut deletion,
//! )?;
//! if camera.open(1).is_ok() {
//!     let _ = camera.write(&[0.0f32; 16], 0);
//!     let _ = camera.close();
//! }
//! # deletion.flush(device);
//! # Ok(())
//! # }
//! ```

use std::ops::Range;

use ash::vk;
use bytemuck::Pod;
use thiserror::Error;
use tracing::{error, warn};

use crate::buffer::{AllocatedBuffer, BufferUsage};
use crate::deletion::DeletionStack;
use crate::device::Device;
use crate::error::RhiResult;

/// Rounds `offset` up to the next multiple of `alignment`.
///
/// Offsets that are already aligned are returned unchanged, and an
/// `alignment` of zero means no constraint.
#[inline]
pub fn pad_to_alignment(offset: u64, alignment: u64) -> u64 {
    if alignment == 0 || offset % alignment == 0 {
        offset
    } else {
        ((offset - 1) / alignment + 1) * alignment
    }
}

/// Recoverable misuse of a [`WriteBuffer`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferMisuse {
    #[error("write buffer is not open")]
    NotOpen,
    #[error("sub-buffer {requested} requested while sub-buffer {open} is open")]
    AlreadyOpen { open: usize, requested: usize },
    #[error("write buffer is already closed")]
    AlreadyClosed,
    #[error("write of {size} bytes at offset {offset} is out of bounds (sub-buffer ends at {end})")]
    OutOfBounds { offset: u64, size: u64, end: u64 },
    #[error("sub-buffer {index} does not exist ({count} sub-buffers)")]
    NoSuchSubBuffer { index: usize, count: usize },
    #[error("write buffer memory is not host visible")]
    NotHostVisible,
}

/// Offsets of the sub-buffers packed into one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubBufferLayout {
    offsets: Vec<u64>,
    ends: Vec<u64>,
}

impl SubBufferLayout {
    /// Packs regions of the given sizes, in order.
    pub fn variable(sizes: &[u64], alignment: u64) -> Self {
        let mut offsets = Vec::with_capacity(sizes.len());
        let mut ends = Vec::with_capacity(sizes.len());
        let mut cursor = 0;
        for &size in sizes {
            let offset = pad_to_alignment(cursor, alignment);
            offsets.push(offset);
            cursor = offset + size;
            ends.push(cursor);
        }
        Self { offsets, ends }
    }

    /// Packs `count` regions of `size` bytes each.
    pub fn constant(count: usize, size: u64, alignment: u64) -> Self {
        Self::variable(&vec![size; count], alignment)
    }

    /// Number of sub-buffers.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Bytes needed for the whole allocation: the end of the last sub-buffer.
    #[inline]
    pub fn total_size(&self) -> u64 {
        self.ends.last().copied().unwrap_or(0)
    }

    /// Start offset of sub-buffer `index`.
    #[inline]
    pub fn offset(&self, index: usize) -> Option<u64> {
        self.offsets.get(index).copied()
    }

    /// Byte range reserved for sub-buffer `index`.
    pub fn range(&self, index: usize) -> Option<Range<u64>> {
        Some(*self.offsets.get(index)?..*self.ends.get(index)?)
    }
}

/// Memory a [`WriteBuffer`] can copy into.
pub trait HostMemory {
    fn host_bytes(&self) -> Option<&[u8]>;
    fn host_bytes_mut(&mut self) -> Option<&mut [u8]>;
}

impl HostMemory for AllocatedBuffer {
    fn host_bytes(&self) -> Option<&[u8]> {
        self.mapped_bytes()
    }

    fn host_bytes_mut(&mut self) -> Option<&mut [u8]> {
        self.mapped_bytes_mut()
    }
}

impl HostMemory for Vec<u8> {
    fn host_bytes(&self) -> Option<&[u8]> {
        Some(self)
    }

    fn host_bytes_mut(&mut self) -> Option<&mut [u8]> {
        Some(self)
    }
}

/// One allocation partitioned into alignment-padded sub-buffers.
#[derive(Debug)]
pub struct WriteBuffer<M: HostMemory = AllocatedBuffer> {
    memory: M,
    layout: SubBufferLayout,
    open: Option<usize>,
}

impl WriteBuffer<AllocatedBuffer> {
    /// Allocates a buffer holding regions of the given sizes.
    ///
    /// # Errors
    ///
    /// Returns an error if the packed size is zero or allocation fails.
    pub fn build_variable(
        device: &Device,
        sizes: &[u64],
        alignment: u64,
        usage: BufferUsage,
        name: &str,
        deletion: &mut DeletionStack,
    ) -> RhiResult<Self> {
        let layout = SubBufferLayout::variable(sizes, alignment);
        let buffer = AllocatedBuffer::create(device, layout.total_size(), usage, name, deletion)?;
        Ok(Self::new(buffer, layout))
    }

    /// Allocates a buffer holding `count` regions of `size` bytes.
    pub fn build_constant(
        device: &Device,
        count: usize,
        size: u64,
        alignment: u64,
        usage: BufferUsage,
        name: &str,
        deletion: &mut DeletionStack,
    ) -> RhiResult<Self> {
        Self::build_variable(device, &vec![size; count], alignment, usage, name, deletion)
    }

    /// The backing GPU buffer.
    #[inline]
    pub fn buffer(&self) -> &AllocatedBuffer {
        &self.memory
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.memory.handle()
    }

    /// Descriptor info covering `range` bytes from the start of the buffer.
    ///
    /// Dynamic bindings add the sub-buffer offset at bind time.
    pub fn descriptor_info(&self, range: vk::DeviceSize) -> vk::DescriptorBufferInfo {
        self.memory.build_info(0, range)
    }
}

impl<M: HostMemory> WriteBuffer<M> {
    /// Wraps memory already sized for `layout`.
    pub fn new(memory: M, layout: SubBufferLayout) -> Self {
        Self {
            memory,
            layout,
            open: None,
        }
    }

    #[inline]
    pub fn layout(&self) -> &SubBufferLayout {
        &self.layout
    }

    /// Start offset of sub-buffer `index`.
    #[inline]
    pub fn offset(&self, index: usize) -> Option<u64> {
        self.layout.offset(index)
    }

    /// The currently open sub-buffer, if any.
    #[inline]
    pub fn open_index(&self) -> Option<usize> {
        self.open
    }

    /// Opens sub-buffer `index` for writing.
    ///
    /// Opening while another sub-buffer is open is a no-op misuse.
    pub fn open(&mut self, index: usize) -> Result<(), BufferMisuse> {
        if let Some(open) = self.open {
            let misuse = BufferMisuse::AlreadyOpen {
                open,
                requested: index,
            };
            warn!("{}", misuse);
            return Err(misuse);
        }
        if index >= self.layout.len() {
            let misuse = BufferMisuse::NoSuchSubBuffer {
                index,
                count: self.layout.len(),
            };
            error!("{}", misuse);
            return Err(misuse);
        }
        if self.memory.host_bytes().is_none() {
            error!("{}", BufferMisuse::NotHostVisible);
            return Err(BufferMisuse::NotHostVisible);
        }
        self.open = Some(index);
        Ok(())
    }

    /// Closes the open sub-buffer. Closing twice is a no-op misuse.
    pub fn close(&mut self) -> Result<(), BufferMisuse> {
        if self.open.take().is_none() {
            warn!("{}", BufferMisuse::AlreadyClosed);
            return Err(BufferMisuse::AlreadyClosed);
        }
        Ok(())
    }

    /// Copies `value` into element slot `index` of the open sub-buffer.
    pub fn write<T: Pod>(&mut self, value: &T, index: usize) -> Result<(), BufferMisuse> {
        self.write_bytes(index, std::mem::size_of::<T>(), bytemuck::bytes_of(value))
    }

    /// Copies `values` into consecutive element slots starting at `first`.
    pub fn write_slice<T: Pod>(&mut self, values: &[T], first: usize) -> Result<(), BufferMisuse> {
        self.write_bytes(first, std::mem::size_of::<T>(), bytemuck::cast_slice(values))
    }

    /// Reads element slot `index` of the open sub-buffer.
    pub fn read<T: Pod>(&self, index: usize) -> Result<T, BufferMisuse> {
        let size = std::mem::size_of::<T>();
        let range = self.checked_range(index, size, size)?;
        let bytes = self.memory.host_bytes().ok_or(BufferMisuse::NotHostVisible)?;
        Ok(bytemuck::pod_read_unaligned(&bytes[range]))
    }

    fn write_bytes(
        &mut self,
        slot: usize,
        stride: usize,
        bytes: &[u8],
    ) -> Result<(), BufferMisuse> {
        let range = self.checked_range(slot, stride, bytes.len())?;
        let memory = self
            .memory
            .host_bytes_mut()
            .ok_or(BufferMisuse::NotHostVisible)?;
        memory[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Absolute byte range for `len` bytes at element `slot` of size
    /// `stride` inside the open sub-buffer.
    ///
    /// Any arithmetic overflow counts as out of bounds.
    fn checked_range(
        &self,
        slot: usize,
        stride: usize,
        len: usize,
    ) -> Result<Range<usize>, BufferMisuse> {
        let Some(index) = self.open else {
            error!("Writing to a write buffer that is not open");
            return Err(BufferMisuse::NotOpen);
        };
        let sub = self.layout.range(index).ok_or(BufferMisuse::NoSuchSubBuffer {
            index,
            count: self.layout.len(),
        })?;

        let offset = (slot as u64)
            .checked_mul(stride as u64)
            .and_then(|relative| sub.start.checked_add(relative));
        let end = offset.and_then(|offset| offset.checked_add(len as u64));
        match (offset, end) {
            (Some(offset), Some(end)) if end <= sub.end => Ok(offset as usize..end as usize),
            (offset, _) => {
                let misuse = BufferMisuse::OutOfBounds {
                    offset: offset.unwrap_or(u64::MAX),
                    size: len as u64,
                    end: sub.end,
                };
                error!("{}", misuse);
                Err(misuse)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_buffer(sizes: &[u64], alignment: u64) -> WriteBuffer<Vec<u8>> {
        let layout = SubBufferLayout::variable(sizes, alignment);
        WriteBuffer::new(vec![0xAA; layout.total_size() as usize], layout)
    }

    #[test]
    fn test_pad_properties() {
        for alignment in 1..=64u64 {
            for offset in 0..=512u64 {
                let padded = pad_to_alignment(offset, alignment);
                assert_eq!(padded % alignment, 0, "pad({offset}, {alignment})");
                assert!(padded >= offset);
                assert!(padded - offset < alignment);
            }
        }
    }

    #[test]
    fn test_pad_zero_alignment_is_identity() {
        for offset in [0, 1, 7, 255, 256, 1 << 40] {
            assert_eq!(pad_to_alignment(offset, 0), offset);
        }
    }

    #[test]
    fn test_pad_exact_values() {
        assert_eq!(pad_to_alignment(0, 256), 0);
        assert_eq!(pad_to_alignment(1, 256), 256);
        assert_eq!(pad_to_alignment(256, 256), 256);
        assert_eq!(pad_to_alignment(257, 256), 512);
        assert_eq!(pad_to_alignment(100, 64), 128);
        assert_eq!(pad_to_alignment(100, 3), 102);
    }

    #[test]
    fn test_variable_layout_offsets() {
        let cases: &[(&[u64], u64, &[u64], u64)] = &[
            (&[64, 100, 4, 256], 256, &[0, 256, 512, 768], 1024),
            (&[64, 100, 4, 256], 0, &[0, 64, 164, 168], 424),
            (&[10, 20, 30], 16, &[0, 16, 48], 78),
            (&[10, 20, 30], 1, &[0, 10, 30], 60),
            (&[48, 48], 64, &[0, 64], 112),
            (&[1], 256, &[0], 1),
        ];

        for (sizes, alignment, offsets, total) in cases {
            let layout = SubBufferLayout::variable(sizes, *alignment);
            let got: Vec<u64> = (0..layout.len()).filter_map(|i| layout.offset(i)).collect();
            assert_eq!(&got, offsets, "sizes {:?} alignment {}", sizes, alignment);
            assert_eq!(layout.total_size(), *total, "sizes {:?} alignment {}", sizes, alignment);
        }
    }

    #[test]
    fn test_variable_layout_matches_recurrence() {
        let sizes = [3u64, 200, 17, 64, 1, 1000];
        for alignment in [0u64, 1, 4, 16, 64, 256] {
            let layout = SubBufferLayout::variable(&sizes, alignment);
            assert_eq!(layout.offset(0), Some(0));
            for i in 1..sizes.len() {
                let expected =
                    pad_to_alignment(layout.offset(i - 1).unwrap() + sizes[i - 1], alignment);
                assert_eq!(layout.offset(i), Some(expected));
            }
            let last = sizes.len() - 1;
            assert_eq!(layout.total_size(), layout.offset(last).unwrap() + sizes[last]);
        }
    }

    #[test]
    fn test_constant_layout() {
        let layout = SubBufferLayout::constant(5, 80, 64);
        assert_eq!(layout.len(), 5);
        assert_eq!(layout.range(2), Some(256..336));
        assert_eq!(layout.total_size(), 592);
        assert!(SubBufferLayout::constant(0, 80, 64).is_empty());
        assert_eq!(SubBufferLayout::constant(0, 80, 64).total_size(), 0);
    }

    #[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Sample {
        matrix: [f32; 16],
        tint: [f32; 4],
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let mut buffer = host_buffer(&[3 * 80, 3 * 80], 64);
        let value = Sample {
            matrix: std::array::from_fn(|i| i as f32 * 0.5),
            tint: [0.1, 0.2, 0.3, 1.0],
        };

        buffer.open(1).unwrap();
        buffer.write(&value, 2).unwrap();
        assert_eq!(buffer.read::<Sample>(2).unwrap(), value);
        buffer.close().unwrap();

        // sub-buffer 1 starts at 256, slot 2 is 160 bytes further
        let bytes = buffer.memory.host_bytes().unwrap();
        assert_eq!(&bytes[416..496], bytemuck::bytes_of(&value));
    }

    #[test]
    fn test_write_past_end_is_rejected_and_leaves_memory_untouched() {
        let mut buffer = host_buffer(&[16, 16, 16], 32);
        let before = buffer.memory.clone();

        buffer.open(1).unwrap();
        // slot 1 of a u64 would span bytes 8..16: still legal
        buffer.write(&1u64, 1).unwrap();
        // slot 2 spans 16..24, past the 16-byte sub-buffer
        let err = buffer.write(&u64::MAX, 2).unwrap_err();
        assert_eq!(
            err,
            BufferMisuse::OutOfBounds {
                offset: 48,
                size: 8,
                end: 48
            }
        );
        // a slice straddling the end is rejected as a whole
        assert!(buffer.write_slice(&[7u32, 7, 7, 7, 7], 0).is_err());
        buffer.close().unwrap();

        let after = &buffer.memory;
        assert_eq!(&after[..40], &before[..40]);
        assert_eq!(&after[40..48], &1u64.to_ne_bytes());
        assert_eq!(&after[48..], &before[48..]);
    }

    #[test]
    fn test_huge_slot_index_is_out_of_bounds() {
        let mut buffer = host_buffer(&[64], 0);
        buffer.open(0).unwrap();
        assert!(matches!(
            buffer.write(&1u64, usize::MAX / 4),
            Err(BufferMisuse::OutOfBounds { end: 64, .. })
        ));
        assert!(matches!(
            buffer.write_slice(&[1u32, 2], usize::MAX),
            Err(BufferMisuse::OutOfBounds { .. })
        ));
        assert!(buffer.read::<u64>(usize::MAX).is_err());
        buffer.close().unwrap();
        assert!(buffer.memory.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_wrapping_offset_cannot_reach_an_earlier_sub_buffer() {
        let mut buffer = host_buffer(&[64, 64], 256);
        buffer.open(1).unwrap();
        // 8 * ((1 << 61) - 32) + 256 wraps to 0 in 64-bit arithmetic
        let err = buffer.write(&0xDEAD_BEEFu64, (1 << 61) - 32).unwrap_err();
        assert!(matches!(err, BufferMisuse::OutOfBounds { end: 320, .. }));
        buffer.close().unwrap();
        assert!(buffer.memory.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_write_while_closed_is_rejected() {
        let mut buffer = host_buffer(&[64], 0);
        assert_eq!(buffer.write(&5u32, 0), Err(BufferMisuse::NotOpen));
        assert!(buffer.memory.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_double_open_and_double_close() {
        let mut buffer = host_buffer(&[64, 64], 0);
        buffer.open(0).unwrap();
        assert_eq!(
            buffer.open(1),
            Err(BufferMisuse::AlreadyOpen {
                open: 0,
                requested: 1
            })
        );
        // still open on the first sub-buffer
        assert_eq!(buffer.open_index(), Some(0));

        buffer.close().unwrap();
        assert_eq!(buffer.close(), Err(BufferMisuse::AlreadyClosed));
        assert_eq!(buffer.open_index(), None);
    }

    #[test]
    fn test_open_missing_sub_buffer() {
        let mut buffer = host_buffer(&[64], 0);
        assert_eq!(
            buffer.open(3),
            Err(BufferMisuse::NoSuchSubBuffer { index: 3, count: 1 })
        );
        assert_eq!(buffer.open_index(), None);
    }
}
