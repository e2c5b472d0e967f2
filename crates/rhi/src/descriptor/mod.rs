//! Descriptor set management.
//!
//! # Overview
//!
//! - [`DescriptorAllocator`] hands out descriptor sets from a recycled set of
//!   weighted pools, retrying once on a fresh pool when the active one runs out.
//! - [`DescriptorLayoutCache`] deduplicates set layouts by their structure, so
//!   identical binding lists share one native layout.
//! - [`DescriptorSetBuilder`] accumulates buffer/image bindings and produces a
//!   layout, a set and a single batched update in one call.
//!
//! All three talk to the device through [`DescriptorBackend`], which the
//! logical [`Device`] implements.
//!
//! # Example
//!
//! ```no_run
//! use engine_rhi::descriptor::{DescriptorAllocator, DescriptorLayoutCache, DescriptorSetBuilder};
//! use engine_rhi::vk;
//!
//! # fn example(device: &engine_rhi::device::Device, camera: vk::DescriptorBufferInfo) -> engine_rhi::RhiResult<()> {
//! let mut allocator = DescriptorAllocator::new(1000);
//! let mut cache = DescriptorLayoutCache::new();
//!
//! let (set, layout) = DescriptorSetBuilder::begin(&mut cache, &mut allocator)
//!     .bind_buffer(0, camera, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, vk::ShaderStageFlags::VERTEX)
//!     .build(device)?;
//! # let _ = (set, layout);
//! # Ok(())
//! # }
//! ```

mod allocator;
mod builder;
mod layout_cache;

pub use allocator::{DescriptorAllocator, PoolSizes};
pub use builder::DescriptorSetBuilder;
pub use layout_cache::{DescriptorLayoutCache, LayoutBinding, LayoutKey};

use ash::prelude::VkResult;
use ash::vk;

use crate::device::Device;

/// Device calls used by the descriptor allocator, layout cache and builder.
pub trait DescriptorBackend {
    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool>;

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()>;

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet>;

    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout>;

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]);
}

impl DescriptorBackend for Device {
    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool> {
        unsafe { self.handle().create_descriptor_pool(info, None) }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.handle().destroy_descriptor_pool(pool, None) }
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        unsafe {
            self.handle()
                .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
        }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.handle().allocate_descriptor_sets(&info)? };
        sets.into_iter().next().ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout> {
        unsafe { self.handle().create_descriptor_set_layout(info, None) }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.handle().destroy_descriptor_set_layout(layout, None) }
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        if !writes.is_empty() {
            unsafe { self.handle().update_descriptor_sets(writes, &[]) }
        }
    }
}

/// A single-descriptor layout binding.
#[inline]
pub fn layout_binding(
    binding: u32,
    ty: vk::DescriptorType,
    stages: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(ty)
        .descriptor_count(1)
        .stage_flags(stages)
}

/// Creates an image info for descriptor set updates.
#[inline]
pub fn image_info(
    sampler: vk::Sampler,
    image_view: vk::ImageView,
    image_layout: vk::ImageLayout,
) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image_view)
        .image_layout(image_layout)
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory descriptor backend that records every call.

    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};

    use ash::prelude::VkResult;
    use ash::vk::{self, Handle};

    use super::DescriptorBackend;

    #[derive(Debug, Default)]
    pub struct MockPool {
        pub capacity: u32,
        pub used: u32,
        pub resets: u32,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecordedWrite {
        pub set: vk::DescriptorSet,
        pub binding: u32,
        pub ty: vk::DescriptorType,
    }

    #[derive(Debug, Default)]
    pub struct MockState {
        next_handle: u64,
        /// Overrides `max_sets` from the pool create info.
        pub pool_capacity: Option<u32>,
        pub pools: HashMap<u64, MockPool>,
        pub pools_created: usize,
        pub pools_destroyed: usize,
        pub layouts_created: usize,
        pub layouts_destroyed: usize,
        /// Errors returned by upcoming allocation calls, before capacity checks.
        pub forced_errors: VecDeque<vk::Result>,
        pub update_calls: usize,
        pub writes: Vec<RecordedWrite>,
    }

    impl MockState {
        fn next(&mut self) -> u64 {
            self.next_handle += 1;
            self.next_handle
        }
    }

    #[derive(Debug, Default)]
    pub struct MockBackend {
        pub state: RefCell<MockState>,
    }

    impl MockBackend {
        pub fn with_pool_capacity(capacity: u32) -> Self {
            let backend = Self::default();
            backend.state.borrow_mut().pool_capacity = Some(capacity);
            backend
        }

        pub fn force_error(&self, error: vk::Result) {
            self.state.borrow_mut().forced_errors.push_back(error);
        }
    }

    impl DescriptorBackend for MockBackend {
        fn create_descriptor_pool(
            &self,
            info: &vk::DescriptorPoolCreateInfo<'_>,
        ) -> VkResult<vk::DescriptorPool> {
            let mut state = self.state.borrow_mut();
            let raw = state.next();
            let capacity = state.pool_capacity.unwrap_or(info.max_sets);
            state.pools.insert(
                raw,
                MockPool {
                    capacity,
                    ..Default::default()
                },
            );
            state.pools_created += 1;
            Ok(vk::DescriptorPool::from_raw(raw))
        }

        fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
            let mut state = self.state.borrow_mut();
            state.pools.remove(&pool.as_raw());
            state.pools_destroyed += 1;
        }

        fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
            let mut state = self.state.borrow_mut();
            let pool = state
                .pools
                .get_mut(&pool.as_raw())
                .ok_or(vk::Result::ERROR_UNKNOWN)?;
            pool.used = 0;
            pool.resets += 1;
            Ok(())
        }

        fn allocate_descriptor_set(
            &self,
            pool: vk::DescriptorPool,
            _layout: vk::DescriptorSetLayout,
        ) -> VkResult<vk::DescriptorSet> {
            let mut state = self.state.borrow_mut();
            if let Some(error) = state.forced_errors.pop_front() {
                return Err(error);
            }
            let raw = state.next();
            let pool = state
                .pools
                .get_mut(&pool.as_raw())
                .ok_or(vk::Result::ERROR_UNKNOWN)?;
            if pool.used >= pool.capacity {
                return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
            }
            pool.used += 1;
            Ok(vk::DescriptorSet::from_raw(raw))
        }

        fn create_descriptor_set_layout(
            &self,
            _info: &vk::DescriptorSetLayoutCreateInfo<'_>,
        ) -> VkResult<vk::DescriptorSetLayout> {
            let mut state = self.state.borrow_mut();
            state.layouts_created += 1;
            let raw = state.next();
            Ok(vk::DescriptorSetLayout::from_raw(raw))
        }

        fn destroy_descriptor_set_layout(&self, _layout: vk::DescriptorSetLayout) {
            self.state.borrow_mut().layouts_destroyed += 1;
        }

        fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
            let mut state = self.state.borrow_mut();
            state.update_calls += 1;
            for write in writes {
                state.writes.push(RecordedWrite {
                    set: write.dst_set,
                    binding: write.dst_binding,
                    ty: write.descriptor_type,
                });
            }
        }
    }
}
