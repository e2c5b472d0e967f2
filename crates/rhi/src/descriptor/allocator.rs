use ash::vk;
use tracing::{debug, error};

use super::DescriptorBackend;
use crate::error::{RhiError, RhiResult};

/// Relative share of each descriptor type in a pool.
///
/// A pool created for a batch of `n` sets holds `weight * n` descriptors of
/// each listed type.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSizes {
    pub weights: Vec<(vk::DescriptorType, f32)>,
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self {
            weights: vec![
                (vk::DescriptorType::SAMPLER, 0.5),
                (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
                (vk::DescriptorType::SAMPLED_IMAGE, 4.0),
                (vk::DescriptorType::STORAGE_IMAGE, 1.0),
                (vk::DescriptorType::UNIFORM_TEXEL_BUFFER, 1.0),
                (vk::DescriptorType::STORAGE_TEXEL_BUFFER, 1.0),
                (vk::DescriptorType::UNIFORM_BUFFER, 2.0),
                (vk::DescriptorType::STORAGE_BUFFER, 2.0),
                (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1.0),
                (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, 1.0),
                (vk::DescriptorType::INPUT_ATTACHMENT, 0.5),
            ],
        }
    }
}

impl PoolSizes {
    /// Per-type descriptor counts for a pool of `batch` sets.
    pub fn for_batch(&self, batch: u32) -> Vec<vk::DescriptorPoolSize> {
        self.weights
            .iter()
            .map(|&(ty, weight)| {
                vk::DescriptorPoolSize::default()
                    .ty(ty)
                    .descriptor_count((weight * batch as f32) as u32)
            })
            .collect()
    }
}

/// Allocates descriptor sets from a recycled list of pools.
///
/// Pools move between three places: the active pool sets are allocated from,
/// the used list (every pool handed out since the last reset, active one
/// included), and the free list of reset pools waiting for reuse.
#[derive(Debug)]
pub struct DescriptorAllocator {
    pool_sizes: PoolSizes,
    batch: u32,
    current: Option<vk::DescriptorPool>,
    used: Vec<vk::DescriptorPool>,
    free: Vec<vk::DescriptorPool>,
}

impl DescriptorAllocator {
    /// Creates an allocator with the default weights and `batch` sets per pool.
    pub fn new(batch: u32) -> Self {
        Self::with_pool_sizes(PoolSizes::default(), batch)
    }

    pub fn with_pool_sizes(pool_sizes: PoolSizes, batch: u32) -> Self {
        Self {
            pool_sizes,
            batch,
            current: None,
            used: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Pools handed out since the last reset.
    #[inline]
    pub fn used_pool_count(&self) -> usize {
        self.used.len()
    }

    /// Reset pools waiting for reuse.
    #[inline]
    pub fn free_pool_count(&self) -> usize {
        self.free.len()
    }

    /// Allocates one descriptor set with `layout`.
    ///
    /// If the active pool is exhausted or fragmented, a fresh pool is grabbed
    /// and the allocation retried once.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DescriptorAllocation`] on any other error, or when
    /// the retry fails too. Nothing was allocated in that case.
    pub fn allocate<B: DescriptorBackend + ?Sized>(
        &mut self,
        backend: &B,
        layout: vk::DescriptorSetLayout,
    ) -> RhiResult<vk::DescriptorSet> {
        let pool = match self.current {
            Some(pool) => pool,
            None => self.grab_pool(backend)?,
        };

        match backend.allocate_descriptor_set(pool, layout) {
            Ok(set) => return Ok(set),
            Err(vk::Result::ERROR_FRAGMENTED_POOL | vk::Result::ERROR_OUT_OF_POOL_MEMORY) => {
                debug!("Descriptor pool exhausted, retrying on a fresh pool");
            }
            Err(e) => {
                error!("Descriptor set allocation failed: {:?}", e);
                return Err(RhiError::DescriptorAllocation(e));
            }
        }

        let pool = self.grab_pool(backend)?;
        backend.allocate_descriptor_set(pool, layout).map_err(|e| {
            error!("Descriptor set allocation failed twice: {:?}", e);
            RhiError::DescriptorAllocation(e)
        })
    }

    /// Resets every used pool and moves it to the free list.
    ///
    /// Sets allocated before the reset become invalid; no in-flight GPU work
    /// may still reference them.
    pub fn reset_pools<B: DescriptorBackend + ?Sized>(&mut self, backend: &B) -> RhiResult<()> {
        for &pool in &self.used {
            backend.reset_descriptor_pool(pool)?;
        }
        debug!("Reset {} descriptor pool(s)", self.used.len());
        self.free.append(&mut self.used);
        self.current = None;
        Ok(())
    }

    /// Destroys every pool owned by the allocator.
    pub fn cleanup<B: DescriptorBackend + ?Sized>(&mut self, backend: &B) {
        for pool in self.free.drain(..).chain(self.used.drain(..)) {
            backend.destroy_descriptor_pool(pool);
        }
        self.current = None;
    }

    fn grab_pool<B: DescriptorBackend + ?Sized>(
        &mut self,
        backend: &B,
    ) -> RhiResult<vk::DescriptorPool> {
        let pool = match self.free.pop() {
            Some(pool) => pool,
            None => {
                let sizes = self.pool_sizes.for_batch(self.batch);
                let info = vk::DescriptorPoolCreateInfo::default()
                    .max_sets(self.batch)
                    .pool_sizes(&sizes);
                let pool = backend.create_descriptor_pool(&info)?;
                debug!("Created descriptor pool for {} sets", self.batch);
                pool
            }
        };
        self.used.push(pool);
        self.current = Some(pool);
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::mock::MockBackend;

    fn layout() -> vk::DescriptorSetLayout {
        use ash::vk::Handle;
        vk::DescriptorSetLayout::from_raw(0xAB)
    }

    #[test]
    fn test_pool_sizes_scale_with_batch() {
        let sizes = PoolSizes::default().for_batch(1000);
        let count = |ty| {
            sizes
                .iter()
                .find(|s| s.ty == ty)
                .map(|s| s.descriptor_count)
        };
        assert_eq!(count(vk::DescriptorType::SAMPLER), Some(500));
        assert_eq!(count(vk::DescriptorType::COMBINED_IMAGE_SAMPLER), Some(4000));
        assert_eq!(count(vk::DescriptorType::UNIFORM_BUFFER), Some(2000));
        assert_eq!(count(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC), Some(1000));
        assert_eq!(count(vk::DescriptorType::INPUT_ATTACHMENT), Some(500));
        assert_eq!(sizes.len(), 11);
    }

    #[test]
    fn test_first_allocation_creates_one_pool() {
        let backend = MockBackend::default();
        let mut allocator = DescriptorAllocator::new(1000);

        allocator.allocate(&backend, layout()).unwrap();
        allocator.allocate(&backend, layout()).unwrap();

        assert_eq!(backend.state.borrow().pools_created, 1);
        assert_eq!(allocator.used_pool_count(), 1);
        assert_eq!(allocator.free_pool_count(), 0);
    }

    #[test]
    fn test_exhausted_pool_retries_on_fresh_pool() {
        let backend = MockBackend::with_pool_capacity(2);
        let mut allocator = DescriptorAllocator::new(2);

        for _ in 0..5 {
            allocator.allocate(&backend, layout()).unwrap();
        }

        // 2 + 2 + 1
        assert_eq!(backend.state.borrow().pools_created, 3);
        assert_eq!(allocator.used_pool_count(), 3);
    }

    #[test]
    fn test_fragmented_pool_also_retries() {
        let backend = MockBackend::default();
        let mut allocator = DescriptorAllocator::new(10);
        allocator.allocate(&backend, layout()).unwrap();

        backend.force_error(vk::Result::ERROR_FRAGMENTED_POOL);
        allocator.allocate(&backend, layout()).unwrap();
        assert_eq!(backend.state.borrow().pools_created, 2);
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let backend = MockBackend::default();
        let mut allocator = DescriptorAllocator::new(10);

        backend.force_error(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let err = allocator.allocate(&backend, layout()).unwrap_err();

        assert!(matches!(
            err,
            RhiError::DescriptorAllocation(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
        ));
        assert_eq!(backend.state.borrow().pools_created, 1);
    }

    #[test]
    fn test_second_failure_is_surfaced() {
        let backend = MockBackend::default();
        let mut allocator = DescriptorAllocator::new(10);

        backend.force_error(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        backend.force_error(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        let err = allocator.allocate(&backend, layout()).unwrap_err();

        assert!(matches!(
            err,
            RhiError::DescriptorAllocation(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
        ));
        // exactly one retry, so exactly one extra pool
        assert_eq!(backend.state.borrow().pools_created, 2);
        assert!(backend.state.borrow().forced_errors.is_empty());
    }

    #[test]
    fn test_reset_moves_pools_to_free_list_and_reuses_them() {
        let backend = MockBackend::with_pool_capacity(1);
        let mut allocator = DescriptorAllocator::new(1);
        for _ in 0..3 {
            allocator.allocate(&backend, layout()).unwrap();
        }
        assert_eq!(allocator.used_pool_count(), 3);

        allocator.reset_pools(&backend).unwrap();
        assert_eq!(allocator.used_pool_count(), 0);
        assert_eq!(allocator.free_pool_count(), 3);
        assert!(backend.state.borrow().pools.values().all(|p| p.resets == 1 && p.used == 0));

        for _ in 0..3 {
            allocator.allocate(&backend, layout()).unwrap();
        }
        assert_eq!(backend.state.borrow().pools_created, 3);
        assert_eq!(allocator.free_pool_count(), 0);
    }

    #[test]
    fn test_cleanup_destroys_all_pools() {
        let backend = MockBackend::with_pool_capacity(1);
        let mut allocator = DescriptorAllocator::new(1);
        for _ in 0..2 {
            allocator.allocate(&backend, layout()).unwrap();
        }
        allocator.reset_pools(&backend).unwrap();
        allocator.allocate(&backend, layout()).unwrap();

        allocator.cleanup(&backend);
        let state = backend.state.borrow();
        assert_eq!(state.pools_destroyed, 2);
        assert!(state.pools.is_empty());
    }
}
