use ash::vk;

use super::{DescriptorAllocator, DescriptorBackend, DescriptorLayoutCache};
use crate::error::RhiResult;

#[derive(Debug, Clone, Copy)]
enum Resource {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    binding: u32,
    ty: vk::DescriptorType,
    resource: Resource,
}

/// Fluent builder producing one descriptor set and its cached layout.
pub struct DescriptorSetBuilder<'a> {
    cache: &'a mut DescriptorLayoutCache,
    allocator: &'a mut DescriptorAllocator,
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
    writes: Vec<PendingWrite>,
}

impl<'a> DescriptorSetBuilder<'a> {
    pub fn begin(
        cache: &'a mut DescriptorLayoutCache,
        allocator: &'a mut DescriptorAllocator,
    ) -> Self {
        Self {
            cache,
            allocator,
            bindings: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Adds a buffer descriptor at `binding`.
    pub fn bind_buffer(
        self,
        binding: u32,
        info: vk::DescriptorBufferInfo,
        ty: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        self.push(binding, ty, stages, Resource::Buffer(info))
    }

    /// Adds an image descriptor at `binding`.
    pub fn bind_image(
        self,
        binding: u32,
        info: vk::DescriptorImageInfo,
        ty: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        self.push(binding, ty, stages, Resource::Image(info))
    }

    fn push(
        mut self,
        binding: u32,
        ty: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
        resource: Resource,
    ) -> Self {
        self.bindings.push(super::layout_binding(binding, ty, stages));
        self.writes.push(PendingWrite {
            binding,
            ty,
            resource,
        });
        self
    }

    /// Resolves the layout, allocates the set and writes every descriptor.
    ///
    /// # Errors
    ///
    /// Fails if layout creation or set allocation fails. No descriptor has
    /// been written in that case.
    pub fn build<B: DescriptorBackend + ?Sized>(
        self,
        backend: &B,
    ) -> RhiResult<(vk::DescriptorSet, vk::DescriptorSetLayout)> {
        let layout = self.cache.create_layout(backend, &self.bindings)?;
        let set = self.allocator.allocate(backend, layout)?;

        let writes: Vec<vk::WriteDescriptorSet<'_>> = self
            .writes
            .iter()
            .map(|pending| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(pending.binding)
                    .descriptor_type(pending.ty);
                match &pending.resource {
                    Resource::Buffer(info) => write.buffer_info(std::slice::from_ref(info)),
                    Resource::Image(info) => write.image_info(std::slice::from_ref(info)),
                }
            })
            .collect();
        backend.update_descriptor_sets(&writes);

        Ok((set, layout))
    }
}
