use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use ash::vk;
use tracing::debug;

use super::DescriptorBackend;
use crate::error::RhiResult;

/// The parts of a layout binding that identify it structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

impl From<&vk::DescriptorSetLayoutBinding<'_>> for LayoutBinding {
    fn from(binding: &vk::DescriptorSetLayoutBinding<'_>) -> Self {
        Self {
            binding: binding.binding,
            ty: binding.descriptor_type,
            count: binding.descriptor_count,
            stages: binding.stage_flags,
        }
    }
}

impl LayoutBinding {
    /// Binding index, type, count and stage mask packed into one word.
    fn packed(&self) -> u64 {
        u64::from(self.binding)
            | (u64::from(self.ty.as_raw() as u32) << 8)
            | (u64::from(self.count) << 16)
            | (u64::from(self.stages.as_raw()) << 24)
    }
}

/// Canonical description of a descriptor set layout.
///
/// Bindings are kept sorted by index, so two descriptions listing the same
/// bindings in a different order compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutKey {
    flags: vk::DescriptorSetLayoutCreateFlags,
    bindings: Vec<LayoutBinding>,
}

impl LayoutKey {
    pub fn new(
        flags: vk::DescriptorSetLayoutCreateFlags,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> Self {
        let mut bindings: Vec<LayoutBinding> = bindings.iter().map(LayoutBinding::from).collect();
        if !bindings.is_sorted_by_key(|b| b.binding) {
            bindings.sort_by_key(|b| b.binding);
        }
        Self { flags, bindings }
    }

    #[inline]
    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    /// Hash of the binding count, the layout flags and every packed binding.
    pub fn structural_hash(&self) -> u64 {
        let header = self.bindings.len() as u64 | (u64::from(self.flags.as_raw()) << 32);
        self.bindings
            .iter()
            .fold(hash_word(header), |acc, binding| acc ^ hash_word(binding.packed()))
    }
}

impl Hash for LayoutKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.structural_hash());
    }
}

fn hash_word(word: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    word.hash(&mut hasher);
    hasher.finish()
}

/// Deduplicates descriptor set layouts by structure.
///
/// Each cache is independent; layouts from different caches are never
/// shared even when they describe the same bindings.
#[derive(Debug, Default)]
pub struct DescriptorLayoutCache {
    layouts: HashMap<LayoutKey, vk::DescriptorSetLayout>,
}

impl DescriptorLayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct layouts created so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Returns the layout for `bindings`, creating it on first use.
    pub fn create_layout<B: DescriptorBackend + ?Sized>(
        &mut self,
        backend: &B,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> RhiResult<vk::DescriptorSetLayout> {
        self.create_layout_with_flags(backend, vk::DescriptorSetLayoutCreateFlags::empty(), bindings)
    }

    /// As [`create_layout`](Self::create_layout), with layout creation flags.
    pub fn create_layout_with_flags<B: DescriptorBackend + ?Sized>(
        &mut self,
        backend: &B,
        flags: vk::DescriptorSetLayoutCreateFlags,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> RhiResult<vk::DescriptorSetLayout> {
        let key = LayoutKey::new(flags, bindings);
        if let Some(&layout) = self.layouts.get(&key) {
            return Ok(layout);
        }

        let info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(flags)
            .bindings(bindings);
        let layout = backend.create_descriptor_set_layout(&info)?;
        debug!(
            "Created descriptor set layout with {} binding(s)",
            key.bindings().len()
        );
        self.layouts.insert(key, layout);
        Ok(layout)
    }

    /// Destroys every cached layout.
    pub fn cleanup<B: DescriptorBackend + ?Sized>(&mut self, backend: &B) {
        for (_, layout) in self.layouts.drain() {
            backend.destroy_descriptor_set_layout(layout);
        }
    }
}
