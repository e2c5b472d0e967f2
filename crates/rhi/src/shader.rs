//! Shader modules and shader effects.
//!
//! # Overview
//!
//! - [`ShaderModule`] is a SPIR-V module plus the descriptor bindings its
//!   stage declares. SPIR-V is not reflected; the caller lists the bindings.
//! - [`ShaderEffect`] merges the declarations of several stages into one set
//!   of descriptor set layouts and a pipeline layout. Two stages may share a
//!   `(set, binding)` slot only if they agree on type and count.
//!
//! Modules are only needed until the pipelines using them are built and are
//! destroyed right after with [`ShaderModule::destroy`].
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use engine_rhi::deletion::DeletionStack;
//! use engine_rhi::descriptor::DescriptorLayoutCache;
//! use engine_rhi::shader::{ShaderBinding, ShaderEffect, ShaderModule, ShaderStage};
//! use engine_rhi::vk;
//!
//! # fn example(device: &engine_rhi::device::Device) -> engine_rhi::RhiResult<()> {
//! let mut cache = DescriptorLayoutCache::new();
//! let mut deletion = DeletionStack::new("main");
//! let vert = ShaderModule::load(
//!     device,
//!     Path::new("assets/shaders/mesh.vert.spv"),
//!     ShaderStage::Vertex,
//!     &[ShaderBinding::new(0, 0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)],
//! )?;
//! let mut effect = ShaderEffect::new();
//! effect.add_stage(&vert)?;
//! let layout = effect.build_layout(device, &mut cache, &[], &mut deletion)?;
//! # let _ = layout;
//! vert.destroy(device);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use ash::vk;
use tracing::{debug, error, info};

use crate::deletion::{DeletionStack, Disposal};
use crate::descriptor::DescriptorLayoutCache;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Highest number of descriptor sets a shader effect may use.
pub const MAX_DESCRIPTOR_SETS: usize = 4;

/// Shader stage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A descriptor a shader stage reads, at `(set, binding)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderBinding {
    pub set: u32,
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub count: u32,
}

impl ShaderBinding {
    /// A single descriptor of type `ty`.
    #[inline]
    pub const fn new(set: u32, binding: u32, ty: vk::DescriptorType) -> Self {
        Self {
            set,
            binding,
            ty,
            count: 1,
        }
    }
}

/// A SPIR-V module for one stage, with the bindings it declares.
pub struct ShaderModule {
    module: vk::ShaderModule,
    stage: ShaderStage,
    bindings: Vec<ShaderBinding>,
}

impl ShaderModule {
    /// Loads a SPIR-V file and creates the module.
    ///
    /// # Errors
    ///
    /// [`RhiError::ShaderError`] if the file cannot be read or is not valid
    /// SPIR-V; a Vulkan error if module creation fails.
    pub fn load(
        device: &Device,
        path: &Path,
        stage: ShaderStage,
        bindings: &[ShaderBinding],
    ) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);

        let mut file = std::fs::File::open(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to open shader file {:?}: {}", path, e))
        })?;
        let code = ash::util::read_spv(&mut file).map_err(|e| {
            RhiError::ShaderError(format!("Invalid SPIR-V in {:?}: {}", path, e))
        })?;

        Self::from_words(device, &code, stage, bindings)
    }

    /// Creates a module from SPIR-V words.
    pub fn from_words(
        device: &Device,
        code: &[u32],
        stage: ShaderStage,
        bindings: &[ShaderBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        info!(
            "Created {} shader module with {} binding(s)",
            stage,
            bindings.len()
        );

        Ok(Self {
            module,
            stage,
            bindings: bindings.to_vec(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    #[inline]
    pub fn bindings(&self) -> &[ShaderBinding] {
        &self.bindings
    }

    /// Destroys the module. Pipelines built from it stay valid.
    pub fn destroy(self, device: &Device) {
        unsafe { device.handle().destroy_shader_module(self.module, None) };
        debug!("Destroyed {} shader module", self.stage);
    }
}

/// A merged binding: the declared type and count plus every stage using it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergedBinding {
    pub ty: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

/// Stages of one pipeline plus their merged descriptor interface.
#[derive(Default)]
pub struct ShaderEffect {
    stages: Vec<(vk::ShaderModule, ShaderStage)>,
    bindings: BTreeMap<(u32, u32), MergedBinding>,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    pipeline_layout: vk::PipelineLayout,
}

impl ShaderEffect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stage and merges its binding declarations.
    ///
    /// # Errors
    ///
    /// [`RhiError::BindingConflict`] if a binding disagrees in type or count
    /// with one already declared at the same `(set, binding)`. The effect is
    /// left unchanged in that case.
    pub fn add_stage(&mut self, module: &ShaderModule) -> RhiResult<()> {
        self.merge_bindings(module.stage(), module.bindings())?;
        self.stages.push((module.handle(), module.stage()));
        Ok(())
    }

    fn merge_bindings(&mut self, stage: ShaderStage, declared: &[ShaderBinding]) -> RhiResult<()> {
        let flag = stage.to_vk_stage();
        let mut merged = self.bindings.clone();

        for decl in declared {
            if decl.set as usize >= MAX_DESCRIPTOR_SETS {
                return Err(RhiError::ShaderError(format!(
                    "{} stage declares set {}, only {} sets are supported",
                    stage, decl.set, MAX_DESCRIPTOR_SETS
                )));
            }
            match merged.get_mut(&(decl.set, decl.binding)) {
                Some(existing) if existing.ty == decl.ty && existing.count == decl.count => {
                    existing.stages |= flag;
                }
                Some(existing) => {
                    error!(
                        "Binding conflict at set {}, binding {}: {:?}x{} vs {:?}x{} ({} stage)",
                        decl.set,
                        decl.binding,
                        existing.ty,
                        existing.count,
                        decl.ty,
                        decl.count,
                        stage
                    );
                    return Err(RhiError::BindingConflict {
                        set: decl.set,
                        binding: decl.binding,
                    });
                }
                None => {
                    merged.insert(
                        (decl.set, decl.binding),
                        MergedBinding {
                            ty: decl.ty,
                            count: decl.count,
                            stages: flag,
                        },
                    );
                }
            }
        }

        self.bindings = merged;
        Ok(())
    }

    /// The merged binding at `(set, binding)`, if any stage declared it.
    pub fn binding(&self, set: u32, binding: u32) -> Option<MergedBinding> {
        self.bindings.get(&(set, binding)).copied()
    }

    /// Number of set layouts the effect needs: one past the highest used set.
    pub fn set_count(&self) -> usize {
        self.bindings
            .keys()
            .map(|&(set, _)| set as usize + 1)
            .max()
            .unwrap_or(0)
    }

    /// Layout bindings for `set`, sorted by binding index.
    pub fn set_bindings(&self, set: u32) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        self.bindings
            .range((set, 0)..=(set, u32::MAX))
            .map(|(&(_, binding), merged)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(merged.ty)
                    .descriptor_count(merged.count)
                    .stage_flags(merged.stages)
            })
            .collect()
    }

    /// Builds the set layouts through `cache` and the pipeline layout.
    ///
    /// Unused sets below the highest used one get empty layouts. The pipeline
    /// layout is pushed onto `deletion`; set layouts belong to the cache.
    pub fn build_layout(
        &mut self,
        device: &Device,
        cache: &mut DescriptorLayoutCache,
        push_constants: &[vk::PushConstantRange],
        deletion: &mut DeletionStack,
    ) -> RhiResult<vk::PipelineLayout> {
        let mut set_layouts = Vec::with_capacity(self.set_count());
        for set in 0..self.set_count() as u32 {
            set_layouts.push(cache.create_layout(device, &self.set_bindings(set))?);
        }

        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(push_constants);
        let pipeline_layout = unsafe { device.handle().create_pipeline_layout(&info, None)? };
        deletion.push(Disposal::PipelineLayout(pipeline_layout));

        debug!(
            "Built pipeline layout with {} set layout(s) for {} stage(s)",
            set_layouts.len(),
            self.stages.len()
        );
        self.set_layouts = set_layouts;
        self.pipeline_layout = pipeline_layout;
        Ok(pipeline_layout)
    }

    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    #[inline]
    pub fn set_layouts(&self) -> &[vk::DescriptorSetLayout] {
        &self.set_layouts
    }

    /// Stage create infos, entry point `main`.
    pub fn stage_infos(&self) -> Vec<vk::PipelineShaderStageCreateInfo<'static>> {
        self.stages
            .iter()
            .map(|&(module, stage)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.to_vk_stage())
                    .module(module)
                    .name(c"main")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UBO: vk::DescriptorType = vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC;
    const SSBO: vk::DescriptorType = vk::DescriptorType::STORAGE_BUFFER;
    const SAMPLER: vk::DescriptorType = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(ShaderStage::Vertex.to_vk_stage(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.to_vk_stage(), vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(ShaderStage::Compute.to_vk_stage(), vk::ShaderStageFlags::COMPUTE);
        assert_eq!(ShaderStage::Fragment.to_string(), "fragment");
    }

    #[test]
    fn test_shared_binding_merges_stage_flags() {
        let mut effect = ShaderEffect::new();
        effect
            .merge_bindings(
                ShaderStage::Vertex,
                &[ShaderBinding::new(0, 0, UBO), ShaderBinding::new(0, 1, UBO), ShaderBinding::new(1, 0, SSBO)],
            )
            .unwrap();
        effect
            .merge_bindings(
                ShaderStage::Fragment,
                &[ShaderBinding::new(0, 1, UBO), ShaderBinding::new(2, 0, SAMPLER)],
            )
            .unwrap();

        assert_eq!(effect.binding(0, 0).unwrap().stages, vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            effect.binding(0, 1).unwrap().stages,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(effect.binding(2, 0).unwrap().stages, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(effect.set_count(), 3);
    }

    #[test]
    fn test_conflicting_type_is_rejected() {
        let mut effect = ShaderEffect::new();
        effect
            .merge_bindings(ShaderStage::Vertex, &[ShaderBinding::new(1, 0, SSBO)])
            .unwrap();
        let err = effect
            .merge_bindings(ShaderStage::Fragment, &[ShaderBinding::new(1, 0, UBO)])
            .unwrap_err();
        assert!(matches!(err, RhiError::BindingConflict { set: 1, binding: 0 }));
        assert_eq!(effect.binding(1, 0).unwrap().stages, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_conflicting_count_is_rejected() {
        let mut effect = ShaderEffect::new();
        effect
            .merge_bindings(ShaderStage::Vertex, &[ShaderBinding::new(2, 0, SAMPLER)])
            .unwrap();
        let array = ShaderBinding {
            count: 4,
            ..ShaderBinding::new(2, 0, SAMPLER)
        };
        assert!(matches!(
            effect.merge_bindings(ShaderStage::Fragment, &[array]),
            Err(RhiError::BindingConflict { set: 2, binding: 0 })
        ));
    }

    #[test]
    fn test_failed_merge_leaves_effect_unchanged() {
        let mut effect = ShaderEffect::new();
        effect
            .merge_bindings(ShaderStage::Vertex, &[ShaderBinding::new(0, 0, UBO)])
            .unwrap();
        let result = effect.merge_bindings(
            ShaderStage::Fragment,
            &[ShaderBinding::new(0, 1, UBO), ShaderBinding::new(0, 0, SSBO)],
        );
        assert!(result.is_err());
        assert!(effect.binding(0, 1).is_none());
    }

    #[test]
    fn test_set_bindings_are_sorted_and_gaps_are_empty() {
        let mut effect = ShaderEffect::new();
        effect
            .merge_bindings(
                ShaderStage::Vertex,
                &[ShaderBinding::new(0, 1, UBO), ShaderBinding::new(0, 0, UBO), ShaderBinding::new(2, 0, SAMPLER)],
            )
            .unwrap();

        let set0 = effect.set_bindings(0);
        assert_eq!(set0.len(), 2);
        assert_eq!(set0[0].binding, 0);
        assert_eq!(set0[1].binding, 1);
        assert!(effect.set_bindings(1).is_empty());
        assert_eq!(effect.set_count(), 3);
    }

    #[test]
    fn test_set_index_out_of_range() {
        let mut effect = ShaderEffect::new();
        let result = effect.merge_bindings(ShaderStage::Vertex, &[ShaderBinding::new(4, 0, UBO)]);
        assert!(matches!(result, Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_empty_effect_needs_no_sets() {
        let effect = ShaderEffect::new();
        assert_eq!(effect.set_count(), 0);
        assert!(effect.stage_infos().is_empty());
    }
}
