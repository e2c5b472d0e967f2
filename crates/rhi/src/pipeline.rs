//! Graphics pipeline creation.
//!
//! # Overview
//!
//! - [`GraphicsPipelineBuilder`] collects fixed-function state, takes its
//!   shader stages and layout from a [`ShaderEffect`], and builds a pipeline
//!   for subpass 0 of a render pass.
//! - Viewport and scissor are always dynamic, so pipelines survive swapchain
//!   recreation as long as the render pass stays compatible.
//!
//! # Example
//!
//! ```no_run
//! use engine_rhi::deletion::DeletionStack;
//! use engine_rhi::pipeline::{CullMode, GraphicsPipelineBuilder};
//! use engine_rhi::shader::ShaderEffect;
//! use engine_rhi::vertex::Vertex;
//! use engine_rhi::vk;
//!
//! # fn example(device: &engine_rhi::device::Device, effect: &ShaderEffect, pass: vk::RenderPass) -> engine_rhi::RhiResult<()> {
//! let mut deletion = DeletionStack::new("main");
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_binding(Vertex::binding_description())
//!     .vertex_attributes(&Vertex::attribute_descriptions())
//!     .cull_mode(CullMode::None)
//!     .build(device, effect, pass, &mut deletion)?;
//! # let _ = pipeline;
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::info;

use crate::deletion::{DeletionStack, Disposal};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::ShaderEffect;

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

const DYNAMIC_STATES: [vk::DynamicState; 2] = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Depth comparison operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    #[default]
    LessOrEqual,
    Greater,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Builder for graphics pipelines.
///
/// Pipelines draw filled triangle lists with clockwise front faces into one
/// opaque color attachment, single sample. Culling is off and depth test and
/// write use LESS_OR_EQUAL unless changed.
#[derive(Clone, Debug)]
pub struct GraphicsPipelineBuilder {
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    cull_mode: CullMode,
    depth_test_enable: bool,
    depth_write_enable: bool,
    depth_compare_op: CompareOp,
}

impl Default for GraphicsPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsPipelineBuilder {
    pub fn new() -> Self {
        Self {
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            cull_mode: CullMode::None,
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::LessOrEqual,
        }
    }

    pub fn vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.vertex_bindings.push(binding);
        self
    }

    pub fn vertex_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.vertex_attributes.extend_from_slice(attributes);
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    /// Enables or disables the depth test and depth writes together.
    pub fn depth(mut self, test: bool, write: bool, op: CompareOp) -> Self {
        self.depth_test_enable = test;
        self.depth_write_enable = test && write;
        self.depth_compare_op = op;
        self
    }

    /// Builds the pipeline for subpass 0 of `render_pass`.
    ///
    /// `effect` must have had [`ShaderEffect::build_layout`] called. The
    /// pipeline is pushed onto `deletion`.
    ///
    /// # Errors
    ///
    /// [`RhiError::PipelineError`] if the effect has no stages or no layout;
    /// a Vulkan error if creation fails.
    pub fn build(
        &self,
        device: &Device,
        effect: &ShaderEffect,
        render_pass: vk::RenderPass,
        deletion: &mut DeletionStack,
    ) -> RhiResult<vk::Pipeline> {
        let stages = effect.stage_infos();
        if stages.is_empty() {
            return Err(RhiError::PipelineError(
                "Shader effect has no stages".to_string(),
            ));
        }
        if effect.pipeline_layout() == vk::PipelineLayout::null() {
            return Err(RhiError::PipelineError(
                "Shader effect layout has not been built".to_string(),
            ));
        }

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        // Viewport and scissor are dynamic; only the counts are fixed.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(vk::FrontFace::CLOCKWISE);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test_enable)
            .depth_write_enable(self.depth_write_enable)
            .depth_compare_op(if self.depth_test_enable {
                self.depth_compare_op.to_vk()
            } else {
                vk::CompareOp::ALWAYS
            })
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(effect.pipeline_layout())
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| RhiError::PipelineError(format!("Pipeline creation failed: {:?}", e)))?
        };
        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::PipelineError("No pipeline returned".to_string()))?;
        deletion.push(Disposal::Pipeline(pipeline));

        info!("Graphics pipeline created with {} stage(s)", stages.len());
        Ok(pipeline)
    }
}
