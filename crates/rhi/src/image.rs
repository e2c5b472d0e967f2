//! GPU images, image views and samplers.
//!
//! # Overview
//!
//! - [`AllocatedImage`] is a 2D image in GPU-only memory plus one view over
//!   mip 0. Depth targets and sampled textures both use it.
//! - [`create_sampler`] builds the sampler used by textured materials.
//!
//! As with buffers, creation registers the image, its memory and its view
//! with a [`DeletionStack`]; there is no `Drop`.

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme};
use tracing::{debug, info};

use crate::deletion::{DeletionStack, Disposal};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Format of the depth attachment.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Format textures are uploaded in.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// A 2D image with a single view.
#[derive(Clone, Copy, Debug)]
pub struct AllocatedImage {
    image: vk::Image,
    view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent3D,
}

impl AllocatedImage {
    /// Creates a depth attachment matching `extent`.
    pub fn create_depth(
        device: &Device,
        extent: vk::Extent2D,
        deletion: &mut DeletionStack,
    ) -> RhiResult<Self> {
        let image = Self::create(
            device,
            vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            "depth_image",
            deletion,
        )?;
        info!(
            "Created depth image: {}x{} ({:?})",
            extent.width, extent.height, DEPTH_FORMAT
        );
        Ok(image)
    }

    /// Creates an RGBA8 texture that can be filled by a transfer and sampled.
    pub fn create_texture(
        device: &Device,
        extent: vk::Extent3D,
        name: &str,
        deletion: &mut DeletionStack,
    ) -> RhiResult<Self> {
        Self::create(
            device,
            extent,
            TEXTURE_FORMAT,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            name,
            deletion,
        )
    }

    fn create(
        device: &Device,
        extent: vk::Extent3D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        name: &str,
        deletion: &mut DeletionStack,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "image '{}' must have a non-zero extent",
                name
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let raw = device.handle();
        let image = unsafe { raw.create_image(&image_info, None)? };
        let requirements = unsafe { raw.get_image_memory_requirements(image) };

        let allocation = device.lock_allocator().and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(RhiError::from)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { raw.destroy_image(image, None) };
                return Err(e);
            }
        };

        let bound = unsafe { raw.bind_image_memory(image, allocation.memory(), allocation.offset()) };
        deletion.push(Disposal::Image { image, allocation });
        bound?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(full_range(aspect_for_format(format)));
        let view = unsafe { raw.create_image_view(&view_info, None)? };
        deletion.push(Disposal::ImageView(view));

        debug!(
            "Created image '{}' ({}x{}, {:?})",
            name, extent.width, extent.height, format
        );

        Ok(Self {
            image,
            view,
            format,
            extent,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }
}

/// Creates a sampler with the given min/mag filter and repeat addressing.
pub fn create_sampler(
    device: &Device,
    filter: vk::Filter,
    deletion: &mut DeletionStack,
) -> RhiResult<vk::Sampler> {
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(filter)
        .min_filter(filter)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT);
    let sampler = unsafe { device.handle().create_sampler(&info, None)? };
    deletion.push(Disposal::Sampler(sampler));
    Ok(sampler)
}

/// The aspect an image of `format` is viewed with.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT | vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Subresource range over mip 0, layer 0.
pub fn full_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .level_count(1)
        .layer_count(1)
}
