//! Swapchain management.
//!
//! # Overview
//!
//! [`Swapchain`] owns the VkSwapchainKHR handle, its images and one color view
//! per image. Like every other object here it has no `Drop`: creation pushes
//! the swapchain and its views onto a [`DeletionStack`], normally a dedicated
//! stack that is flushed and rebuilt whenever the window changes.
//!
//! Acquire and present report their outcome as [`Acquire`] / [`Present`]
//! instead of raw result codes. Out-of-date and suboptimal are ordinary
//! outcomes the frame loop reacts to; a timed-out acquire is
//! [`RhiError::Timeout`], which is fatal.
//!
//! # Example
//!
//! ```no_run
//! use engine_rhi::swapchain::{Acquire, Swapchain};
//! # fn example(swapchain: &Swapchain, image_available: engine_rhi::vk::Semaphore) -> engine_rhi::RhiResult<()> {
//! match swapchain.acquire(image_available, 1_000_000_000)? {
//!     Acquire::Image { index, .. } => { let _ = index; /* record and present */ }
//!     Acquire::OutOfDate => { /* rebuild swapchain resources */ }
//! }
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::{debug, info, warn};

use crate::deletion::{DeletionStack, Disposal};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::full_range;
use crate::instance::Instance;

/// Outcome of acquiring the next swapchain image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    /// An image is available. `suboptimal` images may still be rendered to.
    Image { index: u32, suboptimal: bool },
    /// The surface changed; nothing can be presented until recreation.
    OutOfDate,
}

/// Outcome of presenting an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Present {
    Ok,
    Suboptimal,
    OutOfDate,
}

impl Present {
    /// Whether swapchain resources should be rebuilt after this present.
    #[inline]
    pub fn needs_recreate(self) -> bool {
        !matches!(self, Present::Ok)
    }
}

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// True if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Vulkan swapchain and its image views.
pub struct Swapchain {
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a swapchain for `surface` at roughly `width` x `height`.
    ///
    /// Prefers a B8G8R8A8 sRGB format and presents with FIFO. The swapchain
    /// and its views are pushed onto `deletion`.
    ///
    /// # Errors
    ///
    /// Fails if the surface has no usable format or present mode, or if any
    /// Vulkan call fails.
    pub fn create(
        instance: &Instance,
        device: &Device,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        deletion: &mut DeletionStack,
    ) -> RhiResult<Self> {
        let loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        let families = device.queue_families();
        let (graphics_family, present_family) = families
            .graphics_family
            .zip(families.present_family)
            .ok_or_else(|| RhiError::SwapchainError("queue families incomplete".to_string()))?;
        let queue_family_indices = [graphics_family, present_family];

        let (sharing_mode, queue_family_indices_slice) = if graphics_family != present_family {
            debug!(
                "Using CONCURRENT sharing mode between graphics ({}) and present ({}) queues",
                graphics_family, present_family
            );
            (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_family_indices_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };
        deletion.push(Disposal::Swapchain {
            loader: loader.clone(),
            swapchain,
        });

        let images = unsafe { loader.get_swapchain_images(swapchain)? };
        let image_views = create_image_views(device, &images, surface_format.format, deletion)?;
        info!("Swapchain created with {} images", images.len());

        Ok(Self {
            loader,
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            extent,
            present_mode,
        })
    }

    /// Acquires the next image, waiting at most `timeout_ns`.
    ///
    /// # Errors
    ///
    /// [`RhiError::Timeout`] if no image became available in time; any other
    /// failure except out-of-date is returned as a Vulkan error.
    pub fn acquire(&self, semaphore: vk::Semaphore, timeout_ns: u64) -> RhiResult<Acquire> {
        classify_acquire(unsafe {
            self.loader
                .acquire_next_image(self.swapchain, timeout_ns, semaphore, vk::Fence::null())
        })
    }

    /// Queues `image_index` for presentation once `wait_semaphore` signals.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<Present> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        classify_present(unsafe { self.loader.queue_present(queue, &present_info) })
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }
}

fn classify_acquire(result: ash::prelude::VkResult<(u32, bool)>) -> RhiResult<Acquire> {
    match result {
        Ok((index, suboptimal)) => Ok(Acquire::Image { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::OutOfDate),
        Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
            Err(RhiError::Timeout("swapchain image"))
        }
        Err(e) => Err(e.into()),
    }
}

fn classify_present(result: ash::prelude::VkResult<bool>) -> RhiResult<Present> {
    match result {
        Ok(false) => Ok(Present::Ok),
        Ok(true) => Ok(Present::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Present::OutOfDate),
        Err(e) => Err(e.into()),
    }
}

/// Surface formats in order of preference.
const PREFERRED_FORMATS: [vk::Format; 2] = [vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM];

/// First preferred format in the sRGB non-linear color space, else whatever
/// the surface lists first.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = PREFERRED_FORMATS.iter().find_map(|&wanted| {
        formats.iter().copied().find(|f| {
            f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
    });
    match preferred {
        Some(format) => format,
        None => {
            warn!("No preferred surface format, using {:?}", formats[0].format);
            formats[0]
        }
    }
}

/// FIFO paces the frame ring to the display; every implementation has it.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if !present_modes.contains(&vk::PresentModeKHR::FIFO) {
        warn!("Surface does not list FIFO, requesting it anyway");
    }
    vk::PresentModeKHR::FIFO
}

/// The surface's own extent when it dictates one, else the window size
/// clamped to the surface limits.
fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let (min, max) = (capabilities.min_image_extent, capabilities.max_image_extent);
    vk::Extent2D {
        width: width.clamp(min.width, max.width),
        height: height.clamp(min.height, max.height),
    }
}

/// One image above the minimum, capped by the maximum (0 means no cap).
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = capabilities.min_image_count + 1;
    match capabilities.max_image_count {
        0 => wanted,
        max => wanted.min(max),
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
    deletion: &mut DeletionStack,
) -> RhiResult<Vec<vk::ImageView>> {
    images
        .iter()
        .map(|&image| -> RhiResult<vk::ImageView> {
            let info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(full_range(vk::ImageAspectFlags::COLOR));
            let view = unsafe { device.handle().create_image_view(&info, None)? };
            deletion.push(Disposal::ImageView(view));
            Ok(view)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn caps(min_count: u32, max_count: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 2048,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_surface_format_preference_order() {
        let unorm = format(vk::Format::B8G8R8A8_UNORM);
        let srgb = format(vk::Format::B8G8R8A8_SRGB);
        let other = format(vk::Format::R16G16B16A16_SFLOAT);

        let pick = |formats: &[vk::SurfaceFormatKHR]| choose_surface_format(formats).format;
        assert_eq!(pick(&[other, unorm, srgb]), srgb.format);
        assert_eq!(pick(&[other, unorm]), unorm.format);
        assert_eq!(pick(&[other]), other.format);
    }

    #[test]
    fn test_surface_format_ignores_other_color_spaces() {
        let extended = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        };
        let unorm = format(vk::Format::B8G8R8A8_UNORM);
        assert_eq!(choose_surface_format(&[extended, unorm]).format, unorm.format);
    }

    #[test]
    fn test_present_mode_is_fifo() {
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_extent_follows_surface_or_clamps_window() {
        let fixed = choose_extent(&caps(2, 0, (1280, 720)), 800, 600);
        assert_eq!((fixed.width, fixed.height), (1280, 720));

        let free = caps(2, 0, (u32::MAX, u32::MAX));
        for ((w, h), expected) in [
            ((800, 600), (800, 600)),
            ((4000, 10), (2048, 64)),
            ((1, 3000), (64, 2048)),
        ] {
            let extent = choose_extent(&free, w, h);
            assert_eq!((extent.width, extent.height), expected);
        }
    }

    #[test]
    fn test_image_count() {
        for (min, max, expected) in [(2, 0, 3), (2, 8, 3), (2, 2, 2), (3, 3, 3), (1, 0, 2)] {
            assert_eq!(
                determine_image_count(&caps(min, max, (0, 0))),
                expected,
                "min {} max {}",
                min,
                max
            );
        }
    }

    #[test]
    fn test_support_needs_formats_and_modes() {
        let support = |formats: usize, modes: usize| SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default(); formats],
            present_modes: vec![vk::PresentModeKHR::FIFO; modes],
        };
        assert!(support(1, 1).is_adequate());
        assert!(!support(0, 1).is_adequate());
        assert!(!support(1, 0).is_adequate());
    }

    #[test]
    fn test_acquire_result_classification() {
        assert_eq!(classify_acquire(Ok((2, false))).unwrap(), Acquire::Image { index: 2, suboptimal: false });
        assert_eq!(classify_acquire(Ok((0, true))).unwrap(), Acquire::Image { index: 0, suboptimal: true });
        assert_eq!(classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(), Acquire::OutOfDate);
        assert!(matches!(classify_acquire(Err(vk::Result::TIMEOUT)), Err(RhiError::Timeout(_))));
        assert!(matches!(classify_acquire(Err(vk::Result::NOT_READY)), Err(RhiError::Timeout(_))));
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn test_present_result_classification() {
        assert_eq!(classify_present(Ok(false)).unwrap(), Present::Ok);
        assert_eq!(classify_present(Ok(true)).unwrap(), Present::Suboptimal);
        assert_eq!(classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(), Present::OutOfDate);
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
        assert!(Present::Suboptimal.needs_recreate());
        assert!(Present::OutOfDate.needs_recreate());
        assert!(!Present::Ok.needs_recreate());
    }
}
