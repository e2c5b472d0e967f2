//! Tests against a real Vulkan device, created without a window.
//!
//! Each test returns early when no loader or no usable GPU is present.

use std::sync::Arc;

use engine_rhi::buffer::{AllocatedBuffer, BufferUsage};
use engine_rhi::deletion::{DeletionStack, DisposalKind};
use engine_rhi::device::Device;
use engine_rhi::instance::Instance;
use engine_rhi::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};
use engine_rhi::sync::{create_fence, is_signaled};
use engine_rhi::upload::UploadContext;
use engine_rhi::vk;
use engine_rhi::write_buffer::WriteBuffer;

const TIMEOUT_NS: u64 = 1_000_000_000;

/// Device first: it must be destroyed before the instance.
struct Headless {
    device: Arc<Device>,
    _instance: Instance,
}

fn headless() -> Option<Headless> {
    let instance = match Instance::new(c"engine-rhi-tests", false, &[]) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("skipping: no Vulkan loader ({e})");
            return None;
        }
    };

    let gpus = unsafe { instance.handle().enumerate_physical_devices() }.ok()?;
    let gpu = gpus.into_iter().find_map(|device| {
        let families = unsafe {
            instance
                .handle()
                .get_physical_device_queue_family_properties(device)
        };
        let graphics = families
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))?
            as u32;
        Some(PhysicalDeviceInfo {
            device,
            properties: unsafe { instance.handle().get_physical_device_properties(device) },
            queue_families: QueueFamilyIndices {
                graphics_family: Some(graphics),
                present_family: Some(graphics),
            },
        })
    });
    let Some(gpu) = gpu else {
        eprintln!("skipping: no GPU with a graphics queue");
        return None;
    };

    match Device::new(&instance, &gpu) {
        Ok(device) => Some(Headless {
            device,
            _instance: instance,
        }),
        Err(e) => {
            eprintln!("skipping: device creation failed ({e})");
            None
        }
    }
}

#[test]
fn test_flush_destroys_every_record() {
    let Some(gpu) = headless() else { return };
    let device = &gpu.device;
    let mut deletion = DeletionStack::new("test");

    let signaled = create_fence(device, true, &mut deletion).unwrap();
    let unsignaled = create_fence(device, false, &mut deletion).unwrap();
    AllocatedBuffer::create(device, 256, BufferUsage::Storage, "scratch", &mut deletion).unwrap();

    assert!(is_signaled(device, signaled).unwrap());
    assert!(!is_signaled(device, unsignaled).unwrap());
    assert_eq!(
        deletion.kinds(),
        [DisposalKind::Fence, DisposalKind::Fence, DisposalKind::Buffer]
    );

    deletion.flush(device);
    assert!(deletion.is_empty());
}

#[test]
fn test_write_buffer_lands_in_mapped_memory() {
    let Some(gpu) = headless() else { return };
    let device = &gpu.device;
    let mut deletion = DeletionStack::new("test");

    let alignment = device.min_uniform_alignment();
    let mut buffer = WriteBuffer::build_constant(
        device,
        2,
        64,
        alignment,
        BufferUsage::Uniform,
        "camera",
        &mut deletion,
    )
    .unwrap();

    buffer.open(1).unwrap();
    buffer.write(&[1.5f32; 16], 0).unwrap();
    assert_eq!(buffer.read::<[f32; 16]>(0).unwrap(), [1.5f32; 16]);
    buffer.close().unwrap();

    let start = buffer.offset(1).unwrap() as usize;
    let bytes = buffer.buffer().mapped_bytes().unwrap();
    assert_eq!(&bytes[start..start + 64], bytemuck::bytes_of(&[1.5f32; 16]));

    deletion.flush(device);
}

#[test]
fn test_upload_leaves_only_the_destination_registered() {
    let Some(gpu) = headless() else { return };
    let device = &gpu.device;
    let mut deletion = DeletionStack::new("test");

    let upload = UploadContext::new(device, TIMEOUT_NS, &mut deletion).unwrap();
    let registered = deletion.len();

    let vertices = [0u8; 96];
    let buffer = upload
        .upload_buffer(device, &vertices, BufferUsage::Vertex, "triangle", &mut deletion)
        .unwrap();
    assert_eq!(buffer.size(), 96);
    assert!(buffer.mapped_bytes().is_none());
    assert_eq!(deletion.len(), registered + 1);

    // a second submission reuses the reset fence and pool
    upload.immediate_submit(device, |_| {}).unwrap();

    device.wait_idle().unwrap();
    deletion.flush(device);
}
