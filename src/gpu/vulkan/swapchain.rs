//! Swapchain ownership: surface, images, per-image framebuffers and the
//! presentation handshake.

use ash::vk;
use log::warn;
use raw_window_handle::HasRawWindowHandle;

use crate::gpu::error::{GpuError, Result};
use crate::gpu::structs::{Extent, Swapchain, SwapchainInfo, WindowBuffering};
use crate::utils::handle::retype;
use crate::utils::Handle;

use super::{conversions as conv, VulkanContext};

pub(crate) struct VkSwapchain {
    surface: vk::SurfaceKHR,
    surface_loader: ash::extensions::khr::Surface,
    loader: ash::extensions::khr::Swapchain,
    raw: vk::SwapchainKHR,
    format: vk::Format,
    render_pass: vk::RenderPass,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
    vsync: bool,
    min_image_count: u32,
    acquire_sem: vk::Semaphore,
    render_sem: vk::Semaphore,
    acquired: Option<u32>,
}

impl VkSwapchain {
    pub(crate) fn acquire_semaphore(&self) -> vk::Semaphore {
        self.acquire_sem
    }

    pub(crate) fn render_semaphore(&self) -> vk::Semaphore {
        self.render_sem
    }

    fn destroy_images(&mut self, device: &ash::Device) {
        unsafe {
            for fb in self.framebuffers.drain(..) {
                device.destroy_framebuffer(fb, None);
            }
            for view in self.views.drain(..) {
                device.destroy_image_view(view, None);
            }
        }
    }

    pub(crate) fn destroy(mut self, device: &ash::Device) {
        self.destroy_images(device);
        unsafe {
            device.destroy_semaphore(self.acquire_sem, None);
            device.destroy_semaphore(self.render_sem, None);
            device.destroy_render_pass(self.render_pass, None);
            self.loader.destroy_swapchain(self.raw, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }

    /// Recreate swapchain images, views and framebuffers for `extent`.
    fn recreate(&mut self, device: &ash::Device, extent: vk::Extent2D) -> Result<()> {
        self.destroy_images(device);
        let old = self.raw;
        let present_mode = if self.vsync {
            vk::PresentModeKHR::FIFO
        } else {
            vk::PresentModeKHR::IMMEDIATE
        };
        self.raw = unsafe {
            self.loader.create_swapchain(
                &vk::SwapchainCreateInfoKHR::builder()
                    .surface(self.surface)
                    .present_mode(present_mode)
                    .image_format(self.format)
                    .image_array_layers(1)
                    .image_color_space(vk::ColorSpaceKHR::SRGB_NONLINEAR)
                    .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                    .image_extent(extent)
                    .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                    .min_image_count(self.min_image_count)
                    .pre_transform(vk::SurfaceTransformFlagsKHR::IDENTITY)
                    .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                    .old_swapchain(old)
                    .build(),
                None,
            )
        }?;
        unsafe { self.loader.destroy_swapchain(old, None) };
        self.extent = extent;
        self.acquired = None;

        let images = unsafe { self.loader.get_swapchain_images(self.raw) }?;
        for image in images {
            let view = unsafe {
                device.create_image_view(
                    &vk::ImageViewCreateInfo::builder()
                        .image(image)
                        .format(self.format)
                        .view_type(vk::ImageViewType::TYPE_2D)
                        .subresource_range(
                            vk::ImageSubresourceRange::builder()
                                .aspect_mask(vk::ImageAspectFlags::COLOR)
                                .base_mip_level(0)
                                .level_count(1)
                                .base_array_layer(0)
                                .layer_count(1)
                                .build(),
                        )
                        .build(),
                    None,
                )
            }?;
            let attachments = [view];
            let fb = unsafe {
                device.create_framebuffer(
                    &vk::FramebufferCreateInfo::builder()
                        .render_pass(self.render_pass)
                        .attachments(&attachments)
                        .width(extent.width)
                        .height(extent.height)
                        .layers(1)
                        .build(),
                    None,
                )
            }?;
            self.views.push(view);
            self.framebuffers.push(fb);
        }
        Ok(())
    }
}

impl VulkanContext {
    pub fn make_swapchain(
        &mut self,
        info: &SwapchainInfo,
        window: &dyn HasRawWindowHandle,
    ) -> Result<Handle<Swapchain>> {
        if self.headless {
            return Err(GpuError::MissingCapability("swapchains on a headless context"));
        }
        if self.swapchains.is_full() {
            return Err(GpuError::Exhausted("swapchain"));
        }

        let surface =
            unsafe { ash_window::create_surface(&self.entry, &self.instance, window, None) }?;
        let surface_loader = ash::extensions::khr::Surface::new(&self.entry, &self.instance);
        let supported = unsafe {
            surface_loader.get_physical_device_surface_support(
                self.pdevice,
                self.queue_family,
                surface,
            )
        }?;
        if !supported {
            unsafe { surface_loader.destroy_surface(surface, None) };
            return Err(GpuError::MissingCapability("surface presentation on this queue"));
        }

        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(self.pdevice, surface)
        }?;
        let mut extent = vk::Extent2D {
            width: info.extent.width,
            height: info.extent.height,
        };
        if capabilities.current_extent.width != u32::MAX {
            // The platform dictates the extent; the request is advisory.
            extent = capabilities.current_extent;
        }

        let vk_format = conv::image_format(info.format);
        let min_image_count = match info.buffering {
            WindowBuffering::Double => 2u32,
            WindowBuffering::Triple => 3u32,
        }
        .max(capabilities.min_image_count);

        // Backbuffer passes clear via attachment ops, so contents start
        // undefined and end presentable.
        let attachment = vk::AttachmentDescription::builder()
            .format(vk_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::DONT_CARE)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();
        let color_refs = [vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build()];
        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .build()];
        let attachments = [attachment];
        let render_pass = unsafe {
            self.device.create_render_pass(
                &vk::RenderPassCreateInfo::builder()
                    .attachments(&attachments)
                    .subpasses(&subpasses)
                    .build(),
                None,
            )
        }?;

        let loader = ash::extensions::khr::Swapchain::new(&self.instance, &self.device);
        let acquire_sem = unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::builder().build(), None)
        }?;
        let render_sem = unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::builder().build(), None)
        }?;

        let mut sc = VkSwapchain {
            surface,
            surface_loader,
            loader,
            raw: vk::SwapchainKHR::null(),
            format: vk_format,
            render_pass,
            views: Vec::new(),
            framebuffers: Vec::new(),
            extent,
            vsync: info.vsync,
            min_image_count,
            acquire_sem,
            render_sem,
            acquired: None,
        };
        // First creation goes through the same path as recreation, with a
        // null old swapchain.
        sc.recreate(&self.device, extent)?;
        self.set_name(sc.raw, info.debug_name, vk::ObjectType::SWAPCHAIN_KHR);

        let handle = self
            .swapchains
            .insert(sc)
            .expect("pool fullness checked above");
        Ok(retype(handle))
    }

    /// Acquire the next backbuffer image on first use within a submission.
    pub(crate) fn acquire_backbuffer(
        &mut self,
        handle: Handle<Swapchain>,
    ) -> Result<(vk::RenderPass, vk::Framebuffer, vk::Extent2D)> {
        let sc = self
            .swapchains
            .get_mut_ref(retype(handle))
            .ok_or(GpuError::InvalidHandle("swapchain"))?;
        let index = match sc.acquired {
            Some(index) => index,
            None => {
                let (index, suboptimal) = unsafe {
                    sc.loader.acquire_next_image(
                        sc.raw,
                        u64::MAX,
                        sc.acquire_sem,
                        vk::Fence::null(),
                    )
                }?;
                if suboptimal {
                    warn!("suboptimal swapchain image acquired, a resize is pending");
                }
                sc.acquired = Some(index);
                index
            }
        };
        Ok((
            sc.render_pass,
            sc.framebuffers[index as usize],
            sc.extent,
        ))
    }

    /// Vsync-aware buffer swap. Requires a prior submission that rendered
    /// into this swapchain's backbuffer.
    pub fn present(&mut self, handle: Handle<Swapchain>) -> Result<()> {
        let queue = self.queue;
        let sc = self
            .swapchains
            .get_mut_ref(retype(handle))
            .ok_or(GpuError::InvalidHandle("swapchain"))?;
        let Some(index) = sc.acquired.take() else {
            warn!("present without a rendered backbuffer, skipping");
            return Ok(());
        };
        let waits = [sc.render_sem];
        let swapchains = [sc.raw];
        let indices = [index];
        let result = unsafe {
            sc.loader.queue_present(
                queue,
                &vk::PresentInfoKHR::builder()
                    .wait_semaphores(&waits)
                    .swapchains(&swapchains)
                    .image_indices(&indices)
                    .build(),
            )
        };
        match result {
            Ok(suboptimal) => {
                if suboptimal {
                    warn!("suboptimal present, a resize is pending");
                }
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                warn!("swapchain out of date, resize required");
                Ok(())
            }
            Err(res) => Err(res.into()),
        }
    }

    pub fn resize_swapchain(&mut self, handle: Handle<Swapchain>, extent: Extent) -> Result<()> {
        if extent.width == 0 || extent.height == 0 {
            return Err(GpuError::InvalidInfo("swapchain extent must be non-zero"));
        }
        unsafe {
            let _ = self.device.device_wait_idle();
        }
        let device = self.device.clone();
        let sc = self
            .swapchains
            .get_mut_ref(retype(handle))
            .ok_or(GpuError::InvalidHandle("swapchain"))?;
        sc.recreate(
            &device,
            vk::Extent2D {
                width: extent.width,
                height: extent.height,
            },
        )
    }

    /// Stored extent, falling back to the surface's current geometry when
    /// the platform reports one.
    pub fn swapchain_extent(&self, handle: Handle<Swapchain>) -> Result<Extent> {
        let sc = self
            .swapchains
            .get_ref(retype(handle))
            .ok_or(GpuError::InvalidHandle("swapchain"))?;
        if sc.extent.width != 0 && sc.extent.height != 0 {
            return Ok(Extent {
                width: sc.extent.width,
                height: sc.extent.height,
            });
        }
        let capabilities = unsafe {
            sc.surface_loader
                .get_physical_device_surface_capabilities(self.pdevice, sc.surface)
        }?;
        Ok(Extent {
            width: capabilities.current_extent.width,
            height: capabilities.current_extent.height,
        })
    }

    pub fn release_swapchain(&mut self, handle: Handle<Swapchain>) -> Result<()> {
        match self
            .swapchains
            .release(retype::<Swapchain, VkSwapchain>(handle))
        {
            None => Err(GpuError::InvalidHandle("swapchain")),
            Some(crate::utils::Release::Alive(_)) => Ok(()),
            Some(crate::utils::Release::Destroyed(sc)) => {
                unsafe {
                    let _ = self.device.device_wait_idle();
                }
                sc.destroy(&self.device);
                Ok(())
            }
        }
    }
}
