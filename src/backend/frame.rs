// Frame loop and swapchain recreation
//
// FRAME TIMELINE (one image in flight):
// ┌─────────────────────────────────────────────────────────────────────────┐
// │ wait present idle ─> acquire ─> submit ─> present                       │
// │                         │                    │                          │
// │                    out of date          out of date / suboptimal        │
// │                         └──> recreate <──────┘                          │
// └─────────────────────────────────────────────────────────────────────────┘
//
// The control flow lives here, the Vulkan calls live behind `PresentTarget`
// (implemented by `VulkanRenderer`).

use anyhow::Result;
use ash::vk;

/// Result of asking the swapchain for the next image
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready; a suboptimal swapchain can still be rendered to
    Acquired { image_index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Out of date or suboptimal
    NeedsRecreation,
}

/// What happened to one call of `draw_frame`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// Presented, then the swapchain was rebuilt
    PresentedAndRecreated,
    /// Acquire found the swapchain out of date; nothing submitted, swapchain rebuilt
    Skipped,
}

/// Resize notification from the windowing layer, in physical pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeEvent {
    pub width: u32,
    pub height: u32,
}

impl ResizeEvent {
    /// Minimized windows report a zero dimension
    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Shape of a freshly built swapchain generation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerationInfo {
    pub extent: vk::Extent2D,
    pub image_count: usize,
    pub image_views: usize,
    pub framebuffers: usize,
    pub command_buffers: usize,
}

impl GenerationInfo {
    /// One view, one framebuffer and one command buffer per image
    pub fn is_consistent(&self) -> bool {
        self.image_views == self.image_count
            && self.framebuffers == self.image_views
            && self.command_buffers == self.framebuffers
    }
}

/// GPU operations the frame loop and the recreation path are built from
pub trait PresentTarget {
    /// Block until the present queue has drained
    fn wait_present_idle(&mut self) -> Result<()>;

    /// Acquire with no timeout, signaling the image-available semaphore
    fn acquire_next_image(&mut self) -> Result<AcquireOutcome>;

    /// Submit the pre-recorded buffer for `image_index`
    fn submit(&mut self, image_index: u32) -> Result<()>;

    fn present(&mut self, image_index: u32) -> Result<PresentOutcome>;

    fn wait_device_idle(&mut self) -> Result<()>;

    /// Destroy the current generation (no-op if there is none)
    fn destroy_generation(&mut self);

    /// Build a new generation sized for the current window
    fn create_generation(&mut self) -> Result<GenerationInfo>;
}

/// Acquire, submit and present one frame
pub fn draw_frame<T: PresentTarget + ?Sized>(target: &mut T) -> Result<FrameStatus> {
    target.wait_present_idle()?;

    let image_index = match target.acquire_next_image()? {
        AcquireOutcome::Acquired { image_index, .. } => image_index,
        AcquireOutcome::OutOfDate => {
            log::debug!("Swapchain out of date on acquire");
            recreate(target)?;
            return Ok(FrameStatus::Skipped);
        }
    };

    target.submit(image_index)?;

    match target.present(image_index)? {
        PresentOutcome::Presented => Ok(FrameStatus::Presented),
        PresentOutcome::NeedsRecreation => {
            log::debug!("Swapchain out of date or suboptimal on present");
            recreate(target)?;
            Ok(FrameStatus::PresentedAndRecreated)
        }
    }
}

/// React to a window resize. Zero-sized (minimized) windows are ignored.
///
/// Returns whether the swapchain was rebuilt.
pub fn handle_resize<T: PresentTarget + ?Sized>(
    target: &mut T,
    event: ResizeEvent,
) -> Result<bool> {
    if event.is_minimized() {
        log::debug!("Ignoring resize to {}x{}", event.width, event.height);
        return Ok(false);
    }

    log::debug!("Window resized to {}x{}", event.width, event.height);
    recreate(target)?;
    Ok(true)
}

/// Wait for the GPU, drop the old generation and build a new one.
///
/// Runs once per trigger; a failure here is fatal.
pub fn recreate<T: PresentTarget + ?Sized>(target: &mut T) -> Result<GenerationInfo> {
    log::info!("Recreating swapchain...");

    target.wait_device_idle()?;
    target.destroy_generation();
    let info = target.create_generation()?;

    debug_assert!(info.is_consistent(), "inconsistent generation: {info:?}");
    log::info!(
        "Swapchain recreated: {}x{}, {} images",
        info.extent.width,
        info.extent.height,
        info.image_count
    );
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::error::RendererError;
    use crate::backend::swapchain::{choose_extent, choose_image_count};
    use std::collections::VecDeque;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Call {
        WaitPresentIdle,
        Acquire,
        Submit(u32),
        Present(u32),
        WaitDeviceIdle,
        Destroy,
        Create,
    }

    /// Records every call; acquire/present answers are scripted per frame
    struct MockTarget {
        calls: Vec<Call>,
        acquire_script: VecDeque<Result<AcquireOutcome, vk::Result>>,
        present_script: VecDeque<Result<PresentOutcome, vk::Result>>,
        caps: vk::SurfaceCapabilitiesKHR,
        window_size: vk::Extent2D,
        fail_create: bool,
        /// Scripted shape of the next generation instead of the caps-derived one
        created: Option<GenerationInfo>,
    }

    impl MockTarget {
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                caps: vk::SurfaceCapabilitiesKHR {
                    current_extent: vk::Extent2D {
                        width: u32::MAX,
                        height: u32::MAX,
                    },
                    min_image_extent: vk::Extent2D { width: 1, height: 1 },
                    max_image_extent: vk::Extent2D {
                        width: 4096,
                        height: 4096,
                    },
                    min_image_count: 2,
                    max_image_count: 3,
                    ..Default::default()
                },
                window_size: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                fail_create: false,
                created: None,
            }
        }

        fn count(&self, call: Call) -> usize {
            self.calls.iter().filter(|&&c| c == call).count()
        }
    }

    impl PresentTarget for MockTarget {
        fn wait_present_idle(&mut self) -> Result<()> {
            self.calls.push(Call::WaitPresentIdle);
            Ok(())
        }

        fn acquire_next_image(&mut self) -> Result<AcquireOutcome> {
            self.calls.push(Call::Acquire);
            match self.acquire_script.pop_front() {
                Some(Ok(outcome)) => Ok(outcome),
                Some(Err(e)) => Err(RendererError::AcquireFailed(e).into()),
                None => Ok(AcquireOutcome::Acquired {
                    image_index: 0,
                    suboptimal: false,
                }),
            }
        }

        fn submit(&mut self, image_index: u32) -> Result<()> {
            self.calls.push(Call::Submit(image_index));
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> Result<PresentOutcome> {
            self.calls.push(Call::Present(image_index));
            match self.present_script.pop_front() {
                Some(Ok(outcome)) => Ok(outcome),
                Some(Err(e)) => Err(RendererError::PresentFailed(e).into()),
                None => Ok(PresentOutcome::Presented),
            }
        }

        fn wait_device_idle(&mut self) -> Result<()> {
            self.calls.push(Call::WaitDeviceIdle);
            Ok(())
        }

        fn destroy_generation(&mut self) {
            self.calls.push(Call::Destroy);
        }

        fn create_generation(&mut self) -> Result<GenerationInfo> {
            self.calls.push(Call::Create);
            if self.fail_create {
                anyhow::bail!("Failed to create swapchain");
            }
            if let Some(info) = self.created.take() {
                return Ok(info);
            }
            let image_count = choose_image_count(&self.caps) as usize;
            Ok(GenerationInfo {
                extent: choose_extent(&self.caps, self.window_size),
                image_count,
                image_views: image_count,
                framebuffers: image_count,
                command_buffers: image_count,
            })
        }
    }

    const RECREATION: [Call; 3] = [Call::WaitDeviceIdle, Call::Destroy, Call::Create];

    #[test]
    fn steady_state_frame_order() {
        let mut target = MockTarget::new();
        target.acquire_script.push_back(Ok(AcquireOutcome::Acquired {
            image_index: 2,
            suboptimal: false,
        }));

        let status = draw_frame(&mut target).unwrap();

        assert_eq!(status, FrameStatus::Presented);
        assert_eq!(
            target.calls,
            vec![Call::WaitPresentIdle, Call::Acquire, Call::Submit(2), Call::Present(2)]
        );
    }

    #[test]
    fn out_of_date_acquire_skips_frame_and_recreates() {
        let mut target = MockTarget::new();
        target.acquire_script.push_back(Ok(AcquireOutcome::OutOfDate));

        let status = draw_frame(&mut target).unwrap();

        assert_eq!(status, FrameStatus::Skipped);
        let mut expected = vec![Call::WaitPresentIdle, Call::Acquire];
        expected.extend(RECREATION);
        assert_eq!(target.calls, expected);

        // Next frame proceeds normally on the rebuilt swapchain
        target.calls.clear();
        assert_eq!(draw_frame(&mut target).unwrap(), FrameStatus::Presented);
        assert_eq!(target.count(Call::Submit(0)), 1);
        assert_eq!(target.count(Call::Create), 0);
    }

    #[test]
    fn suboptimal_acquire_still_renders() {
        let mut target = MockTarget::new();
        target.acquire_script.push_back(Ok(AcquireOutcome::Acquired {
            image_index: 1,
            suboptimal: true,
        }));

        assert_eq!(draw_frame(&mut target).unwrap(), FrameStatus::Presented);
        assert_eq!(target.count(Call::Submit(1)), 1);
        assert_eq!(target.count(Call::Present(1)), 1);
    }

    #[test]
    fn present_needing_recreation_rebuilds_after_presenting() {
        let mut target = MockTarget::new();
        target.present_script.push_back(Ok(PresentOutcome::NeedsRecreation));

        let status = draw_frame(&mut target).unwrap();

        assert_eq!(status, FrameStatus::PresentedAndRecreated);
        assert_eq!(
            &target.calls[..4],
            &[
                Call::WaitPresentIdle,
                Call::Acquire,
                Call::Submit(0),
                Call::Present(0)
            ]
        );
        assert_eq!(&target.calls[4..], &RECREATION);
    }

    #[test]
    fn acquire_failure_is_fatal_and_submits_nothing() {
        let mut target = MockTarget::new();
        target.acquire_script.push_back(Err(vk::Result::ERROR_DEVICE_LOST));

        let err = draw_frame(&mut target).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RendererError>(),
            Some(RendererError::AcquireFailed(vk::Result::ERROR_DEVICE_LOST))
        ));
        assert_eq!(target.calls, vec![Call::WaitPresentIdle, Call::Acquire]);
    }

    #[test]
    fn present_failure_is_fatal_without_recreation() {
        let mut target = MockTarget::new();
        target.present_script.push_back(Err(vk::Result::ERROR_SURFACE_LOST_KHR));

        let err = draw_frame(&mut target).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RendererError>(),
            Some(RendererError::PresentFailed(_))
        ));
        assert_eq!(target.count(Call::Create), 0);
    }

    #[test]
    fn zero_sized_resize_is_ignored() {
        let mut target = MockTarget::new();

        for event in [
            ResizeEvent { width: 0, height: 600 },
            ResizeEvent { width: 800, height: 0 },
            ResizeEvent { width: 0, height: 0 },
        ] {
            assert!(!handle_resize(&mut target, event).unwrap());
        }
        assert!(target.calls.is_empty());
    }

    #[test]
    fn resize_runs_full_recreation() {
        let mut target = MockTarget::new();

        assert!(handle_resize(&mut target, ResizeEvent { width: 1024, height: 768 }).unwrap());
        assert_eq!(target.calls, RECREATION.to_vec());
    }

    #[test]
    fn recreation_is_idempotent_for_unchanged_window() {
        let mut target = MockTarget::new();

        let first = recreate(&mut target).unwrap();
        let second = recreate(&mut target).unwrap();

        assert_eq!(first.extent, second.extent);
        assert_eq!(first.image_count, second.image_count);
        assert_eq!(first.image_count, 3);
    }

    #[test]
    fn recreation_accepts_more_images_than_requested() {
        let mut target = MockTarget::new();
        // Asked for 3, driver handed back 4; every per-image object follows the 4
        target.created = Some(GenerationInfo {
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            image_count: 4,
            image_views: 4,
            framebuffers: 4,
            command_buffers: 4,
        });

        let info = recreate(&mut target).unwrap();
        assert_eq!(info.image_count, 4);
        assert_eq!(choose_image_count(&target.caps), 3);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "inconsistent generation")]
    fn recreation_rejects_mismatched_per_image_objects() {
        let mut target = MockTarget::new();
        target.created = Some(GenerationInfo {
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            image_count: 4,
            image_views: 4,
            framebuffers: 4,
            command_buffers: 3,
        });

        let _ = recreate(&mut target);
    }

    #[test]
    fn failed_recreation_propagates() {
        let mut target = MockTarget::new();
        target.fail_create = true;

        assert!(recreate(&mut target).is_err());
        assert_eq!(target.calls, RECREATION.to_vec());
    }

    #[test]
    fn generation_consistency_check() {
        let mut info = GenerationInfo {
            extent: vk::Extent2D { width: 1, height: 1 },
            image_count: 3,
            image_views: 3,
            framebuffers: 3,
            command_buffers: 3,
        };
        assert!(info.is_consistent());

        info.command_buffers = 2;
        assert!(!info.is_consistent());
    }
}
