//! Frame ring scheduling.
//!
//! # Overview
//!
//! The engine keeps `depth` sets of per-frame resources and cycles through
//! them with a monotonic frame counter: frame `K` uses slot `K % depth`. A
//! slot's fence is the only CPU/GPU synchronization point. It is waited on
//! before the slot's command buffer or buffers are touched again, which
//! bounds the number of frames in flight to `depth`.
//!
//! ```text
//! Idle ──wait──> acquire ──reset fence──> Recording ──submit──> Submitted
//!  ^                │                                             │
//!  │           out of date: recreate, nothing submitted           │
//!  └──────────────── fence signals (next wait on this slot) ──────┘
//! ```
//!
//! The fence is reset only once an image has been acquired. An out-of-date
//! acquire therefore leaves the fence signaled and the next frame on the
//! slot does not block.
//!
//! [`FrameRing::run_frame`] drives one iteration against any
//! [`FrameTarget`] + [`FenceWait`]. The engine implements both on top of
//! Vulkan; the tests implement them with recording fakes.

use tracing::debug;

use engine_rhi::RhiResult;
use engine_rhi::swapchain::{Acquire, Present};

use crate::error::RendererResult;

/// Per-slot CPU/GPU fences.
pub trait FenceWait {
    /// Blocks until the last submission on `slot` has completed.
    fn wait_slot(&mut self, slot: usize) -> RhiResult<()>;

    /// Unsignals the fence of `slot` ahead of a submission.
    fn reset_slot(&mut self, slot: usize) -> RhiResult<()>;
}

/// The presentation side of a frame.
pub trait FrameTarget {
    /// Acquires the next image, signaling the slot's acquire semaphore.
    fn acquire(&mut self, slot: usize) -> RhiResult<Acquire>;

    /// Writes frame data and records the slot's command buffer.
    fn record(&mut self, slot: usize, image_index: u32, frame_number: u64) -> RendererResult<()>;

    /// Submits the slot's command buffer, signaling its fence.
    fn submit(&mut self, slot: usize) -> RhiResult<()>;

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<Present>;

    /// Rebuilds every swapchain-dependent resource.
    fn recreate(&mut self) -> RendererResult<()>;
}

/// What happened during one [`FrameRing::run_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Presented, then the swapchain was rebuilt
    PresentedAndRecreated,
    /// Acquire found the swapchain out of date; nothing was submitted
    Abandoned,
}

/// Ring depth plus the frame counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRing {
    depth: usize,
    frame_number: u64,
}

impl FrameRing {
    /// Creates a ring of `depth` slots. A depth of zero is treated as one.
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            frame_number: 0,
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Frames presented so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Slot the next frame will use.
    #[inline]
    pub fn current_slot(&self) -> usize {
        (self.frame_number % self.depth as u64) as usize
    }

    /// Runs one frame: wait, acquire, reset, record, submit, present.
    ///
    /// # Errors
    ///
    /// Any error is fatal to the frame loop. A fence or acquire timeout
    /// arrives as [`RhiError::Timeout`](engine_rhi::RhiError::Timeout).
    pub fn run_frame<T>(&mut self, target: &mut T) -> RendererResult<FrameOutcome>
    where
        T: FrameTarget + FenceWait,
    {
        let slot = self.current_slot();
        target.wait_slot(slot)?;

        let (image_index, acquired_suboptimal) = match target.acquire(slot)? {
            Acquire::Image { index, suboptimal } => (index, suboptimal),
            Acquire::OutOfDate => {
                debug!("Swapchain out of date on acquire, abandoning frame {}", self.frame_number);
                target.recreate()?;
                return Ok(FrameOutcome::Abandoned);
            }
        };

        target.reset_slot(slot)?;
        target.record(slot, image_index, self.frame_number)?;
        target.submit(slot)?;
        let present = target.present(slot, image_index)?;

        let outcome = if acquired_suboptimal || present.needs_recreate() {
            debug!("Swapchain {:?} on present, recreating", present);
            target.recreate()?;
            FrameOutcome::PresentedAndRecreated
        } else {
            FrameOutcome::Presented
        };

        self.frame_number += 1;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RendererError;
    use engine_rhi::RhiError;
    use std::collections::VecDeque;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum FenceState {
        Signaled,
        Unsignaled,
        /// Submitted work the fake GPU has not finished
        Pending,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Event {
        Wait { slot: usize, blocked: bool },
        Acquire(usize),
        Reset(usize),
        Record { slot: usize, frame: u64 },
        Submit(usize),
        Present { slot: usize, image: u32 },
        Recreate,
    }

    /// Records every call and models fence state per slot.
    struct FakeGpu {
        fences: Vec<FenceState>,
        events: Vec<Event>,
        acquires: VecDeque<Acquire>,
        presents: VecDeque<Present>,
        next_image: u32,
        image_count: u32,
    }

    impl FakeGpu {
        fn new(depth: usize) -> Self {
            Self {
                fences: vec![FenceState::Signaled; depth],
                events: Vec::new(),
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                next_image: 0,
                image_count: 3,
            }
        }

        fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
            self.events.iter().filter(|e| pred(e)).count()
        }

        fn submits(&self) -> usize {
            self.count(|e| matches!(e, Event::Submit(_)))
        }

        fn presents(&self) -> usize {
            self.count(|e| matches!(e, Event::Present { .. }))
        }
    }

    impl FenceWait for FakeGpu {
        fn wait_slot(&mut self, slot: usize) -> RhiResult<()> {
            match self.fences[slot] {
                FenceState::Signaled => {
                    self.events.push(Event::Wait { slot, blocked: false });
                    Ok(())
                }
                FenceState::Pending => {
                    // the GPU finishes while the CPU is blocked
                    self.fences[slot] = FenceState::Signaled;
                    self.events.push(Event::Wait { slot, blocked: true });
                    Ok(())
                }
                // nothing will ever signal it
                FenceState::Unsignaled => Err(RhiError::Timeout("fence")),
            }
        }

        fn reset_slot(&mut self, slot: usize) -> RhiResult<()> {
            assert_eq!(self.fences[slot], FenceState::Signaled, "reset of a busy fence");
            self.fences[slot] = FenceState::Unsignaled;
            self.events.push(Event::Reset(slot));
            Ok(())
        }
    }

    impl FrameTarget for FakeGpu {
        fn acquire(&mut self, slot: usize) -> RhiResult<Acquire> {
            self.events.push(Event::Acquire(slot));
            Ok(self.acquires.pop_front().unwrap_or_else(|| {
                let index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count;
                Acquire::Image {
                    index,
                    suboptimal: false,
                }
            }))
        }

        fn record(&mut self, slot: usize, _image: u32, frame: u64) -> RendererResult<()> {
            assert_eq!(
                self.fences[slot],
                FenceState::Unsignaled,
                "recording into a slot the GPU may still read"
            );
            self.events.push(Event::Record { slot, frame });
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> RhiResult<()> {
            self.fences[slot] = FenceState::Pending;
            self.events.push(Event::Submit(slot));
            Ok(())
        }

        fn present(&mut self, slot: usize, image: u32) -> RhiResult<Present> {
            self.events.push(Event::Present { slot, image });
            Ok(self.presents.pop_front().unwrap_or(Present::Ok))
        }

        fn recreate(&mut self) -> RendererResult<()> {
            self.events.push(Event::Recreate);
            Ok(())
        }
    }

    #[test]
    fn test_slots_cycle_with_frame_number() {
        let mut ring = FrameRing::new(3);
        let mut gpu = FakeGpu::new(3);
        let slots: Vec<usize> = (0..7)
            .map(|_| {
                let slot = ring.current_slot();
                ring.run_frame(&mut gpu).expect("frame");
                slot
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(ring.frame_number(), 7);
    }

    #[test]
    fn test_step_order_within_a_frame() {
        let mut ring = FrameRing::new(2);
        let mut gpu = FakeGpu::new(2);
        assert_eq!(ring.run_frame(&mut gpu).expect("frame"), FrameOutcome::Presented);
        assert_eq!(
            gpu.events,
            vec![
                Event::Wait {
                    slot: 0,
                    blocked: false
                },
                Event::Acquire(0),
                Event::Reset(0),
                Event::Record { slot: 0, frame: 0 },
                Event::Submit(0),
                Event::Present { slot: 0, image: 0 },
            ]
        );
    }

    #[test]
    fn test_reusing_a_slot_waits_for_its_submission() {
        let mut ring = FrameRing::new(2);
        let mut gpu = FakeGpu::new(2);
        for _ in 0..4 {
            ring.run_frame(&mut gpu).expect("frame");
        }

        let waits: Vec<(usize, bool)> = gpu
            .events
            .iter()
            .filter_map(|e| match *e {
                Event::Wait { slot, blocked } => Some((slot, blocked)),
                _ => None,
            })
            .collect();
        // fresh fences start signaled; frames 2 and 3 reuse submitted slots
        assert_eq!(waits, vec![(0, false), (1, false), (0, true), (1, true)]);

        // every record on a slot comes after the wait that retired its
        // previous submission
        let record_frame2 = gpu
            .events
            .iter()
            .position(|e| *e == Event::Record { slot: 0, frame: 2 })
            .expect("frame 2 recorded");
        let blocked_wait = gpu
            .events
            .iter()
            .position(|e| *e == Event::Wait { slot: 0, blocked: true })
            .expect("slot 0 waited");
        assert!(blocked_wait < record_frame2);
    }

    #[test]
    fn test_out_of_date_acquire_submits_nothing() {
        let mut ring = FrameRing::new(2);
        let mut gpu = FakeGpu::new(2);
        gpu.acquires.push_back(Acquire::OutOfDate);

        let outcome = ring.run_frame(&mut gpu).expect("frame");
        assert_eq!(outcome, FrameOutcome::Abandoned);
        assert_eq!(gpu.submits(), 0);
        assert_eq!(gpu.presents(), 0);
        assert_eq!(gpu.events.last(), Some(&Event::Recreate));
        assert_eq!(ring.frame_number(), 0);

        // the fence was left signaled, so the retry on the same slot does
        // not block or time out
        assert_eq!(ring.run_frame(&mut gpu).expect("retry"), FrameOutcome::Presented);
        assert_eq!(gpu.submits(), 1);
        assert_eq!(ring.frame_number(), 1);
    }

    #[test]
    fn test_suboptimal_present_recreates_after_presenting() {
        let mut ring = FrameRing::new(2);
        let mut gpu = FakeGpu::new(2);
        gpu.presents.push_back(Present::Suboptimal);

        let outcome = ring.run_frame(&mut gpu).expect("frame");
        assert_eq!(outcome, FrameOutcome::PresentedAndRecreated);
        let n = gpu.events.len();
        assert!(matches!(gpu.events[n - 2], Event::Present { .. }));
        assert_eq!(gpu.events[n - 1], Event::Recreate);
        assert_eq!(ring.frame_number(), 1);
    }

    #[test]
    fn test_out_of_date_present_recreates() {
        let mut ring = FrameRing::new(1);
        let mut gpu = FakeGpu::new(1);
        gpu.presents.push_back(Present::OutOfDate);
        assert_eq!(
            ring.run_frame(&mut gpu).expect("frame"),
            FrameOutcome::PresentedAndRecreated
        );
        assert_eq!(gpu.submits(), 1);
    }

    #[test]
    fn test_suboptimal_acquire_still_draws() {
        let mut ring = FrameRing::new(2);
        let mut gpu = FakeGpu::new(2);
        gpu.acquires.push_back(Acquire::Image {
            index: 2,
            suboptimal: true,
        });
        let outcome = ring.run_frame(&mut gpu).expect("frame");
        assert_eq!(outcome, FrameOutcome::PresentedAndRecreated);
        assert!(gpu.events.contains(&Event::Present { slot: 0, image: 2 }));
    }

    #[test]
    fn test_fence_timeout_is_fatal() {
        let mut ring = FrameRing::new(1);
        let mut gpu = FakeGpu::new(1);
        // a reset with no submission leaves a fence nothing will signal
        gpu.fences[0] = FenceState::Unsignaled;

        let result = ring.run_frame(&mut gpu);
        assert!(matches!(
            result,
            Err(RendererError::Rhi(RhiError::Timeout("fence")))
        ));
        assert!(gpu.events.is_empty());
        assert_eq!(ring.frame_number(), 0);
    }

    #[test]
    fn test_zero_depth_is_one_slot() {
        let ring = FrameRing::new(0);
        assert_eq!(ring.depth(), 1);
        assert_eq!(ring.current_slot(), 0);
    }
}
