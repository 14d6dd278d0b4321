//! The pure acquire/wait/release ring-buffer bookkeeping from spec §3 and §4.5, split out
//! from [`crate::swapchain::client::ClientSwapchain`] so the state machine invariants (spec
//! §8, invariants 5 and 6) are testable without a Vulkan device. Every method here is what
//! the spec calls "Under the swapchain mutex"; the caller (`ClientSwapchain`) holds the lock
//! and interleaves the actual Vulkan submissions between these bookkeeping calls.

use crate::error::{Error, Result};

/// `acquire_head`/`wait_head`/`release_head` plus the per-image `has_been_acquired` bits,
/// for a swapchain of `N` images. Ring invariant (spec §8 #5):
/// `release_head <= wait_head <= acquire_head` in ring order, `num_acquired in [0, N]`.
#[derive(Debug, Clone)]
pub struct RingState {
    len: usize,
    is_static: bool,
    acquire_head: usize,
    wait_head: usize,
    release_head: usize,
    num_acquired: usize,
    has_been_acquired: Vec<bool>,
}

impl RingState {
    pub fn new(len: usize, is_static: bool) -> Self {
        assert!(len > 0, "a swapchain must have at least one image");
        RingState {
            len,
            is_static,
            acquire_head: 0,
            wait_head: 0,
            release_head: 0,
            num_acquired: 0,
            has_been_acquired: vec![false; len],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn num_acquired(&self) -> usize {
        self.num_acquired
    }

    pub fn acquire_head(&self) -> usize {
        self.acquire_head
    }

    pub fn wait_head(&self) -> usize {
        self.wait_head
    }

    pub fn release_head(&self) -> usize {
        self.release_head
    }

    /// Whether `images[acquire_head]` is eligible for its *first* acquire-side semaphore wait
    /// (spec §4.5 acquire: "except on the very first acquire of this image").
    pub fn is_first_acquire_of_current_image(&self) -> bool {
        !self.has_been_acquired[self.acquire_head]
    }

    /// Validates and advances the acquire cursor. Returns the index to acquire on success.
    /// Does not perform any Vulkan submission; the caller does that between validation and
    /// the head advance that this call performs atomically.
    pub fn acquire(&mut self) -> Result<usize> {
        if self.num_acquired == self.len {
            return Err(Error::CallOrderInvalid("all images are already acquired"));
        }
        if self.is_static && self.has_been_acquired[self.acquire_head] {
            return Err(Error::CallOrderInvalid(
                "static swapchain's only image was already acquired once",
            ));
        }
        let index = self.acquire_head;
        self.has_been_acquired[index] = true;
        self.acquire_head = (self.acquire_head + 1) % self.len;
        self.num_acquired += 1;
        Ok(index)
    }

    /// Validates the wait call and returns the index to wait on; advances `wait_head` on
    /// success. The caller performs the fence wait between validation and calling
    /// [`RingState::commit_wait`].
    pub fn begin_wait(&self) -> Result<usize> {
        if self.num_acquired == 0 {
            return Err(Error::CallOrderInvalid("no image is currently acquired"));
        }
        if self.wait_head != self.release_head {
            return Err(Error::CallOrderInvalid(
                "the previously waited image has not been released yet",
            ));
        }
        Ok(self.wait_head)
    }

    /// Advances `wait_head` after the caller's fence wait succeeded.
    pub fn commit_wait(&mut self) {
        self.wait_head = (self.wait_head + 1) % self.len;
    }

    /// Validates the release call and returns the index to release. Does not advance
    /// `release_head`; the caller does that via [`RingState::commit_release`] only after its
    /// Vulkan submission and TX send succeed.
    pub fn begin_release(&self) -> Result<usize> {
        if self.num_acquired == 0 {
            return Err(Error::CallOrderInvalid("no image is currently acquired"));
        }
        if self.wait_head != (self.release_head + 1) % self.len {
            return Err(Error::CallOrderInvalid(
                "the current image has not been waited on yet",
            ));
        }
        Ok(self.release_head)
    }

    pub fn commit_release(&mut self) {
        self.release_head = (self.release_head + 1) % self.len;
        self.num_acquired -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_of_three_images() {
        let mut ring = RingState::new(3, false);
        for round in 0..3u32 {
            let acquired = ring.acquire().unwrap();
            assert_eq!(acquired, round as usize);
            let waited = ring.begin_wait().unwrap();
            assert_eq!(waited, acquired);
            ring.commit_wait();
            let released = ring.begin_release().unwrap();
            assert_eq!(released, acquired);
            ring.commit_release();
            assert_eq!(ring.release_head(), (round as usize + 1) % 3);
        }
    }

    #[test]
    fn fourth_acquire_after_one_release_succeeds() {
        let mut ring = RingState::new(3, false);
        for _ in 0..3 {
            ring.acquire().unwrap();
        }
        assert!(ring.acquire().is_err());

        let idx = ring.begin_wait().unwrap();
        assert_eq!(idx, 0);
        ring.commit_wait();
        ring.begin_release().unwrap();
        ring.commit_release();

        // Exactly one slot freed up; a fourth acquire now succeeds.
        ring.acquire().unwrap();
    }

    #[test]
    fn prefilling_to_four_acquires_on_n_three_is_call_order_invalid() {
        let mut ring = RingState::new(3, false);
        ring.acquire().unwrap();
        ring.acquire().unwrap();
        ring.acquire().unwrap();
        assert!(matches!(ring.acquire(), Err(Error::CallOrderInvalid(_))));
    }

    #[test]
    fn wait_before_acquire_is_invalid() {
        let ring = RingState::new(3, false);
        assert!(matches!(ring.begin_wait(), Err(Error::CallOrderInvalid(_))));
    }

    #[test]
    fn double_wait_without_release_is_invalid() {
        let mut ring = RingState::new(2, false);
        ring.acquire().unwrap();
        ring.begin_wait().unwrap();
        ring.commit_wait();
        assert!(matches!(ring.begin_wait(), Err(Error::CallOrderInvalid(_))));
    }

    #[test]
    fn release_before_wait_is_invalid() {
        let mut ring = RingState::new(2, false);
        ring.acquire().unwrap();
        assert!(matches!(ring.begin_release(), Err(Error::CallOrderInvalid(_))));
    }

    #[test]
    fn static_swapchain_rejects_second_acquire() {
        let mut ring = RingState::new(1, true);
        ring.acquire().unwrap();
        ring.begin_wait().unwrap();
        ring.commit_wait();
        ring.begin_release().unwrap();
        ring.commit_release();
        assert!(matches!(ring.acquire(), Err(Error::CallOrderInvalid(_))));
    }

    #[test]
    fn first_acquire_of_each_image_is_flagged() {
        let mut ring = RingState::new(2, false);
        assert!(ring.is_first_acquire_of_current_image());
        ring.acquire().unwrap();
        // acquire_head wrapped to image 1, which has never been acquired either.
        assert!(ring.is_first_acquire_of_current_image());
    }
}
