/// Test doubles to simulate the CAN bus and clock during integration tests.
use drover_j1939::protocol::transport::{
    can_frame::CanFrame,
    traits::{can_bus::CanBus, clock::Clock},
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration, Instant};

#[derive(Default)]
struct MockBusState {
    sent: Vec<CanFrame>,
    rx: VecDeque<CanFrame>,
    send_attempts: usize,
    fail_next_sends: usize,
    fail_from_attempt: Option<usize>,
}

#[derive(Clone, Default)]
#[allow(dead_code)]
/// In-memory CAN driver reproducing the `CanBus` trait behavior. Clones
/// share state, so a test keeps a handle while the controller owns another.
pub struct MockCanBus {
    inner: Arc<Mutex<MockBusState>>,
}

#[allow(dead_code)]
impl MockCanBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames successfully submitted by the device under test, in order.
    pub fn sent(&self) -> Vec<CanFrame> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// Total driver submissions, including failed attempts.
    pub fn send_attempts(&self) -> usize {
        self.inner.lock().unwrap().send_attempts
    }

    /// Queue a frame for the device under test to receive.
    pub fn push_rx(&self, frame: CanFrame) {
        self.inner.lock().unwrap().rx.push_back(frame);
    }

    /// Reject the next `count` submissions.
    pub fn fail_next_sends(&self, count: usize) {
        self.inner.lock().unwrap().fail_next_sends = count;
    }

    /// Reject every submission from the given 1-based attempt onward.
    pub fn fail_from_attempt(&self, attempt: usize) {
        self.inner.lock().unwrap().fail_from_attempt = Some(attempt);
    }
}

impl CanBus for MockCanBus {
    type Error = ();

    async fn send<'a>(&'a mut self, frame: &'a CanFrame) -> Result<(), Self::Error> {
        let mut state = self.inner.lock().unwrap();
        state.send_attempts += 1;

        if state.fail_next_sends > 0 {
            state.fail_next_sends -= 1;
            return Err(());
        }
        if let Some(from) = state.fail_from_attempt {
            if state.send_attempts >= from {
                return Err(());
            }
        }

        state.sent.push(frame.clone());
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<CanFrame>, Self::Error> {
        Ok(self.inner.lock().unwrap().rx.pop_front())
    }

    fn has_pending_rx(&self) -> bool {
        !self.inner.lock().unwrap().rx.is_empty()
    }

    fn clear_rx_latch(&mut self) {}
}

#[derive(Clone, Default)]
#[allow(dead_code)]
/// Manually advanced clock: delays complete instantly while moving time
/// forward, keeping paced transfers deterministic and fast.
pub struct MockClock {
    now: Arc<AtomicU64>,
}

#[allow(dead_code)]
impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::Relaxed);
    }

    pub fn now(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    async fn delay_ms<'a>(&'a mut self, millis: u32) {
        self.now.fetch_add(millis as u64, Ordering::Relaxed);
    }
}

#[allow(dead_code)]
/// Clock based on `tokio::time` to drive the service loop in real time.
pub struct TokioClock {
    start: Instant,
}

#[allow(dead_code)]
impl TokioClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    async fn delay_ms<'a>(&'a mut self, millis: u32) {
        sleep(Duration::from_millis(millis as u64)).await;
    }
}
