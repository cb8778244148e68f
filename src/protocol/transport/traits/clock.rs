//! Monotonic clock abstraction providing the timestamps and pacing delays
//! required by session bookkeeping and paced transmissions.

/// Clock trait abstraction; must remain thread-safe when applicable.
pub trait Clock {
    /// Milliseconds elapsed since an arbitrary fixed origin. Monotonic.
    fn now_ms(&self) -> u64;

    /// Asynchronously wait for `millis` milliseconds.
    fn delay_ms<'a>(
        &'a mut self,
        millis: u32,
    ) -> impl core::future::Future<Output = ()> + 'a;
}
