/// Receives progress updates from long-running operations.
///
/// Implementations only observe; they never influence the bytes produced.
pub trait Progress {
    /// `done` of `total` logical bytes have been processed.
    fn update(&mut self, done: u64, total: u64);

    /// The operation has completed successfully.
    fn finish(&mut self) {}
}

/// Progress sink that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&mut self, _done: u64, _total: u64) {}
}
