//! Continuous-capture collaborator driven by the readiness gate.

use crate::error::EngineResult;
use async_trait::async_trait;

/// Starts and stops the downstream continuous capture of tag values.
///
/// Implementations must tolerate repeated calls of either method.
#[async_trait]
pub trait CaptureControl: Send + Sync {
    async fn start_continuous_capture(&self) -> EngineResult<()>;
    async fn stop_continuous_capture(&self) -> EngineResult<()>;
}

/// A counting capture controller for testing.
pub mod mock {
    use super::*;
    use crate::error::EngineError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    pub struct MockCapture {
        starts: AtomicUsize,
        stops: AtomicUsize,
        fail: AtomicBool,
    }

    impl MockCapture {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every subsequent call fail (after being counted).
        pub fn fail_calls(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }

        pub fn starts(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }

        pub fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }

        fn outcome(&self) -> EngineResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                Err(EngineError::Task("capture unavailable".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CaptureControl for MockCapture {
        async fn start_continuous_capture(&self) -> EngineResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.outcome()
        }

        async fn stop_continuous_capture(&self) -> EngineResult<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.outcome()
        }
    }
}
