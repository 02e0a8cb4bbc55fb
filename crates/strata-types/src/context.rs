use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cancellation token threaded through every blocking operation.
///
/// Registry operations are long-running and perform blocking I/O against
/// the chunk store; each store boundary checks the context and aborts with
/// a cancellation signal when it has fired. Cloning a `Context` shares the
/// underlying flag, so cancelling any clone cancels them all.
#[derive(Clone, Debug, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that cancels itself once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Cancel this context and all of its clones.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if the context has been cancelled or its deadline
    /// has passed.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn background_is_never_cancelled() {
        let ctx = Context::background();
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn cancel_fires_flag() {
        let ctx = Context::background();
        ctx.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn clones_share_cancellation() {
        let ctx = Context::background();
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn deadline_in_the_past_cancels() {
        let ctx = Context::with_timeout(Duration::from_millis(0));
        thread::sleep(Duration::from_millis(5));
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn generous_deadline_does_not_cancel() {
        let ctx = Context::with_timeout(Duration::from_secs(3600));
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn cancel_from_another_thread() {
        let ctx = Context::background();
        let clone = ctx.clone();
        let handle = thread::spawn(move || clone.cancel());
        handle.join().expect("thread should not panic");
        assert!(ctx.is_cancelled());
    }
}
