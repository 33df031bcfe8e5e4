//! Minimal executor for running one future per OS thread

use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};

struct ThreadWaker(Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}

/// Run a future to completion, parking the thread while it is pending
pub fn block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = pin!(fut);
    let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
    let mut cx = Context::from_waker(&waker);
    loop {
        if let Poll::Ready(output) = fut.as_mut().poll(&mut cx) {
            return output;
        }
        // Spurious wakeups only cost an extra poll
        thread::park();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_ready_future() {
        assert_eq!(block_on(async { 7 }), 7);
    }

    #[test]
    fn test_wakes_on_timer() {
        let start = Instant::now();
        block_on(embassy_time::Timer::after_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
