use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};

/// Trailing-edge debounce.
///
/// Every `schedule()` pushes the deadline out by `delay`; `fired()` resolves
/// once the deadline passes with no further schedules. `fired()` is cancel
/// safe, so it can sit in a `select!` loop.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, sleep: None }
    }

    pub fn schedule(&mut self) {
        let deadline = Instant::now() + self.delay;
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.sleep = Some(Box::pin(sleep(self.delay))),
        }
    }

    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    pub fn is_pending(&self) -> bool {
        self.sleep.is_some()
    }

    /// Waits forever when nothing is scheduled
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.await;
                self.sleep = None;
            }
            None => pending::<()>().await,
        }
    }
}
