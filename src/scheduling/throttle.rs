use std::time::Duration;
use tokio::time::Instant;

/// Fixed wall-clock window between evaluations.
///
/// The window does not scale with playback rate: a 2x stream is still checked
/// at most once per window of real time.
#[derive(Debug, Clone)]
pub struct Throttle {
    window: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true and opens a new window if the previous one has elapsed.
    /// The first call always passes.
    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.window => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_spacing() {
        let mut throttle = Throttle::new(Duration::from_millis(1500));
        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());

        tokio::time::advance(Duration::from_millis(1499)).await;
        assert!(!throttle.try_acquire());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(throttle.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_reopens() {
        let mut throttle = Throttle::new(Duration::from_secs(10));
        assert!(throttle.try_acquire());
        throttle.reset();
        assert!(throttle.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixty_seconds_of_quarter_second_ticks() {
        let mut throttle = Throttle::new(Duration::from_millis(1500));
        let mut passes = 0;
        for _ in 0..240 {
            if throttle.try_acquire() {
                passes += 1;
            }
            tokio::time::advance(Duration::from_millis(250)).await;
        }
        assert_eq!(passes, 40);
    }
}
