use std::{
  sync::Mutex,
  time::{Duration, Instant},
};

pub const SETTLE_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
struct Observation {
  height: i64,
  first_seen: Instant,
  last_seen: Instant,
}

/// Debounces the height reported by a remote index. A freshly reported height is
/// only trusted once it has stayed unchanged for the settle window.
#[derive(Debug)]
pub struct HeightReconciler {
  window: Duration,
  last: Mutex<Option<Observation>>,
}

impl Default for HeightReconciler {
  fn default() -> Self {
    Self::new(SETTLE_WINDOW)
  }
}

impl HeightReconciler {
  pub fn new(window: Duration) -> Self {
    Self {
      window,
      last: Mutex::new(None),
    }
  }

  pub fn reconcile(&self, reported: i64) -> i64 {
    self.reconcile_at(reported, Instant::now())
  }

  pub fn reconcile_at(&self, reported: i64, now: Instant) -> i64 {
    let mut last = match self.last.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };

    let observed = Observation {
      height: reported,
      first_seen: now,
      last_seen: now,
    };

    let Some(previous) = last.as_mut() else {
      *last = Some(observed);
      return reported - 1;
    };

    if reported < previous.height {
      log::info!(
        "index height regressed reported[{reported}] stored[{}]",
        previous.height
      );
      previous.last_seen = now;
      return reported;
    }

    if reported > previous.height {
      *previous = observed;
      return reported - 1;
    }

    previous.last_seen = now;
    if now.saturating_duration_since(previous.first_seen) < self.window {
      reported - 1
    } else {
      reported
    }
  }

  fn observation(&self) -> Option<Observation> {
    match self.last.lock() {
      Ok(guard) => *guard,
      Err(poisoned) => *poisoned.into_inner(),
    }
  }

  /// The height currently held, if any.
  pub fn stored(&self) -> Option<i64> {
    self.observation().map(|observation| observation.height)
  }

  /// When the index last reported anything, including regressions.
  pub fn last_seen(&self) -> Option<Instant> {
    self.observation().map(|observation| observation.last_seen)
  }
}
