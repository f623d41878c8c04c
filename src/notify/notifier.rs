// ============================================================================
// Change Notifier
// ============================================================================
//
// `publish` is fire-and-forget and never runs on the committing thread when a
// runtime is available. `subscribe` turns the bus into a refresh signal:
//
//   * one signal immediately, so a new query runs at least once
//   * then at most one signal per window; every event that lands while the
//     window is closed is folded into the next signal
//
// The stream ends only when the bus drops the channel. Dropping it cancels.
//
// ============================================================================

use super::bus::NotificationBus;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{Instant, sleep_until};
use tracing::trace;

#[derive(Clone)]
pub struct ChangeNotifier {
    bus: Arc<dyn NotificationBus>,
    window: Duration,
}

struct Throttle {
    events: BoxStream<'static, ()>,
    window: Duration,
    next_allowed: Option<Instant>,
}

impl ChangeNotifier {
    pub fn new(bus: Arc<dyn NotificationBus>, window: Duration) -> Self {
        Self { bus, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn bus(&self) -> &Arc<dyn NotificationBus> {
        &self.bus
    }

    /// Announce that something of `entity` changed
    pub fn publish(&self, entity: &str) {
        trace!("publishing change for '{}'", entity);
        match Handle::try_current() {
            Ok(runtime) => {
                let bus = self.bus.clone();
                let key = entity.to_string();
                runtime.spawn(async move { bus.post(&key) });
            }
            Err(_) => self.bus.post(entity),
        }
    }

    /// Coalesced refresh signals for `entity`, seeded with one immediate signal
    pub fn subscribe(&self, entity: &str) -> BoxStream<'static, ()> {
        let throttle = Throttle {
            events: self.bus.observe(entity),
            window: self.window,
            next_allowed: None,
        };

        stream::unfold(throttle, |mut throttle| async move {
            if let Some(next_allowed) = throttle.next_allowed {
                throttle.events.next().await?;
                sleep_until(next_allowed).await;
                // fold in whatever arrived while we waited
                while let Some(Some(())) = throttle.events.next().now_or_never() {}
            }
            throttle.next_allowed = Some(Instant::now() + throttle.window);
            Some(((), throttle))
        })
        .boxed()
    }
}
