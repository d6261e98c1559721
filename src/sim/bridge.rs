//! sim/bridge — the tick-driven synchronous-over-asynchronous bridge:
//! the only mechanism that turns the cooperative tick scheduler into a
//! blocking call for callers that need one.

use crate::error::Result;
use crate::sim::bus::MessageBus;
use crate::sim::future::SimFuture;

/// Drive `bus.tick()` until `future` completes, then return its value (or
/// propagate its terminal error verbatim). Never ticks once the future is
/// already done, and — because it contains no tick budget of its own —
/// will loop forever against a future that is never completed (e.g. a
/// partitioned endpoint); callers that need a bound should drive the wait
/// through `testutil::run_until` instead and treat "never done" as a
/// first-class outcome.
pub fn block_on<T>(bus: &mut MessageBus, future: &SimFuture<T>) -> Result<T> {
    loop {
        if future.is_done() {
            return future
                .try_take()
                .expect("is_done() just returned true, so a value must be present");
        }
        bus.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::future::Promise;
    use crate::sim::network::NetworkConfig;

    #[test]
    fn returns_immediately_for_an_already_done_future() {
        let mut bus = MessageBus::new(NetworkConfig::default());
        let (promise, future) = Promise::<u32>::new();
        promise.complete(Ok(9));
        assert_eq!(bus.current_tick(), 0);
        assert_eq!(block_on(&mut bus, &future).unwrap(), 9);
        assert_eq!(bus.current_tick(), 0, "must never tick once the future is done");
    }
}
