//! sim — a deterministic, single-threaded distributed simulator. No
//! background threads and no async runtime: time only advances when
//! something calls `MessageBus::tick()`, and the only suspension
//! mechanism is the hand-rolled `Promise`/`SimFuture` pair driven by
//! `bridge::block_on` or `testutil::run_until`.
//!
//! No `tokio`/`async-std` dependency: a runtime would have no other use
//! in this crate, so suspension is modeled directly instead.

mod bridge;
mod bus;
mod future;
mod kv;
mod network;
mod ring;
pub mod testutil;

pub use bridge::block_on;
pub use bus::{Endpoint, Envelope, Message, MessageBus};
pub use future::{Promise, SimFuture};
pub use kv::{KvClient, KvServer};
pub use network::NetworkConfig;
pub use ring::HashRing;
