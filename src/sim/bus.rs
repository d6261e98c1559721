//! sim/bus — endpoint registration, envelope dispatch, and the message
//! taxonomy exchanged over the simulator.
//!
//! Registered handlers are `Rc<RefCell<dyn EndpointHandler>>` rather than
//! `Arc<Mutex<_>>`: the simulator is single-threaded by construction, so
//! there is no need for `Send`/`Sync` bounds on the handler registry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::sim::network::{NetworkConfig, SimNetwork};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// The closed set of request/response kinds the object KV service
/// exchanges over the bus. Every variant carries the `correlation_id` the
/// sender chose, so responses can be matched.
#[derive(Debug, Clone)]
pub enum Message {
    Put {
        key: String,
        data: Vec<u8>,
        overwrite: bool,
        correlation_id: u64,
    },
    PutResponse {
        key: String,
        success: bool,
        error: Option<String>,
        correlation_id: u64,
    },
    Get {
        key: String,
        correlation_id: u64,
    },
    GetResponse {
        key: String,
        data: Option<Vec<u8>>,
        success: bool,
        error: Option<String>,
        correlation_id: u64,
    },
    GetRange {
        key: String,
        start_byte: i64,
        end_byte: i64,
        correlation_id: u64,
    },
    GetRangeResponse {
        key: String,
        data: Option<Vec<u8>>,
        start_byte: i64,
        end_byte: i64,
        success: bool,
        error: Option<String>,
        correlation_id: u64,
    },
    GetSize {
        key: String,
        correlation_id: u64,
    },
    GetSizeResponse {
        key: String,
        size: Option<u64>,
        success: bool,
        error: Option<String>,
        correlation_id: u64,
    },
    Delete {
        key: String,
        correlation_id: u64,
    },
    DeleteResponse {
        key: String,
        success: bool,
        error: Option<String>,
        correlation_id: u64,
    },
    List {
        prefix: String,
        correlation_id: u64,
    },
    ListResponse {
        keys: Vec<String>,
        success: bool,
        error: Option<String>,
        correlation_id: u64,
    },
}

impl Message {
    pub fn correlation_id(&self) -> u64 {
        match self {
            Message::Put { correlation_id, .. }
            | Message::PutResponse { correlation_id, .. }
            | Message::Get { correlation_id, .. }
            | Message::GetResponse { correlation_id, .. }
            | Message::GetRange { correlation_id, .. }
            | Message::GetRangeResponse { correlation_id, .. }
            | Message::GetSize { correlation_id, .. }
            | Message::GetSizeResponse { correlation_id, .. }
            | Message::Delete { correlation_id, .. }
            | Message::DeleteResponse { correlation_id, .. }
            | Message::List { correlation_id, .. }
            | Message::ListResponse { correlation_id, .. } => *correlation_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: u64,
    pub message: Message,
    pub source: Endpoint,
    pub dest: Endpoint,
    pub scheduled_tick: u64,
}

/// Anything that can be registered at an `Endpoint` to receive delivered
/// envelopes. Implementors may call back into `bus` (e.g. to send a
/// response) from within `handle`.
pub trait EndpointHandler {
    fn handle(&mut self, bus: &mut MessageBus, envelope: Envelope);
}

pub struct MessageBus {
    network: SimNetwork,
    handlers: HashMap<Endpoint, Rc<RefCell<dyn EndpointHandler>>>,
}

impl MessageBus {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            network: SimNetwork::new(config),
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, endpoint: Endpoint, handler: Rc<RefCell<dyn EndpointHandler>>) {
        self.handlers.insert(endpoint, handler);
    }

    pub fn unregister(&mut self, endpoint: &Endpoint) {
        self.handlers.remove(endpoint);
    }

    pub fn send(&mut self, message: Message, source: Endpoint, dest: Endpoint) -> Option<u64> {
        self.network.send(message, source, dest)
    }

    pub fn add_partition(&mut self, a: Endpoint, b: Endpoint) {
        self.network.add_partition(a, b);
    }

    pub fn remove_partition(&mut self, a: &Endpoint, b: &Endpoint) {
        self.network.remove_partition(a, b);
    }

    pub fn current_tick(&self) -> u64 {
        self.network.current_tick()
    }

    pub fn queue_size(&self) -> usize {
        self.network.queue_size()
    }

    pub fn reset(&mut self) {
        self.network.reset();
        self.handlers.clear();
    }

    /// Advance one tick, delivering every envelope whose scheduled tick has
    /// arrived to its destination's registered handler, in scheduling
    /// order. An envelope destined for an unregistered endpoint is logged
    /// and dropped.
    pub fn tick(&mut self) {
        let ready = self.network.tick();
        for envelope in ready {
            match self.handlers.get(&envelope.dest).cloned() {
                Some(handler) => handler.borrow_mut().handle(self, envelope),
                None => debug!(
                    "dropping envelope {} for unregistered endpoint {:?}",
                    envelope.id, envelope.dest
                ),
            }
        }
    }
}
