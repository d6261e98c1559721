//! sim/kv — the object KV server and client that run over the simulated
//! network.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use log::warn;

use crate::error::{DeltaliteError, Result};
use crate::sim::bus::{Endpoint, EndpointHandler, Message, MessageBus};
use crate::sim::future::{Promise, SimFuture};
use crate::sim::ring::HashRing;

/// A KV server owning a local directory tree; keys map 1-1 to file paths
/// under `base_dir`.
pub struct KvServer {
    base_dir: PathBuf,
    path_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KvServer {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            path_locks: Mutex::new(HashMap::new()),
        })
    }

    fn path_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.path_locks.lock().unwrap();
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }

    fn not_found(key: &str, err: std::io::Error) -> DeltaliteError {
        if err.kind() == std::io::ErrorKind::NotFound {
            DeltaliteError::NotFound { key: key.to_string() }
        } else {
            DeltaliteError::Io(err)
        }
    }

    fn put(&self, key: &str, data: &[u8], overwrite: bool) -> Result<()> {
        let lock = self.path_lock(key);
        let _guard = lock.lock().unwrap();

        let path = self.key_path(key);
        if !overwrite && path.exists() {
            return Err(DeltaliteError::AlreadyExists { key: key.to_string() });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("kv.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        fs::read(self.key_path(key)).map_err(|e| Self::not_found(key, e))
    }

    fn get_range(&self, key: &str, start: i64, end: i64) -> Result<Vec<u8>> {
        let data = self.get(key)?;
        let len = data.len() as i64;
        let to_end = end == -1;
        let effective_end = if to_end { len } else { end };
        // `0 <= start <= end < file_size`, except the `end == -1` sentinel
        // which alone is allowed to reach all the way to `len`.
        let valid = start >= 0 && start <= effective_end && (to_end || effective_end < len);
        if !valid {
            return Err(DeltaliteError::InvalidRange {
                key: key.to_string(),
                start,
                end,
            });
        }
        Ok(data[start as usize..effective_end as usize].to_vec())
    }

    fn get_size(&self, key: &str) -> Result<u64> {
        let meta = fs::metadata(self.key_path(key)).map_err(|e| Self::not_found(key, e))?;
        Ok(meta.len())
    }

    fn delete(&self, key: &str) -> Result<()> {
        fs::remove_file(self.key_path(key)).map_err(|e| Self::not_found(key, e))
    }

    /// Walk the tree, returning paths relative to `base_dir`, filtered by
    /// `prefix`, excluding directories.
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        walk(&self.base_dir, &self.base_dir, &mut out)?;
        out.retain(|p| p.starts_with(prefix));
        out.sort();
        Ok(out)
    }
}

fn walk(base: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(base, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(base) {
            if let Some(s) = rel.to_str() {
                if !s.ends_with(".kv.tmp") {
                    out.push(s.to_string());
                }
            }
        }
    }
    Ok(())
}

impl EndpointHandler for KvServer {
    fn handle(&mut self, bus: &mut MessageBus, envelope: crate::sim::bus::Envelope) {
        let response = match envelope.message {
            Message::Put {
                key,
                data,
                overwrite,
                correlation_id,
            } => {
                let result = self.put(&key, &data, overwrite);
                Message::PutResponse {
                    success: result.is_ok(),
                    error: result.err().map(|e| e.to_string()),
                    key,
                    correlation_id,
                }
            }
            Message::Get { key, correlation_id } => {
                let result = self.get(&key);
                Message::GetResponse {
                    success: result.is_ok(),
                    data: result.as_ref().ok().cloned(),
                    error: result.err().map(|e| e.to_string()),
                    key,
                    correlation_id,
                }
            }
            Message::GetRange {
                key,
                start_byte,
                end_byte,
                correlation_id,
            } => {
                let result = self.get_range(&key, start_byte, end_byte);
                Message::GetRangeResponse {
                    success: result.is_ok(),
                    data: result.as_ref().ok().cloned(),
                    error: result.err().map(|e| e.to_string()),
                    key,
                    start_byte,
                    end_byte,
                    correlation_id,
                }
            }
            Message::GetSize { key, correlation_id } => {
                let result = self.get_size(&key);
                Message::GetSizeResponse {
                    success: result.is_ok(),
                    size: result.as_ref().ok().copied(),
                    error: result.err().map(|e| e.to_string()),
                    key,
                    correlation_id,
                }
            }
            Message::Delete { key, correlation_id } => {
                let result = self.delete(&key);
                Message::DeleteResponse {
                    success: result.is_ok(),
                    error: result.err().map(|e| e.to_string()),
                    key,
                    correlation_id,
                }
            }
            Message::List { prefix, correlation_id } => {
                let result = self.list(&prefix);
                Message::ListResponse {
                    success: result.is_ok(),
                    keys: result.as_ref().ok().cloned().unwrap_or_default(),
                    error: result.err().map(|e| e.to_string()),
                    correlation_id,
                }
            }
            other @ (Message::PutResponse { .. }
            | Message::GetResponse { .. }
            | Message::GetRangeResponse { .. }
            | Message::GetSizeResponse { .. }
            | Message::DeleteResponse { .. }
            | Message::ListResponse { .. }) => {
                warn!("KvServer received a response-shaped message {:?}; ignoring", other.correlation_id());
                return;
            }
        };
        bus.send(response, envelope.dest, envelope.source);
    }
}

/// A single pending request's identity, used to match a response back to
/// the future the caller is holding. Requests correlate to responses by
/// an `(operation, key)` pair.
type PendingKey = (&'static str, String);

pub struct KvClient {
    endpoint: Endpoint,
    ring: HashRing,
    next_correlation_id: u64,
    pending: Rc<RefCell<HashMap<PendingKey, Promise<Message>>>>,
}

impl KvClient {
    pub fn new(endpoint: Endpoint, ring: HashRing) -> Self {
        Self {
            endpoint,
            ring,
            next_correlation_id: 0,
            pending: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The server this client would route `key` to, useful for asserting
    /// that a key routes to the same server across calls.
    pub fn server_for_key(&self, key: &str) -> Option<Endpoint> {
        self.ring.server_for_key(key.as_bytes())
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_correlation_id;
        self.next_correlation_id += 1;
        id
    }

    fn dispatch(&mut self, bus: &mut MessageBus, pending_key: PendingKey, message: Message) -> SimFuture<Message> {
        let (promise, future) = Promise::new();
        self.pending.borrow_mut().insert(pending_key, promise);
        let dest = match &message {
            Message::List { .. } => self.ring.servers().into_iter().next(),
            Message::Put { key, .. }
            | Message::Get { key, .. }
            | Message::GetRange { key, .. }
            | Message::GetSize { key, .. }
            | Message::Delete { key, .. } => self.ring.server_for_key(key.as_bytes()),
            _ => None,
        };
        if let Some(dest) = dest {
            bus.send(message, self.endpoint.clone(), dest);
        }
        // No server known: the future is simply left pending, mirroring
        // how a partitioned send leaves it pending.
        future
    }

    pub fn put(&mut self, bus: &mut MessageBus, key: &str, data: Vec<u8>, overwrite: bool) -> SimFuture<Message> {
        let correlation_id = self.next_id();
        self.dispatch(
            bus,
            ("put", key.to_string()),
            Message::Put {
                key: key.to_string(),
                data,
                overwrite,
                correlation_id,
            },
        )
    }

    pub fn get(&mut self, bus: &mut MessageBus, key: &str) -> SimFuture<Message> {
        let correlation_id = self.next_id();
        self.dispatch(
            bus,
            ("get", key.to_string()),
            Message::Get {
                key: key.to_string(),
                correlation_id,
            },
        )
    }

    pub fn get_range(&mut self, bus: &mut MessageBus, key: &str, start_byte: i64, end_byte: i64) -> SimFuture<Message> {
        let correlation_id = self.next_id();
        self.dispatch(
            bus,
            ("get_range", key.to_string()),
            Message::GetRange {
                key: key.to_string(),
                start_byte,
                end_byte,
                correlation_id,
            },
        )
    }

    pub fn get_size(&mut self, bus: &mut MessageBus, key: &str) -> SimFuture<Message> {
        let correlation_id = self.next_id();
        self.dispatch(
            bus,
            ("get_size", key.to_string()),
            Message::GetSize {
                key: key.to_string(),
                correlation_id,
            },
        )
    }

    pub fn delete(&mut self, bus: &mut MessageBus, key: &str) -> SimFuture<Message> {
        let correlation_id = self.next_id();
        self.dispatch(
            bus,
            ("delete", key.to_string()),
            Message::Delete {
                key: key.to_string(),
                correlation_id,
            },
        )
    }

    /// Routes to a single server on the ring; does not aggregate across
    /// shards. A documented limitation, not a bug.
    pub fn list(&mut self, bus: &mut MessageBus, prefix: &str) -> SimFuture<Message> {
        let correlation_id = self.next_id();
        self.dispatch(
            bus,
            ("list", prefix.to_string()),
            Message::List {
                prefix: prefix.to_string(),
                correlation_id,
            },
        )
    }
}

fn pending_key_for(message: &Message) -> Option<PendingKey> {
    match message {
        Message::PutResponse { key, .. } => Some(("put", key.clone())),
        Message::GetResponse { key, .. } => Some(("get", key.clone())),
        Message::GetRangeResponse { key, .. } => Some(("get_range", key.clone())),
        Message::GetSizeResponse { key, .. } => Some(("get_size", key.clone())),
        Message::DeleteResponse { key, .. } => Some(("delete", key.clone())),
        Message::ListResponse { .. } => None, // prefix isn't carried on the response; see below
        _ => None,
    }
}

impl EndpointHandler for KvClient {
    fn handle(&mut self, _bus: &mut MessageBus, envelope: crate::sim::bus::Envelope) {
        let key = match &envelope.message {
            Message::ListResponse { .. } => {
                // A client only ever has one list in flight per prefix; since
                // the response doesn't echo the prefix, complete the oldest
                // pending list request (there is at most one in the common
                // case this client is built for).
                let found = self
                    .pending
                    .borrow()
                    .keys()
                    .find(|(op, _)| *op == "list")
                    .cloned();
                found
            }
            other => pending_key_for(other),
        };
        let Some(key) = key else {
            warn!("KvClient got a response with no matching pending request: {:?}", envelope.message);
            return;
        };
        if let Some(promise) = self.pending.borrow_mut().remove(&key) {
            promise.complete(Ok(envelope.message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::network::NetworkConfig;
    use crate::sim::{block_on, MessageBus};
    use tempfile::tempdir;

    fn two_node_setup() -> (tempfile::TempDir, MessageBus, KvClient) {
        let dir = tempdir().unwrap();
        let mut bus = MessageBus::new(NetworkConfig::default());
        let server_ep = Endpoint::new("localhost", 8081);
        let server = KvServer::new(dir.path().join("server")).unwrap();
        bus.register(server_ep.clone(), Rc::new(RefCell::new(server)));

        let mut ring = HashRing::new(4);
        ring.add_server(server_ep);
        let client = KvClient::new(Endpoint::new("localhost", 8080), ring);
        (dir, bus, client)
    }

    #[test]
    fn put_then_get_round_trips_over_the_simulator() {
        let (_dir, mut bus, mut client) = two_node_setup();
        let put_future = client.put(&mut bus, "k1", b"value1".to_vec(), true);
        block_on(&mut bus, &put_future).unwrap();

        let get_future = client.get(&mut bus, "k1");
        let response = block_on(&mut bus, &get_future).unwrap();
        match response {
            Message::GetResponse { data, success, .. } => {
                assert!(success);
                assert_eq!(data.unwrap(), b"value1".to_vec());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn put_without_overwrite_on_existing_key_fails() {
        let (_dir, mut bus, mut client) = two_node_setup();
        let f1 = client.put(&mut bus, "k1", b"a".to_vec(), false);
        block_on(&mut bus, &f1).unwrap();

        let f2 = client.put(&mut bus, "k1", b"b".to_vec(), false);
        let response = block_on(&mut bus, &f2).unwrap();
        match response {
            Message::PutResponse { success, error, .. } => {
                assert!(!success);
                assert!(error.unwrap().contains("already exists"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn get_on_missing_key_reports_not_found() {
        let (_dir, mut bus, mut client) = two_node_setup();
        let f = client.get(&mut bus, "missing");
        let response = block_on(&mut bus, &f).unwrap();
        match response {
            Message::GetResponse { success, error, .. } => {
                assert!(!success);
                assert!(error.is_some());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn same_key_always_routes_to_the_same_server() {
        let (_dir, _bus, client) = two_node_setup();
        let a = client.server_for_key("k1");
        let b = client.server_for_key("k1");
        assert_eq!(a, b);
    }

    #[test]
    fn put_with_overwrite_true_succeeds_over_an_existing_key() {
        let (_dir, mut bus, mut client) = two_node_setup();
        let f1 = client.put(&mut bus, "k1", b"a".to_vec(), true);
        block_on(&mut bus, &f1).unwrap();

        let f2 = client.put(&mut bus, "k1", b"b".to_vec(), true);
        let response = block_on(&mut bus, &f2).unwrap();
        match response {
            Message::PutResponse { success, .. } => assert!(success),
            other => panic!("unexpected response: {other:?}"),
        }

        let get_future = client.get(&mut bus, "k1");
        match block_on(&mut bus, &get_future).unwrap() {
            Message::GetResponse { data, .. } => assert_eq!(data.unwrap(), b"b".to_vec()),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn get_range_returns_the_requested_byte_slice() {
        let (_dir, mut bus, mut client) = two_node_setup();
        let put_future = client.put(&mut bus, "k1", b"0123456789".to_vec(), true);
        block_on(&mut bus, &put_future).unwrap();

        let f = client.get_range(&mut bus, "k1", 2, 5);
        match block_on(&mut bus, &f).unwrap() {
            Message::GetRangeResponse { success, data, .. } => {
                assert!(success);
                assert_eq!(data.unwrap(), b"234".to_vec());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn get_range_to_end_of_value_when_end_byte_is_negative_one() {
        let (_dir, mut bus, mut client) = two_node_setup();
        let put_future = client.put(&mut bus, "k1", b"0123456789".to_vec(), true);
        block_on(&mut bus, &put_future).unwrap();

        let f = client.get_range(&mut bus, "k1", 7, -1);
        match block_on(&mut bus, &f).unwrap() {
            Message::GetRangeResponse { success, data, .. } => {
                assert!(success);
                assert_eq!(data.unwrap(), b"789".to_vec());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn get_range_with_start_past_end_is_an_invalid_range() {
        let (_dir, mut bus, mut client) = two_node_setup();
        let put_future = client.put(&mut bus, "k1", b"0123456789".to_vec(), true);
        block_on(&mut bus, &put_future).unwrap();

        let f = client.get_range(&mut bus, "k1", 5, 2);
        match block_on(&mut bus, &f).unwrap() {
            Message::GetRangeResponse { success, error, .. } => {
                assert!(!success);
                assert!(error.unwrap().contains("invalid range"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn get_range_past_the_value_length_is_an_invalid_range() {
        let (_dir, mut bus, mut client) = two_node_setup();
        let put_future = client.put(&mut bus, "k1", b"0123456789".to_vec(), true);
        block_on(&mut bus, &put_future).unwrap();

        let f = client.get_range(&mut bus, "k1", 0, 50);
        match block_on(&mut bus, &f).unwrap() {
            Message::GetRangeResponse { success, error, .. } => {
                assert!(!success);
                assert!(error.unwrap().contains("invalid range"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn get_range_with_end_equal_to_value_length_is_an_invalid_range() {
        let (_dir, mut bus, mut client) = two_node_setup();
        let put_future = client.put(&mut bus, "k1", b"0123456789".to_vec(), true);
        block_on(&mut bus, &put_future).unwrap();

        let f = client.get_range(&mut bus, "k1", 0, 10);
        match block_on(&mut bus, &f).unwrap() {
            Message::GetRangeResponse { success, error, .. } => {
                assert!(!success);
                assert!(error.unwrap().contains("invalid range"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn get_size_reports_the_stored_byte_length() {
        let (_dir, mut bus, mut client) = two_node_setup();
        let put_future = client.put(&mut bus, "k1", b"0123456789".to_vec(), true);
        block_on(&mut bus, &put_future).unwrap();

        let f = client.get_size(&mut bus, "k1");
        match block_on(&mut bus, &f).unwrap() {
            Message::GetSizeResponse { success, size, .. } => {
                assert!(success);
                assert_eq!(size.unwrap(), 10);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn get_size_on_missing_key_reports_not_found() {
        let (_dir, mut bus, mut client) = two_node_setup();
        let f = client.get_size(&mut bus, "missing");
        match block_on(&mut bus, &f).unwrap() {
            Message::GetSizeResponse { success, error, .. } => {
                assert!(!success);
                assert!(error.is_some());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn delete_then_get_reports_not_found() {
        let (_dir, mut bus, mut client) = two_node_setup();
        let put_future = client.put(&mut bus, "k1", b"v".to_vec(), true);
        block_on(&mut bus, &put_future).unwrap();

        let delete_future = client.delete(&mut bus, "k1");
        match block_on(&mut bus, &delete_future).unwrap() {
            Message::DeleteResponse { success, .. } => assert!(success),
            other => panic!("unexpected response: {other:?}"),
        }

        let get_future = client.get(&mut bus, "k1");
        match block_on(&mut bus, &get_future).unwrap() {
            Message::GetResponse { success, .. } => assert!(!success),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn delete_on_missing_key_reports_not_found() {
        let (_dir, mut bus, mut client) = two_node_setup();
        let f = client.delete(&mut bus, "missing");
        match block_on(&mut bus, &f).unwrap() {
            Message::DeleteResponse { success, error, .. } => {
                assert!(!success);
                assert!(error.is_some());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn list_is_filtered_to_the_given_prefix() {
        let (_dir, mut bus, mut client) = two_node_setup();
        for key in ["a/1", "a/2", "b/1"] {
            let f = client.put(&mut bus, key, b"v".to_vec(), true);
            block_on(&mut bus, &f).unwrap();
        }

        let f = client.list(&mut bus, "a/");
        match block_on(&mut bus, &f).unwrap() {
            Message::ListResponse { success, keys, .. } => {
                assert!(success);
                assert_eq!(keys, vec!["a/1".to_string(), "a/2".to_string()]);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
