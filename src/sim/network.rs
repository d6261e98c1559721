//! sim/network — the tick-driven envelope queue.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sim::bus::{Endpoint, Envelope, Message};

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub loss_rate: f64,
    /// Inclusive `[min_ticks, max_ticks]` latency range applied to every
    /// accepted send.
    pub latency: (u64, u64),
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            latency: (0, 0),
            seed: 0,
        }
    }
}

struct Queued {
    seq: u64,
    envelope: Envelope,
}

pub struct SimNetwork {
    config: NetworkConfig,
    rng: StdRng,
    current_tick: u64,
    next_id: u64,
    next_seq: u64,
    partitions: HashSet<(Endpoint, Endpoint)>,
    queue: Vec<Queued>,
}

fn partition_key(a: &Endpoint, b: &Endpoint) -> (Endpoint, Endpoint) {
    if (a.host.as_str(), a.port) <= (b.host.as_str(), b.port) {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl SimNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            current_tick: 0,
            next_id: 0,
            next_seq: 0,
            partitions: HashSet::new(),
            queue: Vec::new(),
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }

    pub fn add_partition(&mut self, a: Endpoint, b: Endpoint) {
        self.partitions.insert(partition_key(&a, &b));
    }

    pub fn remove_partition(&mut self, a: &Endpoint, b: &Endpoint) {
        self.partitions.remove(&partition_key(a, b));
    }

    pub fn is_partitioned(&self, a: &Endpoint, b: &Endpoint) -> bool {
        self.partitions.contains(&partition_key(a, b))
    }

    /// Attempt to send `message` from `source` to `dest`. Returns the
    /// assigned envelope id if the send was scheduled, or `None` if it was
    /// dropped by loss or a partition.
    pub fn send(&mut self, message: Message, source: Endpoint, dest: Endpoint) -> Option<u64> {
        if self.is_partitioned(&source, &dest) {
            return None;
        }
        if self.config.loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.loss_rate {
            return None;
        }
        let (min, max) = self.config.latency;
        let delay = if min == max {
            min
        } else {
            self.rng.gen_range(min..=max)
        };

        let id = self.next_id;
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;

        self.queue.push(Queued {
            seq,
            envelope: Envelope {
                id,
                message,
                source,
                dest,
                scheduled_tick: self.current_tick + delay,
            },
        });
        Some(id)
    }

    /// Advance the tick counter by exactly 1 and drain every envelope
    /// whose `scheduled_tick` has arrived, in scheduling order (ties
    /// broken by send order).
    pub fn tick(&mut self) -> Vec<Envelope> {
        self.current_tick += 1;
        let now = self.current_tick;

        self.queue
            .sort_by(|a, b| {
                a.envelope
                    .scheduled_tick
                    .cmp(&b.envelope.scheduled_tick)
                    .then(a.seq.cmp(&b.seq))
            });

        let split_at = self
            .queue
            .partition_point(|q| q.envelope.scheduled_tick <= now);
        self.queue
            .drain(..split_at)
            .map(|q| q.envelope)
            .collect()
    }

    pub fn reset(&mut self) {
        self.queue.clear();
        self.partitions.clear();
        self.current_tick = 0;
        self.next_id = 0;
        self.next_seq = 0;
        self.rng = StdRng::seed_from_u64(self.config.seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(port: u16) -> Endpoint {
        Endpoint {
            host: "localhost".into(),
            port,
        }
    }

    #[test]
    fn zero_latency_no_loss_delivers_next_tick() {
        let mut net = SimNetwork::new(NetworkConfig::default());
        net.send(Message::Delete { key: "a".into(), correlation_id: 0 }, ep(1), ep(2));
        assert_eq!(net.tick().len(), 1);
    }

    #[test]
    fn fixed_latency_delivers_exactly_k_ticks_later() {
        let mut net = SimNetwork::new(NetworkConfig {
            loss_rate: 0.0,
            latency: (3, 3),
            seed: 1,
        });
        net.send(Message::Delete { key: "a".into(), correlation_id: 0 }, ep(1), ep(2));
        for _ in 0..2 {
            assert_eq!(net.tick().len(), 0);
        }
        assert_eq!(net.tick().len(), 1);
    }

    #[test]
    fn partition_drops_and_queue_is_empty() {
        let mut net = SimNetwork::new(NetworkConfig::default());
        net.add_partition(ep(1), ep(2));
        let id = net.send(Message::Delete { key: "a".into(), correlation_id: 0 }, ep(1), ep(2));
        assert!(id.is_none());
        assert_eq!(net.queue_size(), 0);
    }

    #[test]
    fn tick_determinism_given_same_seed_and_sends() {
        let run = || {
            let mut net = SimNetwork::new(NetworkConfig {
                loss_rate: 0.3,
                latency: (0, 4),
                seed: 42,
            });
            let mut delivered = Vec::new();
            for i in 0..10u64 {
                net.send(
                    Message::Delete { key: format!("k{i}"), correlation_id: i },
                    ep(1),
                    ep(2),
                );
            }
            for _ in 0..10 {
                for env in net.tick() {
                    delivered.push((env.scheduled_tick, env.id));
                }
            }
            delivered
        };
        assert_eq!(run(), run());
    }
}
