//! Strategies for picking a connection when a request has no owner.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;

/// Picks one of `len` candidates for requests that may go to any member.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Returns the index of the chosen candidate, or `None` if `len` is zero.
    fn next_index(&self, len: usize) -> Option<usize>;
}

/// Selects an element of `candidates` with `balancer`.
pub fn select<'a, T>(balancer: &dyn LoadBalancer, candidates: &'a [T]) -> Option<&'a T> {
    balancer
        .next_index(candidates.len())
        .and_then(|idx| candidates.get(idx))
}

/// Cycles through candidates in order.
#[derive(Debug, Default)]
pub struct RoundRobinLoadBalancer {
    index: AtomicUsize,
}

impl RoundRobinLoadBalancer {
    /// Creates a new round-robin load balancer.
    pub fn new() -> Self {
        Self {
            index: AtomicUsize::new(0),
        }
    }
}

impl LoadBalancer for RoundRobinLoadBalancer {
    fn next_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.index.fetch_add(1, Ordering::Relaxed) % len)
    }
}

/// Picks a uniformly random candidate.
#[derive(Debug, Default)]
pub struct RandomLoadBalancer;

impl RandomLoadBalancer {
    /// Creates a new random load balancer.
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RandomLoadBalancer {
    fn next_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(rand::thread_rng().gen_range(0..len))
    }
}

/// Creates a default load balancer (round-robin).
pub fn default_load_balancer() -> Arc<dyn LoadBalancer> {
    Arc::new(RoundRobinLoadBalancer::new())
}
