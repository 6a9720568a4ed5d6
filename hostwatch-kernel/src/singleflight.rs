//! Coalesces concurrent operations on the same key into one in-flight task.
//!
//! The first caller for a key spawns the work on its own task; every caller
//! arriving while it runs (the first one included) waits on a broadcast of its
//! result. Because the work is detached from the callers, a caller that goes
//! away (e.g. an HTTP client disconnecting) cannot cancel it half-way.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, thiserror::Error)]
pub enum FlightError {
    #[error("in-flight task ended without producing a result")]
    Aborted,
}

type Flights<K, T> = Arc<Mutex<HashMap<K, broadcast::Sender<T>>>>;

pub struct SingleFlight<K, T> {
    flights: Flights<K, T>,
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Hash + Eq + Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Hash + Eq + Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self { flights: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Runs `work` unless an operation for `key` is already in flight, in which
    /// case its result is shared instead and `work` is dropped unused.
    pub async fn run<F>(&self, key: K, work: F) -> Result<T, FlightError>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (mut rx, leader) = {
            let mut flights = self.flights.lock();
            match flights.get(&key) {
                Some(tx) => (tx.subscribe(), false),
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    flights.insert(key.clone(), tx);
                    (rx, true)
                }
            }
        };

        if leader {
            let landing = Landing { flights: self.flights.clone(), key: Some(key) };
            tokio::spawn(async move {
                let outcome = work.await;
                landing.land(outcome);
            });
        }

        rx.recv().await.map_err(|_| FlightError::Aborted)
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }
}

/// Owned by the spawned task. Removes the flight entry even if the task panics,
/// which closes the channel and releases the waiters.
struct Landing<K: Hash + Eq, T> {
    flights: Flights<K, T>,
    key: Option<K>,
}

impl<K: Hash + Eq, T> Landing<K, T> {
    fn land(mut self, outcome: T) {
        if let Some(key) = self.key.take() {
            let tx = self.flights.lock().remove(&key);
            if let Some(tx) = tx {
                // no receivers left is fine
                let _ = tx.send(outcome);
            }
        }
    }
}

impl<K: Hash + Eq, T> Drop for Landing<K, T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.flights.lock().remove(&key);
        }
    }
}
