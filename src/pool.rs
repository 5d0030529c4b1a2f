//! Bounded pool of reusable HTTP clients.
//!
//! A client is checked out for exactly one request and returned when the
//! `PooledSession` guard drops, so it goes back even when the request fails
//! or the task holding it is aborted.

use std::ops::Deref;
use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;

pub struct SessionPool {
    idle: Mutex<Vec<Client>>,
    capacity: usize,
    user_agent: String,
}

impl SessionPool {
    pub fn new(capacity: usize, user_agent: impl Into<String>) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            user_agent: user_agent.into(),
        }
    }

    /// Take an idle client, or build a fresh one when none is idle.
    pub fn acquire(&self) -> reqwest::Result<PooledSession<'_>> {
        let reused = self.lock().pop();
        let client = match reused {
            Some(client) => client,
            None => self.build_client()?,
        };
        Ok(PooledSession { pool: self, client })
    }

    /// Return a client. Dropped instead when the pool is already full.
    pub fn release(&self, client: Client) {
        let mut idle = self.lock();
        if idle.len() < self.capacity {
            idle.push(client);
        }
    }

    /// Number of clients currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Client>> {
        // A panic while holding the lock cannot leave the Vec half-updated.
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build_client(&self) -> reqwest::Result<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("sv-SE,sv;q=0.9,en;q=0.8"),
        );
        Client::builder()
            .user_agent(self.user_agent.as_str())
            .default_headers(headers)
            .build()
    }
}

/// A checked-out client; goes back to its pool on drop.
pub struct PooledSession<'a> {
    pool: &'a SessionPool,
    client: Client,
}

impl Deref for PooledSession<'_> {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        // Client is a handle over shared state; the clone is what goes back.
        self.pool.release(self.client.clone());
    }
}
