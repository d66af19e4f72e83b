//! In-process list transports for exercising the shared store.

use super::ListTransport;
use crate::error::{ThrottlerError, ThrottlerResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Behaves like the Redis list commands the shared store uses.
#[derive(Default)]
pub struct FakeListTransport {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    pops: AtomicU64,
    fail: AtomicBool,
}

impl FakeListTransport {
    /// Replaces `key` with `values`, front first.
    pub fn seed(&self, key: &str, values: &[&str]) {
        self.lists.lock().unwrap().insert(
            key.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
    }

    /// Contents of `key`, front first.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.lists
            .lock()
            .unwrap()
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pops(&self) -> u64 {
        self.pops.load(Ordering::SeqCst)
    }

    /// Makes every subsequent call fail like a dropped connection.
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> ThrottlerResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ThrottlerError::Storage("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ListTransport for FakeListTransport {
    async fn length(&self, key: &str) -> ThrottlerResult<u64> {
        self.check()?;
        Ok(self.lists.lock().unwrap().get(key).map_or(0, |l| l.len() as u64))
    }

    async fn push_front(&self, key: &str, value: &str) -> ThrottlerResult<()> {
        self.check()?;
        self.lists
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn pop_back(&self, key: &str) -> ThrottlerResult<Option<String>> {
        self.check()?;
        self.pops.fetch_add(1, Ordering::SeqCst);
        let mut lists = self.lists.lock().unwrap();
        let popped = lists.get_mut(key).and_then(|l| l.pop_back());
        if lists.get(key).is_some_and(|l| l.is_empty()) {
            lists.remove(key);
        }
        Ok(popped)
    }

    async fn push_back(&self, key: &str, value: &str) -> ThrottlerResult<()> {
        self.check()?;
        self.lists
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        Ok(())
    }

    async fn peek_back(&self, key: &str) -> ThrottlerResult<Option<String>> {
        self.check()?;
        Ok(self
            .lists
            .lock()
            .unwrap()
            .get(key)
            .and_then(|l| l.back().cloned()))
    }

    async fn delete_matching(&self, pattern: &str) -> ThrottlerResult<u64> {
        self.check()?;
        let prefix = pattern.trim_end_matches('*');
        let mut lists = self.lists.lock().unwrap();
        let before = lists.len();
        lists.retain(|key, _| !key.starts_with(prefix));
        Ok((before - lists.len()) as u64)
    }

    async fn ping(&self) -> ThrottlerResult<()> {
        self.check()
    }
}

/// Simulates another process pruning between our peek and our pop: the peek
/// always reports `peeked`, the pop returns `popped`.
pub struct RacingTransport {
    peeked: String,
    popped: String,
    restored: Mutex<Vec<(String, String)>>,
}

impl RacingTransport {
    pub fn new(peeked: &str, popped: &str) -> Self {
        Self {
            peeked: peeked.to_string(),
            popped: popped.to_string(),
            restored: Mutex::new(Vec::new()),
        }
    }

    pub fn restored(&self) -> Vec<(String, String)> {
        self.restored.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListTransport for RacingTransport {
    async fn length(&self, _key: &str) -> ThrottlerResult<u64> {
        Ok(1)
    }

    async fn push_front(&self, _key: &str, _value: &str) -> ThrottlerResult<()> {
        Ok(())
    }

    async fn pop_back(&self, _key: &str) -> ThrottlerResult<Option<String>> {
        Ok(Some(self.popped.clone()))
    }

    async fn push_back(&self, key: &str, value: &str) -> ThrottlerResult<()> {
        self.restored
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_string()));
        Ok(())
    }

    async fn peek_back(&self, _key: &str) -> ThrottlerResult<Option<String>> {
        Ok(Some(self.peeked.clone()))
    }

    async fn delete_matching(&self, _pattern: &str) -> ThrottlerResult<u64> {
        Ok(0)
    }
}
