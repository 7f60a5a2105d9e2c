//! Fee-ordered "virtual block" queue built on [`CritBitTree`].
//!
//! Entries are keyed by bid amount. The tree requires unique keys, so
//! entries sharing a bid collect into a per-bid list and drain in insertion
//! order. Draining always pops the highest bid first; a rotation ends the
//! current block by carrying out every remaining entry and installing a
//! fresh empty tree for the next one.

use log::debug;
use thiserror::Error;

use crate::CritBitTree;

/// Reasons a queue operation can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue holds the configured maximum number of entries.
    #[error("queue is full")]
    Full,
}

/// Configuration for a [`FeeQueue`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of entries held across all bids.
    pub max_entries: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

/// Fee-ordered queue draining the highest bid first.
pub struct FeeQueue<T> {
    bids: CritBitTree<u64, Vec<T>>,
    entries: usize,
    config: QueueConfig,
}

impl<T> FeeQueue<T> {
    /// Creates a queue with the default configuration.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            bids: CritBitTree::new(),
            entries: 0,
            config,
        }
    }

    /// Number of queued entries across all bids.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Number of distinct bid amounts currently queued.
    #[inline]
    pub fn distinct_bids(&self) -> usize {
        self.bids.len()
    }

    /// Queues `entry` at `bid`. Entries sharing a bid drain in insertion
    /// order.
    pub fn push(&mut self, bid: u64, entry: T) -> Result<(), QueueError> {
        if self.entries >= self.config.max_entries {
            return Err(QueueError::Full);
        }
        if let Ok(bucket) = self.bids.get_mut(bid) {
            bucket.push(entry);
        } else {
            self.bids
                .insert(bid, vec![entry])
                .map_err(|_| QueueError::Full)?;
        }
        self.entries += 1;
        Ok(())
    }

    /// Removes and returns the entry with the greatest bid.
    pub fn pop_highest(&mut self) -> Option<(u64, T)> {
        let bid = self.bids.max_key().ok()?;
        let bucket = self.bids.get_mut(bid).ok()?;
        // Buckets stay short: one slot per entry tied at this exact bid.
        let entry = bucket.remove(0);
        let drained = bucket.is_empty();
        if drained {
            let removed = self.bids.remove(bid);
            debug_assert!(removed.is_ok());
        }
        self.entries -= 1;
        Some((bid, entry))
    }

    /// Ends the current virtual block: drains every queued entry in
    /// descending-bid order and installs a fresh tree for the next block.
    pub fn rotate(&mut self) -> Vec<(u64, T)> {
        let mut tree = std::mem::replace(&mut self.bids, CritBitTree::new());
        let mut drained = Vec::with_capacity(self.entries);
        while let Ok(bid) = tree.max_key() {
            let Ok(bucket) = tree.remove(bid) else { break };
            for entry in bucket {
                drained.push((bid, entry));
            }
        }
        debug!(
            "virtual block rotated: {} entries carried out",
            drained.len()
        );
        self.entries = 0;
        drained
    }
}

impl<T> Default for FeeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drains_highest_bid_first() {
        let mut q: FeeQueue<&str> = FeeQueue::new();
        q.push(300, "c").unwrap();
        q.push(100, "a").unwrap();
        q.push(200, "b").unwrap();
        assert_eq!(q.len(), 3);

        assert_eq!(q.pop_highest(), Some((300, "c")));
        assert_eq!(q.pop_highest(), Some((200, "b")));
        assert_eq!(q.pop_highest(), Some((100, "a")));
        assert_eq!(q.pop_highest(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_tied_bids_share_a_key() {
        let mut q: FeeQueue<u32> = FeeQueue::new();
        q.push(50, 1).unwrap();
        q.push(50, 2).unwrap();
        q.push(75, 3).unwrap();
        q.push(50, 4).unwrap();

        assert_eq!(q.len(), 4);
        assert_eq!(q.distinct_bids(), 2);

        // Ties drain in insertion order, after every higher bid.
        assert_eq!(q.pop_highest(), Some((75, 3)));
        assert_eq!(q.pop_highest(), Some((50, 1)));
        assert_eq!(q.pop_highest(), Some((50, 2)));
        assert_eq!(q.pop_highest(), Some((50, 4)));
        assert_eq!(q.pop_highest(), None);
        assert_eq!(q.distinct_bids(), 0);
    }

    #[test]
    fn test_capacity() {
        let mut q: FeeQueue<u32> = FeeQueue::with_config(QueueConfig { max_entries: 2 });
        q.push(1, 10).unwrap();
        q.push(2, 20).unwrap();
        assert_eq!(q.push(3, 30), Err(QueueError::Full));
        assert_eq!(q.len(), 2);

        // Popping frees capacity again.
        q.pop_highest().unwrap();
        q.push(3, 30).unwrap();
        assert_eq!(q.pop_highest(), Some((3, 30)));
    }

    #[test]
    fn test_rotate_starts_a_fresh_block() {
        let mut q: FeeQueue<&str> = FeeQueue::new();
        q.push(10, "low").unwrap();
        q.push(90, "high").unwrap();
        q.push(90, "high-tie").unwrap();
        q.push(40, "mid").unwrap();

        let carried = q.rotate();
        assert_eq!(
            carried,
            vec![
                (90, "high"),
                (90, "high-tie"),
                (40, "mid"),
                (10, "low"),
            ]
        );
        assert!(q.is_empty());
        assert_eq!(q.pop_highest(), None);

        // The next block starts clean.
        q.push(5, "next").unwrap();
        assert_eq!(q.pop_highest(), Some((5, "next")));
    }

    #[test]
    fn test_rotate_empty_block() {
        let mut q: FeeQueue<u32> = FeeQueue::new();
        assert!(q.rotate().is_empty());
        assert!(q.is_empty());
    }
}
