//! Per-orchestrator workers: Ethereum event attestation and batch signing

pub mod batches;
pub mod events;

pub use batches::BatchSigner;
pub use events::{EventPollReport, EventWatcher};

/// Last Ethereum block whose logs have been read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockCursor {
    last_processed: u64,
}

impl BlockCursor {
    pub fn starting_at(last_processed: u64) -> Self {
        Self { last_processed }
    }

    pub fn last_processed(&self) -> u64 {
        self.last_processed
    }

    /// First block not yet read
    pub fn next_block(&self) -> u64 {
        self.last_processed + 1
    }

    /// Move forward; never rewinds
    pub fn advance(&mut self, to_block: u64) {
        self.last_processed = self.last_processed.max(to_block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_only_moves_forward() {
        let mut cursor = BlockCursor::default();
        assert_eq!(cursor.next_block(), 1);
        cursor.advance(10);
        cursor.advance(4);
        assert_eq!(cursor.last_processed(), 10);
        assert_eq!(cursor.next_block(), 11);
    }
}
