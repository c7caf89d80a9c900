// Snapshot management for reverse continue

use crate::debuggee::Frame;
use crate::memory::ProcessImage;

/// Errors raised while recording history
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot memory limit exceeded: {current} + {snapshot} > {limit}")]
    LimitExceeded {
        current: usize,
        snapshot: usize,
        limit: usize,
    },
}

/// Process state at one breakpoint stop
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub image: ProcessImage,
    pub frames: Vec<Frame>,
    /// Source line of the breakpoint (1-based)
    pub line: usize,
}

impl Snapshot {
    /// Estimate the memory usage of this snapshot in bytes
    pub fn estimated_size(&self) -> usize {
        // Frames: assume 100 bytes per variable on average
        let frame_size: usize = self
            .frames
            .iter()
            .map(|f| 64 + f.variables.len() * 100)
            .sum();

        self.image.estimated_size() + frame_size
    }
}

/// Recorded stops, navigable in both directions
#[derive(Debug)]
pub struct SnapshotManager {
    snapshots: Vec<Snapshot>,
    max_memory: usize,
    current_memory: usize,
}

impl SnapshotManager {
    pub fn new(max_memory: usize) -> Self {
        SnapshotManager {
            snapshots: Vec::new(),
            max_memory,
            current_memory: 0,
        }
    }

    /// Add a snapshot to history
    pub fn push(&mut self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        let snapshot_size = snapshot.estimated_size();

        if self.current_memory + snapshot_size > self.max_memory {
            return Err(SnapshotError::LimitExceeded {
                current: self.current_memory,
                snapshot: snapshot_size,
                limit: self.max_memory,
            });
        }

        self.current_memory += snapshot_size;
        self.snapshots.push(snapshot);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    pub fn memory_limit(&self) -> usize {
        self.max_memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Region;

    fn snapshot(bytes: usize) -> Snapshot {
        let mut image = ProcessImage::default();
        image.allocate(Region::Heap, bytes, 8).unwrap();
        Snapshot {
            image,
            frames: Vec::new(),
            line: 1,
        }
    }

    #[test]
    fn test_push_within_budget() {
        let mut history = SnapshotManager::new(4096);
        history.push(snapshot(100)).unwrap();
        history.push(snapshot(100)).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.memory_usage(), 2 * (100 + 32));
    }

    #[test]
    fn test_push_past_budget_is_rejected() {
        let mut history = SnapshotManager::new(256);
        history.push(snapshot(100)).unwrap();
        let err = history.push(snapshot(200)).unwrap_err();
        assert_eq!(
            err,
            SnapshotError::LimitExceeded {
                current: 132,
                snapshot: 232,
                limit: 256
            }
        );
        assert_eq!(history.len(), 1);
    }
}
