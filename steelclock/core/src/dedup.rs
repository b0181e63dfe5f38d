//! Frame Deduplicator
//!
//! Remembers the last frame the gateway accepted so unchanged frames are not
//! resent every tick.
//!
//! The render loop is the only writer; diagnostics may read concurrently
//! through [`FrameDeduplicator::last_sent`].

use parking_lot::RwLock;

use crate::bitmap::FrameMap;

/// Byte-equality filter over encoded frames
#[derive(Debug)]
pub struct FrameDeduplicator {
    enabled: bool,
    history: RwLock<FrameMap>,
}

impl FrameDeduplicator {
    /// Create a deduplicator
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            history: RwLock::new(FrameMap::new()),
        }
    }

    /// Whether filtering is active
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True if any entry of `current` differs from what was last sent
    ///
    /// Always true when disabled, and on the first call after construction
    /// or [`reset`](Self::reset).
    #[must_use]
    pub fn has_changed(&self, current: &FrameMap) -> bool {
        if !self.enabled {
            return true;
        }
        let history = self.history.read();
        if history.is_empty() {
            return true;
        }
        current
            .iter()
            .any(|(key, bytes)| history.get(key) != Some(bytes))
    }

    /// Remember a deep copy of `current`; no-op when disabled
    pub fn update(&self, current: &FrameMap) {
        if !self.enabled {
            return;
        }
        let mut history = self.history.write();
        for (key, bytes) in current {
            history.insert(key.clone(), bytes.clone());
        }
    }

    /// Forget everything, so the next frame is always sent
    pub fn reset(&self) {
        self.history.write().clear();
    }

    /// Snapshot of the remembered frames
    #[must_use]
    pub fn last_sent(&self) -> FrameMap {
        self.history.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::frame_map;

    const KEY: &str = "image-data-128x40";

    #[test]
    fn test_fresh_then_unchanged_then_changed() {
        let dedup = FrameDeduplicator::new(true);
        let frame = frame_map(KEY, vec![1, 2, 3]);
        assert!(dedup.has_changed(&frame));

        dedup.update(&frame);
        assert!(!dedup.has_changed(&frame));

        let other = frame_map(KEY, vec![1, 2, 4]);
        assert!(dedup.has_changed(&other));
    }

    #[test]
    fn test_update_stores_a_copy() {
        let dedup = FrameDeduplicator::new(true);
        let mut frame = frame_map(KEY, vec![0; 4]);
        dedup.update(&frame);

        frame.get_mut(KEY).unwrap()[0] = 9;
        assert!(dedup.has_changed(&frame));
        assert_eq!(dedup.last_sent()[KEY], vec![0; 4]);
    }

    #[test]
    fn test_disabled_always_changed() {
        let dedup = FrameDeduplicator::new(false);
        let frame = frame_map(KEY, vec![7]);
        dedup.update(&frame);
        assert!(dedup.has_changed(&frame));
        assert!(dedup.last_sent().is_empty());
    }

    #[test]
    fn test_reset() {
        let dedup = FrameDeduplicator::new(true);
        let frame = frame_map(KEY, vec![7]);
        dedup.update(&frame);
        dedup.reset();
        assert!(dedup.has_changed(&frame));
    }

    #[test]
    fn test_new_key_counts_as_change() {
        let dedup = FrameDeduplicator::new(true);
        dedup.update(&frame_map(KEY, vec![1]));
        let mut both = frame_map(KEY, vec![1]);
        both.insert("image-data-128x52".to_string(), vec![1]);
        assert!(dedup.has_changed(&both));
    }
}
