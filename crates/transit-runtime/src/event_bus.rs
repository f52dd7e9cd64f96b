//! Per-tick output of a registry
//!
//! A system emits lifecycle, pose and status events through its
//! [`SystemContext`](crate::SystemContext) while the scheduler dispatches a
//! tick. The simulation drains each registry's bus after the dispatch and
//! translates the events for the host, so they leave in emission order.

/// Events a registry emitted since the last drain
pub struct EventBus<E> {
    pending: Vec<E>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self { pending: Vec::new() }
    }

    pub fn push(&mut self, event: E) {
        self.pending.push(event);
    }

    /// Hand every pending event over, oldest first
    pub fn drain(&mut self) -> Vec<E> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transit_core::TrainId;

    #[derive(Debug, PartialEq)]
    enum Lifecycle {
        Started(TrainId),
        Stopped(TrainId),
    }

    #[test]
    fn drains_in_emission_order() {
        let mut bus = EventBus::new();
        assert!(bus.is_empty());

        bus.push(Lifecycle::Started("Line.101".into()));
        bus.push(Lifecycle::Started("Line.102".into()));
        bus.push(Lifecycle::Stopped("Line.101".into()));
        assert!(!bus.is_empty());

        assert_eq!(
            bus.drain(),
            vec![
                Lifecycle::Started("Line.101".into()),
                Lifecycle::Started("Line.102".into()),
                Lifecycle::Stopped("Line.101".into()),
            ]
        );
        assert!(bus.is_empty());
    }

    #[test]
    fn next_tick_starts_empty() {
        let mut bus = EventBus::new();
        bus.push(Lifecycle::Stopped("Line.101".into()));
        let _ = bus.drain();
        assert!(bus.drain().is_empty());

        bus.push(Lifecycle::Started("Line.103".into()));
        assert_eq!(bus.drain().len(), 1);
    }
}
