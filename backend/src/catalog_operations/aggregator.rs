// aggregator.rs
use super::condition_log::MarkerEvent;
use super::types::{Condition, EntityStatus};

impl EntityStatus {
    /// Fold one decoded marker into this entity.
    ///
    /// Conditions are inserted in timestamp order and the headline fields are
    /// re-derived from the newest one. Heartbeats only move `hb.last_seen`
    /// forward.
    pub fn apply(&mut self, event: MarkerEvent) {
        match event {
            MarkerEvent::Heartbeat(ts) => {
                self.hb.last_seen = self.hb.last_seen.max(ts);
            }
            MarkerEvent::Condition(cond) => self.push_condition(cond),
        }
    }

    pub fn push_condition(&mut self, cond: Condition) {
        self.conditions.insert(cond);
        if let Some(last) = self.conditions.last() {
            self.status = Some(last.status.clone());
            self.last_transition_ts = last.timestamp;
            self.error = last.error.clone();
        }
    }

    /// Builds an entity status from everything discovered for it.
    pub fn from_events(events: impl IntoIterator<Item = MarkerEvent>) -> Self {
        let mut state = Self::default();
        for ev in events {
            state.apply(ev);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_operations::types::Status;

    fn cond(ts: i64, status: &str) -> MarkerEvent {
        MarkerEvent::Condition(Condition { timestamp: ts, status: status.into(), error: None })
    }

    fn err(ts: i64, msg: &str) -> MarkerEvent {
        MarkerEvent::Condition(Condition {
            timestamp: ts,
            status: Status::Error,
            error: Some(msg.to_string()),
        })
    }

    #[test]
    fn newer_condition_takes_over() {
        let mut st = EntityStatus::from_events([cond(10, "starting"), cond(20, "running")]);
        assert_eq!(st.status, Some(Status::Running));

        st.apply(err(30, "oplog gap"));
        assert_eq!(st.conditions.len(), 3);
        assert_eq!(st.status, Some(Status::Error));
        assert_eq!(st.last_transition_ts, 30);
        assert_eq!(st.error.as_deref(), Some("oplog gap"));
    }

    #[test]
    fn older_condition_is_recorded_but_not_current() {
        let mut st = EntityStatus::from_events([cond(10, "starting"), cond(20, "done")]);
        st.apply(err(15, "transient"));

        assert_eq!(st.conditions.len(), 3);
        assert_eq!(st.status, Some(Status::Done));
        assert_eq!(st.last_transition_ts, 20);
        assert_eq!(st.error, None);
        assert_eq!(st.conditions.iter().nth(1).map(|c| c.timestamp), Some(15));
    }

    #[test]
    fn discovery_order_does_not_matter_for_headline() {
        let a = EntityStatus::from_events([cond(1, "starting"), cond(3, "done"), cond(2, "running")]);
        let b = EntityStatus::from_events([cond(3, "done"), cond(2, "running"), cond(1, "starting")]);
        assert_eq!(a, b);
    }

    #[test]
    fn heartbeat_never_touches_conditions() {
        let mut st = EntityStatus::from_events([cond(10, "running")]);
        st.apply(MarkerEvent::Heartbeat(99));
        st.apply(MarkerEvent::Heartbeat(50));

        assert_eq!(st.hb.last_seen, 99);
        assert_eq!(st.conditions.len(), 1);
        assert_eq!(st.status, Some(Status::Running));
        assert_eq!(st.last_transition_ts, 10);
    }

    #[test]
    fn heartbeat_alone_leaves_status_unset() {
        let st = EntityStatus::from_events([MarkerEvent::Heartbeat(7)]);
        assert_eq!(st.status, None);
        assert!(st.conditions.is_empty());
        assert_eq!(st.hb.last_seen, 7);
    }

    #[test]
    fn same_input_same_result() {
        let events = vec![cond(5, "running"), err(5, "boom"), MarkerEvent::Heartbeat(6)];
        let a = EntityStatus::from_events(events.clone());
        let b = EntityStatus::from_events(events);
        assert_eq!(a, b);
        // tie at ts=5: the later-discovered condition wins
        assert_eq!(a.status, Some(Status::Error));
    }
}
