//! Leave-list consumer: the per-page wiring pattern for entity-scoped live
//! updates.
//!
//! On data load the view joins one room per visible leave and registers its
//! own listeners; inbound events only ever touch this view's local state, so
//! duplicate subscriptions across simultaneously mounted views are harmless.
//! On unmount it unsubscribes and leaves exactly the rooms it joined.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::hub::{EventHub, ToastLevel, ToastSink};
use crate::models::{Leave, LeaveStatus, LeaveStatusChange};
use crate::transport::Subscription;

/// Local list state recomputed on every merge.
#[derive(Debug, Clone, Default)]
pub struct LeaveListState {
    pub leaves: Vec<Leave>,
    pub status_counts: HashMap<LeaveStatus, usize>,
    /// Ids flashed as "recently updated"; cleared after the highlight TTL.
    pub highlighted: HashSet<String>,
}

pub struct LeaveListView {
    hub: EventHub,
    toasts: Arc<dyn ToastSink>,
    highlight_ttl: Duration,
    state: Arc<Mutex<LeaveListState>>,
    joined: Mutex<Vec<String>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl LeaveListView {
    pub fn new(hub: EventHub, toasts: Arc<dyn ToastSink>, highlight_ttl: Duration) -> Self {
        Self {
            hub,
            toasts,
            highlight_ttl,
            state: Arc::new(Mutex::new(LeaveListState::default())),
            joined: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Adopt loaded data: join a room per leave and wire the listeners.
    pub fn load(&self, leaves: Vec<Leave>) {
        {
            let mut joined = self.joined.lock().expect("view lock poisoned");
            for leave in &leaves {
                if !joined.contains(&leave.id) {
                    self.hub.join_leave_room(&leave.id);
                    joined.push(leave.id.clone());
                }
            }
        }
        {
            let mut state = self.state.lock().expect("view lock poisoned");
            state.leaves = leaves;
            state.status_counts = count_by_status(&state.leaves);
        }

        let mut subs = self.subscriptions.lock().expect("view lock poisoned");
        if !subs.is_empty() {
            return;
        }

        let state = Arc::clone(&self.state);
        let toasts = Arc::clone(&self.toasts);
        let ttl = self.highlight_ttl;
        subs.push(self.hub.on_leave_status_changed(move |change| {
            apply_status_change(&state, &toasts, ttl, change);
        }));

        let state = Arc::clone(&self.state);
        let toasts = Arc::clone(&self.toasts);
        subs.push(self.hub.on_leave_deleted(move |deleted| {
            let mut s = state.lock().expect("view lock poisoned");
            let before = s.leaves.len();
            s.leaves.retain(|l| l.id != deleted.leave_id);
            if s.leaves.len() != before {
                s.highlighted.remove(&deleted.leave_id);
                s.status_counts = count_by_status(&s.leaves);
                toasts.toast(ToastLevel::Info, &format!("Leave {} was removed", deleted.leave_id));
            }
        }));
    }

    pub fn snapshot(&self) -> LeaveListState {
        self.state.lock().expect("view lock poisoned").clone()
    }

    /// Ids of the rooms this view currently holds.
    pub fn joined_rooms(&self) -> Vec<String> {
        self.joined.lock().expect("view lock poisoned").clone()
    }

    /// Unsubscribe the listeners and leave every previously joined room.
    pub fn unmount(&self) {
        let subs: Vec<Subscription> = self
            .subscriptions
            .lock()
            .expect("view lock poisoned")
            .drain(..)
            .collect();
        for sub in subs {
            sub.unsubscribe();
        }
        let joined: Vec<String> = self
            .joined
            .lock()
            .expect("view lock poisoned")
            .drain(..)
            .collect();
        for id in joined {
            self.hub.leave_leave_room(&id);
        }
    }
}

/// Merge a status change into the local list; events for leaves this view
/// does not hold are ignored.
fn apply_status_change(
    state: &Arc<Mutex<LeaveListState>>,
    toasts: &Arc<dyn ToastSink>,
    highlight_ttl: Duration,
    change: &LeaveStatusChange,
) {
    let applied = {
        let mut s = state.lock().expect("view lock poisoned");
        match s.leaves.iter_mut().find(|l| l.id == change.leave_id) {
            Some(leave) => {
                leave.status = change.new_status;
                if change.remarks.is_some() {
                    leave.remarks = change.remarks.clone();
                }
                s.status_counts = count_by_status(&s.leaves);
                s.highlighted.insert(change.leave_id.clone());
                true
            }
            None => {
                debug!(leave_id = %change.leave_id, "status change for leave not held locally");
                false
            }
        }
    };
    if !applied {
        return;
    }

    let state = Arc::clone(state);
    let leave_id = change.leave_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(highlight_ttl).await;
        state
            .lock()
            .expect("view lock poisoned")
            .highlighted
            .remove(&leave_id);
    });

    let level = match change.new_status {
        LeaveStatus::Approved => ToastLevel::Success,
        LeaveStatus::Rejected => ToastLevel::Error,
        LeaveStatus::Pending | LeaveStatus::Cancelled => ToastLevel::Info,
    };
    toasts.toast(
        level,
        &format!("Leave {} is now {:?}", change.leave_id, change.new_status),
    );
}

fn count_by_status(leaves: &[Leave]) -> HashMap<LeaveStatus, usize> {
    let mut counts = HashMap::new();
    for leave in leaves {
        *counts.entry(leave.status).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::notifier::test_support::RecordingToastSink;
    use chrono::NaiveDate;

    fn leave(id: &str, status: LeaveStatus) -> Leave {
        Leave {
            id: id.to_string(),
            employee: "alice".to_string(),
            leave_type: "annual".to_string(),
            status,
            from_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            to_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            reason: "vacation".to_string(),
            remarks: None,
        }
    }

    fn change(id: &str, from: LeaveStatus, to: LeaveStatus) -> LeaveStatusChange {
        LeaveStatusChange {
            leave_id: id.to_string(),
            old_status: from,
            new_status: to,
            remarks: Some("reviewed".to_string()),
        }
    }

    fn view(ttl: Duration) -> (LeaveListView, Arc<RecordingToastSink>) {
        let toasts = Arc::new(RecordingToastSink::default());
        let view = LeaveListView::new(
            EventHub::detached(),
            Arc::clone(&toasts) as Arc<dyn ToastSink>,
            ttl,
        );
        (view, toasts)
    }

    #[tokio::test]
    async fn merge_updates_status_counts_and_highlight() {
        let (view, toasts) = view(Duration::from_millis(30));
        view.load(vec![leave("L1", LeaveStatus::Pending), leave("L2", LeaveStatus::Pending)]);

        apply_status_change(
            &view.state,
            &view.toasts,
            view.highlight_ttl,
            &change("L1", LeaveStatus::Pending, LeaveStatus::Approved),
        );

        let snap = view.snapshot();
        assert_eq!(snap.leaves.iter().find(|l| l.id == "L1").unwrap().status, LeaveStatus::Approved);
        assert_eq!(snap.status_counts.get(&LeaveStatus::Approved), Some(&1));
        assert_eq!(snap.status_counts.get(&LeaveStatus::Pending), Some(&1));
        assert!(snap.highlighted.contains("L1"));
        assert_eq!(toasts.messages.lock().unwrap().len(), 1);

        // Highlight clears after the TTL.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!view.snapshot().highlighted.contains("L1"));
    }

    #[tokio::test]
    async fn events_for_unheld_leaves_are_ignored() {
        let (view, toasts) = view(Duration::from_millis(30));
        view.load(vec![leave("L1", LeaveStatus::Pending)]);

        apply_status_change(
            &view.state,
            &view.toasts,
            view.highlight_ttl,
            &change("L9", LeaveStatus::Pending, LeaveStatus::Approved),
        );

        assert!(view.snapshot().highlighted.is_empty());
        assert!(toasts.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unmount_leaves_exactly_the_joined_rooms() {
        let (view, _) = view(Duration::from_millis(30));
        view.load(vec![leave("L1", LeaveStatus::Pending), leave("L2", LeaveStatus::Approved)]);
        assert_eq!(view.joined_rooms(), vec!["L1".to_string(), "L2".to_string()]);

        // Loading again with an overlapping set joins only the new id.
        view.load(vec![leave("L1", LeaveStatus::Pending), leave("L3", LeaveStatus::Pending)]);
        assert_eq!(
            view.joined_rooms(),
            vec!["L1".to_string(), "L2".to_string(), "L3".to_string()]
        );

        view.unmount();
        assert!(view.joined_rooms().is_empty());
    }

    #[tokio::test]
    async fn remarks_are_kept_when_change_has_none() {
        let (view, _) = view(Duration::from_millis(30));
        let mut l = leave("L1", LeaveStatus::Pending);
        l.remarks = Some("initial".to_string());
        view.load(vec![l]);

        let mut c = change("L1", LeaveStatus::Pending, LeaveStatus::Rejected);
        c.remarks = None;
        apply_status_change(&view.state, &view.toasts, view.highlight_ttl, &c);

        let snap = view.snapshot();
        assert_eq!(snap.leaves[0].remarks.as_deref(), Some("initial"));
        assert_eq!(snap.leaves[0].status, LeaveStatus::Rejected);
    }
}
