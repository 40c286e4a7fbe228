//! Notification relay tests
//!
//! Covers the transition-to-notification mapping, the per-user push channel
//! naming, and the exactly-one-row-per-committed-transition rule simulated
//! over an in-memory feed.

use uuid::Uuid;

use shared::models::{NotificationKind, UserRole};

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            NotificationKind::Placed,
            NotificationKind::Invoiced,
            NotificationKind::Verified,
            NotificationKind::DisputeOpened,
            NotificationKind::Reinvoice,
            NotificationKind::ConnectionRequested,
        ] {
            assert_eq!(NotificationKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert_eq!(NotificationKind::from_str("order_shipped"), None);
    }

    #[test]
    fn test_push_channel_naming() {
        // Channel is {role}_{user_id}, one channel per user per role
        let user_id = Uuid::nil();
        let channel = format!("{}_{}", UserRole::Retailer.as_str(), user_id);
        assert_eq!(
            channel,
            "retailer_00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_transition_recipients() {
        // Order transitions notify the counterparty, never the actor
        let recipient_for = |kind: NotificationKind| match kind {
            NotificationKind::Placed
            | NotificationKind::Cancelled
            | NotificationKind::Verified
            | NotificationKind::DisputeOpened
            | NotificationKind::ConnectionRequested => UserRole::Distributor,
            NotificationKind::Accepted
            | NotificationKind::Rejected
            | NotificationKind::Invoiced
            | NotificationKind::Reinvoice
            | NotificationKind::DisputeResolved
            | NotificationKind::ConnectionAccepted
            | NotificationKind::ConnectionRejected => UserRole::Retailer,
        };

        assert_eq!(recipient_for(NotificationKind::Placed), UserRole::Distributor);
        assert_eq!(recipient_for(NotificationKind::Invoiced), UserRole::Retailer);
        assert_eq!(recipient_for(NotificationKind::Verified), UserRole::Distributor);
    }
}

// ============================================================================
// Feed Simulation
// ============================================================================

#[cfg(test)]
mod feed_simulation {
    use super::*;

    struct Feed {
        rows: Vec<(Uuid, NotificationKind, bool)>,
    }

    impl Feed {
        fn new() -> Self {
            Self { rows: Vec::new() }
        }

        /// A transition either commits with exactly one notification row or
        /// aborts with none
        fn transition(&mut self, user_id: Uuid, kind: NotificationKind, commit: bool) {
            if commit {
                self.rows.push((user_id, kind, false));
            }
        }

        fn unread_count(&self, user_id: Uuid) -> usize {
            self.rows
                .iter()
                .filter(|(u, _, read)| *u == user_id && !read)
                .count()
        }

        fn mark_read(&mut self, user_id: Uuid, index: usize) -> Result<(), &'static str> {
            match self.rows.get_mut(index) {
                Some((u, _, read)) if *u == user_id => {
                    *read = true;
                    Ok(())
                }
                // Someone else's notification reads as missing
                _ => Err("not found"),
            }
        }

        fn mark_all_read(&mut self, user_id: Uuid) -> usize {
            let mut changed = 0;
            for (u, _, read) in &mut self.rows {
                if *u == user_id && !*read {
                    *read = true;
                    changed += 1;
                }
            }
            changed
        }
    }

    #[test]
    fn test_committed_transition_has_one_row() {
        let mut feed = Feed::new();
        let distributor = Uuid::new_v4();

        feed.transition(distributor, NotificationKind::Placed, true);
        assert_eq!(feed.unread_count(distributor), 1);
    }

    #[test]
    fn test_aborted_transition_has_no_row() {
        let mut feed = Feed::new();
        let distributor = Uuid::new_v4();

        feed.transition(distributor, NotificationKind::Placed, false);
        assert_eq!(feed.unread_count(distributor), 0);
    }

    #[test]
    fn test_mark_read_scoped_to_recipient() {
        let mut feed = Feed::new();
        let distributor = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        feed.transition(distributor, NotificationKind::Placed, true);

        assert_eq!(feed.mark_read(stranger, 0), Err("not found"));
        assert_eq!(feed.unread_count(distributor), 1);

        assert!(feed.mark_read(distributor, 0).is_ok());
        assert_eq!(feed.unread_count(distributor), 0);
    }

    #[test]
    fn test_mark_all_read_reports_changed_rows() {
        let mut feed = Feed::new();
        let retailer = Uuid::new_v4();

        feed.transition(retailer, NotificationKind::Accepted, true);
        feed.transition(retailer, NotificationKind::Invoiced, true);
        feed.mark_read(retailer, 0).unwrap();

        assert_eq!(feed.mark_all_read(retailer), 1);
        assert_eq!(feed.unread_count(retailer), 0);

        // Idempotent: nothing left to change
        assert_eq!(feed.mark_all_read(retailer), 0);
    }

    #[test]
    fn test_full_order_flow_notification_trail() {
        // place -> confirm -> invoice -> verify leaves two notifications on
        // each side
        let mut feed = Feed::new();
        let retailer = Uuid::new_v4();
        let distributor = Uuid::new_v4();

        feed.transition(distributor, NotificationKind::Placed, true);
        feed.transition(retailer, NotificationKind::Accepted, true);
        feed.transition(retailer, NotificationKind::Invoiced, true);
        feed.transition(distributor, NotificationKind::Verified, true);

        assert_eq!(feed.unread_count(distributor), 2);
        assert_eq!(feed.unread_count(retailer), 2);
    }
}
