//! The admin adjacency map and the notification templates tied to each status.
//!
//! Admins may only move a group buy one hop at a time. Automatic transitions (threshold crossing, expiry, refund
//! completion) do not go through this map.
use crate::{
    db_types::GroupBuyStatus::{self, *},
    gbe_api::errors::GroupBuyError,
};

pub const TEMPLATE_EXPIRING_SOON: &str = "expiring_soon";
pub const TEMPLATE_EXPIRED_SUCCESSFUL: &str = "expired_successful";
pub const TEMPLATE_EXPIRED_FAILED: &str = "expired_failed";
pub const TEMPLATE_NEEDS_MANUAL_REVIEW: &str = "needs_manual_review";
pub const TEMPLATE_GROUP_SECURED: &str = "group_secured";

/// The states an admin may move a group buy to from `from`.
pub fn allowed_transitions(from: GroupBuyStatus) -> &'static [GroupBuyStatus] {
    match from {
        Active => &[],
        Successful => &[Secured, Failed],
        Secured => &[Processing, Packaging, ReadyForPickup, Delivered],
        Processing => &[Packaging, ReadyForPickup, Delivered],
        Packaging => &[ReadyForPickup, Delivered],
        ReadyForPickup => &[Delivered],
        Delivered => &[],
        ManualReview => &[Secured, Failed],
        Failed => &[],
        Refunded => &[],
    }
}

pub fn validate_transition(from: GroupBuyStatus, to: GroupBuyStatus) -> Result<(), GroupBuyError> {
    let allowed = allowed_transitions(from);
    if allowed.contains(&to) {
        Ok(())
    } else {
        Err(GroupBuyError::InvalidTransition { from, to, allowed: allowed.to_vec() })
    }
}

/// The template that participants receive when a group buy enters `status`, for the statuses that customers are told
/// about.
pub fn notification_template(status: GroupBuyStatus) -> Option<&'static str> {
    match status {
        Secured => Some(TEMPLATE_GROUP_SECURED),
        Processing => Some("group_processing"),
        Packaging => Some("group_packaging"),
        ReadyForPickup => Some("group_ready_for_pickup"),
        Delivered => Some("group_delivered"),
        Failed => Some("group_failed"),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn active_has_no_admin_exits() {
        let err = validate_transition(Active, Delivered).unwrap_err();
        assert_eq!(err, GroupBuyError::InvalidTransition { from: Active, to: Delivered, allowed: vec![] });
        assert!(validate_transition(Active, Failed).is_err());
    }

    #[test]
    fn fulfillment_chain_only_moves_forward() {
        for status in GroupBuyStatus::ALL {
            for next in allowed_transitions(status) {
                if let (Some(a), Some(b)) = (status.chain_rank(), next.chain_rank()) {
                    assert!(b > a, "{status} -> {next} goes backwards");
                }
            }
        }
        assert!(validate_transition(Packaging, Processing).is_err());
        assert!(validate_transition(Secured, Delivered).is_ok());
    }

    #[test]
    fn refunded_is_never_an_admin_target() {
        for status in GroupBuyStatus::ALL {
            assert!(!allowed_transitions(status).contains(&Refunded));
            assert!(!allowed_transitions(status).contains(&Active));
        }
    }

    #[test]
    fn manual_review_can_be_approved_or_rejected() {
        assert!(validate_transition(ManualReview, Secured).is_ok());
        assert!(validate_transition(ManualReview, Failed).is_ok());
        assert!(validate_transition(ManualReview, Successful).is_err());
    }

    #[test]
    fn customer_facing_statuses_have_templates() {
        assert_eq!(notification_template(ReadyForPickup), Some("group_ready_for_pickup"));
        assert_eq!(notification_template(Failed), Some("group_failed"));
        assert_eq!(notification_template(ManualReview), None);
        assert_eq!(notification_template(Refunded), None);
    }
}
