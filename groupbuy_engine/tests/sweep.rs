use chrono::Duration;
use groupbuy_engine::{
    db_types::{GroupBuyStatus, Money, NewOrder, NewOrderItem, OrderId, SYSTEM_ACTOR},
    transitions::{
        TEMPLATE_EXPIRED_FAILED,
        TEMPLATE_EXPIRED_SUCCESSFUL,
        TEMPLATE_EXPIRING_SOON,
        TEMPLATE_NEEDS_MANUAL_REVIEW,
    },
};

mod support;
use support::engine::{setup, Engine};

#[tokio::test]
async fn expired_short_of_threshold_goes_to_manual_review() {
    let engine = setup().await;
    let group = engine.open("tent", 20, 2).await;
    engine.join(group.id, "alice", 5).await;
    engine.join(group.id, "bob", 7).await;

    let report = engine.sweep.sweep_tick_at(Engine::just_after(&group)).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.finalized, vec![group.id]);
    assert!(report.errors.is_empty());

    let group = engine.fetch(group.id).await;
    assert_eq!(group.status, GroupBuyStatus::ManualReview);
    assert_eq!(group.units_sold, 12);
    assert!(group.finalized_at.is_some());
    let entry = group.admin_status_history.last().unwrap();
    assert_eq!(entry.status, GroupBuyStatus::ManualReview);
    assert_eq!(entry.changed_by, SYSTEM_ACTOR);
    assert_eq!(entry.notes, "Expired with 12/20 units");
    assert!(entry.notification_sent);

    assert_eq!(engine.hooks.wait_for(TEMPLATE_EXPIRED_FAILED, 2).await.len(), 2);
    assert_eq!(engine.hooks.with_template(TEMPLATE_NEEDS_MANUAL_REVIEW).len(), 2);

    // Nothing is left to do on the next tick
    let report = engine.sweep.sweep_tick_at(Engine::just_after(&group)).await.unwrap();
    assert_eq!(report.processed, 0);
}

#[tokio::test]
async fn sweep_never_sends_a_full_group_to_review() {
    let engine = setup().await;
    let group = engine.open("stove", 10, 2).await;
    engine.join(group.id, "alice", 4).await;
    engine.join(group.id, "bob", 6).await;
    // The join already flipped it. Put it back to active to model a row that reached its units without the flip.
    engine.force_status(group.id, "active").await;

    let report = engine.sweep.sweep_tick_at(Engine::just_after(&group)).await.unwrap();
    assert_eq!(report.finalized, vec![group.id]);
    let group = engine.fetch(group.id).await;
    assert_eq!(group.status, GroupBuyStatus::Successful);
    assert!(group.admin_status_history.iter().all(|e| e.status != GroupBuyStatus::ManualReview));
    assert_eq!(engine.hooks.wait_for(TEMPLATE_EXPIRED_SUCCESSFUL, 2).await.len(), 2);
}

#[tokio::test]
async fn overlapping_sweeps_finalize_once() {
    let engine = setup().await;
    let group = engine.open("lantern", 20, 2).await;
    engine.join(group.id, "alice", 2).await;
    let now = Engine::just_after(&group);
    let (a, b, c) = tokio::join!(
        engine.sweep.sweep_tick_at(now),
        engine.sweep.sweep_tick_at(now),
        engine.sweep.sweep_tick_at(now)
    );
    let finalized = [a.unwrap(), b.unwrap(), c.unwrap()].iter().map(|r| r.finalized.len()).sum::<usize>();
    assert_eq!(finalized, 1);
    let group = engine.fetch(group.id).await;
    let reviews = group.admin_status_history.iter().filter(|e| e.status == GroupBuyStatus::ManualReview).count();
    assert_eq!(reviews, 1);
    assert_eq!(engine.hooks.wait_for(TEMPLATE_EXPIRED_FAILED, 1).await.len(), 1);
}

#[tokio::test]
async fn only_the_tightest_reminder_is_sent() {
    let engine = setup().await;
    let group = engine.open("stool", 20, 24).await;
    engine.join(group.id, "alice", 1).await;
    engine.join(group.id, "bob", 1).await;

    // Far from the deadline nothing happens
    let report = engine.sweep.sweep_tick_at(group.expires_at - Duration::hours(12)).await.unwrap();
    assert!(report.expiring_notified.is_empty());

    // First seen with 30 minutes left: one "1h" reminder each, not three
    let now = group.expires_at - Duration::minutes(30);
    let report = engine.sweep.sweep_tick_at(now).await.unwrap();
    assert_eq!(report.expiring_notified, vec![group.id]);
    let reminders = engine.hooks.wait_for(TEMPLATE_EXPIRING_SOON, 2).await;
    assert_eq!(reminders.len(), 2);
    assert!(reminders.iter().all(|r| r.payload["threshold"] == "1h"));

    let group = engine.fetch(group.id).await;
    assert!(group.notified_6h && group.notified_2h && group.notified_1h);
    let report = engine.sweep.sweep_tick_at(now + Duration::minutes(5)).await.unwrap();
    assert!(report.expiring_notified.is_empty());
    engine.hooks.settle().await;
    assert_eq!(engine.hooks.with_template(TEMPLATE_EXPIRING_SOON).len(), 2);
}

#[tokio::test]
async fn each_reminder_window_fires_once() {
    let engine = setup().await;
    let group = engine.open("bench", 20, 24).await;
    engine.join(group.id, "alice", 1).await;

    let mut sent = 0;
    for (hours_left, expect) in [(5, true), (4, false), (2, true), (1, true), (1, false)] {
        let now = group.expires_at - Duration::hours(hours_left) + Duration::seconds(1);
        let report = engine.sweep.sweep_tick_at(now).await.unwrap();
        assert_eq!(!report.expiring_notified.is_empty(), expect, "{hours_left}h left");
        if expect {
            sent += 1;
        }
    }
    let reminders = engine.hooks.wait_for(TEMPLATE_EXPIRING_SOON, sent).await;
    let mut thresholds =
        reminders.iter().map(|r| r.payload["threshold"].as_str().unwrap().to_string()).collect::<Vec<_>>();
    // Handlers may record out of order
    thresholds.sort();
    assert_eq!(thresholds, vec!["1h", "2h", "6h"]);
}

#[tokio::test]
async fn one_bad_group_does_not_stop_the_batch() {
    let engine = setup().await;
    let good = engine.open("rope", 2, 2).await;
    let bad = engine.open("net", 2, 2).await;
    engine.join(good.id, "alice", 2).await;
    engine.join(bad.id, "bob", 2).await;
    let order =
        NewOrder::new(OrderId::from("net-1"), "bob").with_item(NewOrderItem::new("net", 2, Money::from(500), bad.id));
    engine.orders.place_order(order).await.unwrap();
    engine.force_status(good.id, "active").await;
    engine.force_status(bad.id, "active").await;
    // An order row the engine cannot decode makes the order sync for `bad` fail
    sqlx::query("UPDATE order_items SET group_buy_status = 'bogus' WHERE group_buy_id = $1")
        .bind(bad.id.value())
        .execute(engine.db.pool())
        .await
        .unwrap();

    let report = engine.sweep.sweep_tick_at(Engine::just_after(&bad)).await.unwrap();
    assert_eq!(report.processed, 2);
    // `bad` was committed as successful before its orders failed to sync, so it still counts as finalized
    assert_eq!(report.finalized, vec![good.id, bad.id]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].group_buy_id, bad.id);
    assert!(report.errors[0].reason.starts_with("Order sync failed after finalizing"));
    assert_eq!(engine.fetch(good.id).await.status, GroupBuyStatus::Successful);
    assert_eq!(engine.fetch(bad.id).await.status, GroupBuyStatus::Successful);

    // The next tick has nothing left to finalize
    let report = engine.sweep.sweep_tick_at(Engine::just_after(&bad)).await.unwrap();
    assert_eq!(report.processed, 0);
    assert!(report.finalized.is_empty());
}
