//! End-to-end rider flows through the lifecycle service against an
//! in-memory backend.

mod common;

use std::time::Duration;

use common::{app_with, drain, failures, status_changes, FakeOrderApi};
use order_lifecycle::{
    GuardError, LifecycleError, LifecycleOperations, OrderId, OrderSnapshot, OrderStatus, OrderType, OtpStage,
    PaymentMethod,
};

const INTERVAL: Duration = Duration::from_secs(3);

#[tokio::test]
async fn taxi_ride_walkthrough() {
    let api = FakeOrderApi::new(OrderStatus::Pending);
    api.set_otp("482913");
    let (state, mut events) = app_with(api.clone(), INTERVAL).await;
    let service = state.lifecycle_service.clone();
    let id = OrderId::new("42");

    state
        .cache
        .insert(OrderSnapshot::new("42", OrderType::Taxi, PaymentMethod::Cash))
        .await;

    let order = service.accept(&id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Accepted);

    let err = service.mark_picked_up(&id, None).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Guard(GuardError::OtpRequired(OtpStage::Pickup))));
    assert_eq!(service.snapshot(&id).await.unwrap().status, OrderStatus::Accepted);
    assert_eq!(api.update_calls(), 1, "guard failure must not reach the backend");

    let order = service.mark_picked_up(&id, Some("482913")).await.unwrap();
    assert_eq!(order.status, OrderStatus::OutForDelivery);
    assert!(order.pickup_otp_verified);

    let order = service.mark_delivered(&id, None).await.unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);

    let err = service.cancel(&id, "changed my mind").await.unwrap_err();
    assert!(matches!(err, LifecycleError::Guard(GuardError::Terminal(OrderStatus::Delivered))));
    assert_eq!(api.remote_status(), OrderStatus::Delivered);

    let events = drain(&mut events);
    assert_eq!(
        status_changes(&events),
        vec![
            (OrderStatus::Pending, OrderStatus::Accepted),
            (OrderStatus::Accepted, OrderStatus::OutForDelivery),
            (OrderStatus::OutForDelivery, OrderStatus::Delivered),
        ]
    );
    assert_eq!(failures(&events).len(), 2);
}

#[tokio::test]
async fn wrong_otp_keeps_state_and_allows_retries() {
    let api = FakeOrderApi::new(OrderStatus::Accepted);
    api.set_otp("111222");
    let (state, mut events) = app_with(api.clone(), INTERVAL).await;
    let service = state.lifecycle_service.clone();
    let id = OrderId::new("porter-9");

    state
        .cache
        .insert(OrderSnapshot::new("porter-9", OrderType::Porter, PaymentMethod::Upi).with_status(OrderStatus::Accepted))
        .await;

    for _ in 0..3 {
        let err = service.mark_picked_up(&id, Some("999999")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::OtpRejected(ref msg) if msg == "Invalid OTP"));
    }
    let snapshot = service.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.status, OrderStatus::Accepted);
    assert!(!snapshot.pickup_otp_verified);
    assert_eq!(api.update_calls(), 0);

    let snapshot = service.mark_picked_up(&id, Some("111222")).await.unwrap();
    assert_eq!(snapshot.status, OrderStatus::OutForDelivery);
    assert_eq!(api.otp_calls(), 4);

    let events = drain(&mut events);
    assert_eq!(failures(&events), vec!["Invalid OTP"; 3]);
}

#[tokio::test]
async fn malformed_otp_never_reaches_backend() {
    let api = FakeOrderApi::new(OrderStatus::Accepted);
    let (state, _events) = app_with(api.clone(), INTERVAL).await;
    let service = state.lifecycle_service.clone();
    let id = OrderId::new("77");

    state
        .cache
        .insert(OrderSnapshot::new("77", OrderType::Taxi, PaymentMethod::Cash).with_status(OrderStatus::Accepted))
        .await;

    let err = service.mark_picked_up(&id, Some("12 34")).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidOtpFormat));
    let err = service.verify_otp(&id, OtpStage::Pickup, "abcdef").await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidOtpFormat));
    assert_eq!(api.otp_calls(), 0);
}

#[tokio::test]
async fn standalone_verification_unlocks_pickup() {
    let api = FakeOrderApi::new(OrderStatus::Accepted);
    api.set_otp("654321");
    let (state, _events) = app_with(api.clone(), INTERVAL).await;
    let service = state.lifecycle_service.clone();
    let id = OrderId::new("ride-5");

    state
        .cache
        .insert(OrderSnapshot::new("ride-5", OrderType::Taxi, PaymentMethod::Wallet).with_status(OrderStatus::Accepted))
        .await;

    let snapshot = service.verify_otp(&id, OtpStage::Pickup, "654321").await.unwrap();
    assert!(snapshot.pickup_otp_verified);

    // Verified once; a second verification is answered locally.
    service.verify_otp(&id, OtpStage::Pickup, "654321").await.unwrap();
    assert_eq!(api.otp_calls(), 1);

    let snapshot = service.mark_picked_up(&id, None).await.unwrap();
    assert_eq!(snapshot.status, OrderStatus::OutForDelivery);

    let requests = api.otp_requests.lock().unwrap();
    assert_eq!(requests[0].stage, OtpStage::Pickup);
    assert_eq!(requests[0].order_type, OrderType::Taxi);
}

#[tokio::test]
async fn cod_order_needs_collection_before_delivery() {
    let api = FakeOrderApi::new(OrderStatus::OutForDelivery);
    let (state, mut events) = app_with(api.clone(), INTERVAL).await;
    let service = state.lifecycle_service.clone();
    let id = OrderId::new("food-3");

    state
        .cache
        .insert(
            OrderSnapshot::new("food-3", OrderType::Food, PaymentMethod::Cod)
                .with_status(OrderStatus::OutForDelivery)
                .with_cod_amount(349.5),
        )
        .await;

    let err = service.mark_delivered(&id, None).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Guard(GuardError::CodRequired)));
    assert_eq!(err.user_message(), "cash must be collected before delivery");

    let snapshot = service.collect_cod(&id, Some("123456")).await.unwrap();
    assert!(snapshot.cod_collected);
    assert_eq!(snapshot.status, OrderStatus::OutForDelivery);
    {
        let cod = api.cod_requests.lock().unwrap();
        assert_eq!(cod.len(), 1);
        assert_eq!(cod[0].amount, 349.5);
        assert_eq!(cod[0].otp.as_deref(), Some("123456"));
    }

    let err = service.collect_cod(&id, None).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Guard(GuardError::CodAlreadyCollected)));

    let snapshot = service.mark_delivered(&id, None).await.unwrap();
    assert_eq!(snapshot.status, OrderStatus::Delivered);

    let events = drain(&mut events);
    assert_eq!(status_changes(&events), vec![(OrderStatus::OutForDelivery, OrderStatus::Delivered)]);
}

#[tokio::test]
async fn ecommerce_delivery_is_otp_gated() {
    let api = FakeOrderApi::new(OrderStatus::OutForDelivery);
    api.set_otp("246810");
    let (state, _events) = app_with(api.clone(), INTERVAL).await;
    let service = state.lifecycle_service.clone();
    let id = OrderId::new("shop-1");

    state
        .cache
        .insert(
            OrderSnapshot::new("shop-1", OrderType::Ecommerce, PaymentMethod::Card).with_status(OrderStatus::OutForDelivery),
        )
        .await;

    let err = service.mark_delivered(&id, None).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Guard(GuardError::OtpRequired(OtpStage::Delivery))));

    let snapshot = service.mark_delivered(&id, Some("246810")).await.unwrap();
    assert_eq!(snapshot.status, OrderStatus::Delivered);
    assert!(snapshot.delivery_otp_verified);
}

#[tokio::test]
async fn backend_rejection_is_shown_verbatim() {
    let api = FakeOrderApi::new(OrderStatus::Pending);
    api.reject_updates(409, "Ride already accepted by another driver");
    let (state, mut events) = app_with(api.clone(), INTERVAL).await;
    let service = state.lifecycle_service.clone();
    let id = OrderId::new("42");

    state
        .cache
        .insert(OrderSnapshot::new("42", OrderType::Taxi, PaymentMethod::Cash))
        .await;

    let err = service.accept(&id).await.unwrap_err();
    assert!(!err.is_transient());
    assert_eq!(service.snapshot(&id).await.unwrap().status, OrderStatus::Pending);

    let events = drain(&mut events);
    assert_eq!(failures(&events), vec!["Ride already accepted by another driver"]);
    assert!(status_changes(&events).is_empty());
}

#[tokio::test]
async fn otp_stays_verified_when_the_mutation_fails() {
    let api = FakeOrderApi::new(OrderStatus::Accepted);
    api.set_otp("135790");
    api.reject_updates(503, "maintenance");
    let (state, _events) = app_with(api.clone(), INTERVAL).await;
    let service = state.lifecycle_service.clone();
    let id = OrderId::new("8");

    state
        .cache
        .insert(OrderSnapshot::new("8", OrderType::Taxi, PaymentMethod::Cash).with_status(OrderStatus::Accepted))
        .await;

    assert!(service.mark_picked_up(&id, Some("135790")).await.is_err());
    let snapshot = service.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.status, OrderStatus::Accepted);
    assert!(snapshot.pickup_otp_verified);
}

#[tokio::test]
async fn cancel_requires_reason_and_records_it() {
    let api = FakeOrderApi::new(OrderStatus::Accepted);
    let (state, _events) = app_with(api.clone(), INTERVAL).await;
    let service = state.lifecycle_service.clone();
    let id = OrderId::new("grocery-11");

    state
        .cache
        .insert(OrderSnapshot::new("grocery-11", OrderType::Grocery, PaymentMethod::Cod).with_status(OrderStatus::Accepted))
        .await;

    let err = service.cancel(&id, "").await.unwrap_err();
    assert!(matches!(err, LifecycleError::Guard(GuardError::CancelReasonRequired)));

    let snapshot = service.cancel(&id, "store closed").await.unwrap();
    assert_eq!(snapshot.status, OrderStatus::Cancelled);
    assert_eq!(snapshot.cancel_reason.as_deref(), Some("store closed"));

    let update = api.updates.lock().unwrap().last().cloned().unwrap();
    assert_eq!(update.status, OrderStatus::Cancelled);
    assert_eq!(update.reason.as_deref(), Some("store closed"));
}

#[tokio::test]
async fn actions_on_unknown_orders_fail() {
    let api = FakeOrderApi::new(OrderStatus::Pending);
    let (state, _events) = app_with(api, INTERVAL).await;

    let err = state.lifecycle_service.accept(&OrderId::new("ghost")).await.unwrap_err();
    assert!(matches!(err, LifecycleError::OrderNotTracked(_)));
}

#[tokio::test]
async fn refresh_pulls_remote_status() {
    let api = FakeOrderApi::new(OrderStatus::Cancelled);
    let (state, mut events) = app_with(api.clone(), INTERVAL).await;
    let service = state.lifecycle_service.clone();
    let id = OrderId::new("13");

    state
        .cache
        .insert(OrderSnapshot::new("13", OrderType::Porter, PaymentMethod::Cash).with_status(OrderStatus::Accepted))
        .await;

    let snapshot = service.refresh(&id).await.unwrap();
    assert_eq!(snapshot.status, OrderStatus::Cancelled);

    let err = service.mark_picked_up(&id, Some("123456")).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Guard(GuardError::Terminal(OrderStatus::Cancelled))));
    assert_eq!(api.otp_calls(), 0);

    let events = drain(&mut events);
    assert_eq!(status_changes(&events), vec![(OrderStatus::Accepted, OrderStatus::Cancelled)]);
}

#[tokio::test(start_paused = true)]
async fn cancellation_seen_mid_accept_is_kept() {
    let api = FakeOrderApi::new(OrderStatus::Pending);
    api.slow_updates(Duration::from_secs(5));
    api.script(vec![Ok(OrderStatus::Cancelled)]);
    let (state, mut events) = app_with(api.clone(), INTERVAL).await;
    let id = OrderId::new("race-1");

    state
        .cache
        .insert(OrderSnapshot::new("race-1", OrderType::Taxi, PaymentMethod::Cash))
        .await;

    let accepting = {
        let service = state.lifecycle_service.clone();
        let id = id.clone();
        tokio::spawn(async move { service.accept(&id).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    let refreshed = state.lifecycle_service.refresh(&id).await.unwrap();
    assert_eq!(refreshed.status, OrderStatus::Cancelled);

    let accepted = accepting.await.unwrap().unwrap();
    assert_eq!(accepted.status, OrderStatus::Cancelled);
    assert_eq!(state.cache.get(&id).await.unwrap().status, OrderStatus::Cancelled);

    let events = drain(&mut events);
    assert_eq!(status_changes(&events), vec![(OrderStatus::Pending, OrderStatus::Cancelled)]);
}

#[tokio::test]
async fn terminal_order_reports_terminal_before_otp_format() {
    let api = FakeOrderApi::new(OrderStatus::Delivered);
    let (state, _events) = app_with(api.clone(), INTERVAL).await;
    let service = state.lifecycle_service.clone();
    let id = OrderId::new("done-1");

    state
        .cache
        .insert(OrderSnapshot::new("done-1", OrderType::Porter, PaymentMethod::Cash).with_status(OrderStatus::Delivered))
        .await;

    let err = service.mark_picked_up(&id, Some("12")).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Guard(GuardError::Terminal(OrderStatus::Delivered))));
    let err = service.mark_delivered(&id, Some("not-a-code")).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Guard(GuardError::Terminal(OrderStatus::Delivered))));
    let err = service.verify_otp(&id, OtpStage::Delivery, "x").await.unwrap_err();
    assert!(matches!(err, LifecycleError::Guard(GuardError::Terminal(OrderStatus::Delivered))));
    assert_eq!(api.otp_calls(), 0);
}
