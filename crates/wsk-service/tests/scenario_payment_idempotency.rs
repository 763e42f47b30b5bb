//! set-paid is idempotent, including across services with stale snapshots.

use wsk_db::MemoryGateway;
use wsk_schemas::{EntryKind, Micros, OrderId, PaymentMethod};
use wsk_service::{
    ItemInput, LedgerQuery, OrderInput, OrderService, PaymentOutcome, PaymentPolicy,
};

async fn with_order(gw: MemoryGateway) -> (OrderService<MemoryGateway>, OrderId) {
    let svc = OrderService::open(gw, PaymentPolicy::default()).await.unwrap();
    let client = svc.create_client("Ana", "11 5555-0000").await.unwrap();
    let order = svc
        .create_order(OrderInput {
            client_id: Some(client.id),
            items: vec![
                ItemInput::new("hinge", 3, Micros::new(7_500_000)),
                ItemInput::new("labour", 1, Micros::from_units(40)),
            ],
            deliver_by: None,
            paid: false,
            payment_method: None,
        })
        .await
        .unwrap();
    (svc, order.id)
}

fn payments(entries: &[wsk_schemas::LedgerEntry], order_id: OrderId) -> usize {
    entries
        .iter()
        .filter(|e| e.kind == EntryKind::Revenue && e.order_id == Some(order_id))
        .count()
}

#[tokio::test]
async fn scenario_paying_twice_records_once() {
    let (svc, id) = with_order(MemoryGateway::new()).await;

    assert_eq!(
        svc.set_order_paid(id, true, Some(PaymentMethod::Pix)).await.unwrap(),
        PaymentOutcome::Recorded
    );
    assert_eq!(
        svc.set_order_paid(id, true, Some(PaymentMethod::Cash)).await.unwrap(),
        PaymentOutcome::AlreadyRecorded
    );

    let entries = svc.ledger_entries(&LedgerQuery::all()).await;
    assert_eq!(payments(&entries, id), 1);
    assert_eq!(entries[0].amount, Micros::new(62_500_000));
    assert!(svc.reconcile_sweep().await.is_clean());
}

#[tokio::test]
async fn scenario_unpaying_unpaid_order_is_noop() {
    let (svc, id) = with_order(MemoryGateway::new()).await;
    assert_eq!(
        svc.set_order_paid(id, false, None).await.unwrap(),
        PaymentOutcome::AlreadyClear
    );
    assert!(!svc.get_order(id).await.unwrap().paid);
    assert!(svc.ledger_entries(&LedgerQuery::all()).await.is_empty());
}

#[tokio::test]
async fn scenario_pay_unpay_pay_ends_with_one_entry() {
    let (svc, id) = with_order(MemoryGateway::new()).await;
    svc.set_order_paid(id, true, None).await.unwrap();
    svc.set_order_paid(id, false, None).await.unwrap();
    assert_eq!(
        svc.set_order_paid(id, true, None).await.unwrap(),
        PaymentOutcome::Recorded
    );
    let entries = svc.ledger_entries(&LedgerQuery::all()).await;
    assert_eq!(payments(&entries, id), 1);
    assert!(svc.get_order(id).await.unwrap().paid);
}

#[tokio::test]
async fn scenario_stale_snapshots_cannot_double_record() {
    let gw = MemoryGateway::new();
    let (first, id) = with_order(gw.clone()).await;
    // Opened before either payment: both snapshots say unpaid, no entry.
    let second = OrderService::open(gw.clone(), PaymentPolicy::default())
        .await
        .unwrap();

    assert_eq!(
        first.set_order_paid(id, true, None).await.unwrap(),
        PaymentOutcome::Recorded
    );
    assert_eq!(
        second.set_order_paid(id, true, None).await.unwrap(),
        PaymentOutcome::AlreadyRecorded
    );

    second.refresh().await.unwrap();
    let entries = second.ledger_entries(&LedgerQuery::all()).await;
    assert_eq!(payments(&entries, id), 1);
    assert!(second.get_order(id).await.unwrap().paid);
}

#[tokio::test]
async fn scenario_concurrent_payments_produce_one_entry() {
    let gw = MemoryGateway::new();
    let (a, id) = with_order(gw.clone()).await;
    let b = OrderService::open(gw.clone(), PaymentPolicy::default())
        .await
        .unwrap();

    let (ra, rb) = tokio::join!(
        a.set_order_paid(id, true, Some(PaymentMethod::Pix)),
        b.set_order_paid(id, true, Some(PaymentMethod::Card)),
    );
    let mut outcomes = vec![ra.unwrap(), rb.unwrap()];
    outcomes.sort_by_key(|o| o.as_str());
    assert_eq!(
        outcomes,
        vec![PaymentOutcome::AlreadyRecorded, PaymentOutcome::Recorded]
    );

    a.refresh().await.unwrap();
    assert_eq!(payments(&a.ledger_entries(&LedgerQuery::all()).await, id), 1);
    assert!(a.reconcile_sweep().await.is_clean());
}

#[tokio::test]
async fn scenario_stale_unpay_after_other_unpay_is_noop() {
    let gw = MemoryGateway::new();
    let (a, id) = with_order(gw.clone()).await;
    a.set_order_paid(id, true, None).await.unwrap();
    let b = OrderService::open(gw.clone(), PaymentPolicy::default())
        .await
        .unwrap();

    assert_eq!(
        a.set_order_paid(id, false, None).await.unwrap(),
        PaymentOutcome::Removed
    );
    // b loaded the entry before a removed it.
    assert_eq!(
        b.set_order_paid(id, false, None).await.unwrap(),
        PaymentOutcome::AlreadyClear
    );
    assert!(b.ledger_entries(&LedgerQuery::all()).await.is_empty());
    assert!(!b.get_order(id).await.unwrap().paid);
}

#[tokio::test]
async fn scenario_invariants_hold_across_many_orders() {
    let (svc, first) = with_order(MemoryGateway::new()).await;
    let client = svc.get_order(first).await.unwrap().client_id;
    let mut ids = vec![first];
    for n in 1..=4u32 {
        let order = svc
            .create_order(OrderInput {
                client_id: Some(client),
                items: vec![ItemInput::new("part", n, Micros::from_units(i64::from(n) * 3))],
                deliver_by: None,
                paid: n % 2 == 0,
                payment_method: None,
            })
            .await
            .unwrap();
        ids.push(order.id);
    }
    svc.set_order_paid(ids[1], true, None).await.unwrap();
    svc.set_order_paid(ids[2], false, None).await.unwrap();

    let entries = svc.ledger_entries(&LedgerQuery::all()).await;
    for order in svc.list_orders(None).await {
        let item_sum = Micros::checked_sum(order.items.iter().map(|i| i.total)).unwrap();
        assert_eq!(order.total, item_sum);
        let expected = usize::from(order.paid);
        assert_eq!(payments(&entries, order.id), expected, "order {}", order.id);
    }
    assert!(svc.reconcile_sweep().await.is_clean());
}
