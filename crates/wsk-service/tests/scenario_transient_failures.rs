//! Storage failures surface as `Transient` and a retry converges.

use wsk_db::{FaultOp, MemoryGateway};
use wsk_schemas::{Micros, OrderId};
use wsk_service::{
    ItemInput, LedgerQuery, OrderInput, OrderService, PaymentOutcome, PaymentPolicy, ServiceError,
};

async fn with_order() -> (OrderService<MemoryGateway>, OrderId) {
    let svc = OrderService::open(MemoryGateway::new(), PaymentPolicy::default())
        .await
        .unwrap();
    let client = svc.create_client("Ana", "").await.unwrap();
    let order = svc
        .create_order(OrderInput {
            client_id: Some(client.id),
            items: vec![ItemInput::new("keyboard", 1, Micros::from_units(80))],
            deliver_by: None,
            paid: false,
            payment_method: None,
        })
        .await
        .unwrap();
    (svc, order.id)
}

#[tokio::test]
async fn scenario_failed_ledger_insert_leaves_nothing_behind() {
    let (svc, id) = with_order().await;
    svc.gateway().fail_next(FaultOp::CreateEntry).await;

    let err = svc.set_order_paid(id, true, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::Transient(_)), "got {err:?}");

    svc.refresh().await.unwrap();
    assert!(svc.ledger_entries(&LedgerQuery::all()).await.is_empty());
    assert!(!svc.get_order(id).await.unwrap().paid);

    assert_eq!(
        svc.set_order_paid(id, true, None).await.unwrap(),
        PaymentOutcome::Recorded
    );
    assert_eq!(svc.ledger_entries(&LedgerQuery::all()).await.len(), 1);
}

#[tokio::test]
async fn scenario_lost_flag_write_is_repaired_by_retry() {
    let (svc, id) = with_order().await;
    svc.gateway().fail_next(FaultOp::UpdateOrder).await;

    // Entry written, flag write lost.
    assert!(svc.set_order_paid(id, true, None).await.is_err());
    svc.refresh().await.unwrap();
    assert_eq!(svc.ledger_entries(&LedgerQuery::all()).await.len(), 1);
    assert!(!svc.get_order(id).await.unwrap().paid);
    assert!(!svc.reconcile_sweep().await.is_clean());

    assert_eq!(
        svc.set_order_paid(id, true, None).await.unwrap(),
        PaymentOutcome::AlreadyRecorded
    );
    assert!(svc.get_order(id).await.unwrap().paid);
    assert_eq!(svc.ledger_entries(&LedgerQuery::all()).await.len(), 1);
    assert!(svc.reconcile_sweep().await.is_clean());
}

#[tokio::test]
async fn scenario_failed_status_write_keeps_status() {
    let (svc, id) = with_order().await;
    svc.gateway().fail_next(FaultOp::UpdateOrder).await;

    assert!(matches!(
        svc.advance_status(id).await,
        Err(ServiceError::Transient(_))
    ));
    svc.refresh().await.unwrap();
    assert_eq!(
        svc.get_order(id).await.unwrap().status,
        wsk_schemas::OrderStatus::InProgress
    );
}

#[tokio::test]
async fn scenario_failed_refresh_surfaces_transient() {
    let (svc, _) = with_order().await;
    svc.gateway().fail_next(FaultOp::Fetch).await;
    assert!(matches!(svc.refresh().await, Err(ServiceError::Transient(_))));
    svc.refresh().await.unwrap();
    assert_eq!(svc.list_orders(None).await.len(), 1);
}
