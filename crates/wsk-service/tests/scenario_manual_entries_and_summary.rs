use chrono::{TimeZone, Utc};
use wsk_db::MemoryGateway;
use wsk_schemas::{EntryKind, Micros, UserId};
use wsk_service::{
    EntryInput, ItemInput, LedgerQuery, OrderInput, OrderService, PaymentPolicy, ServiceError,
};

fn expense(units: i64, category: &str, day: u32, owner: Option<UserId>) -> EntryInput {
    EntryInput {
        kind: EntryKind::Expense,
        amount: Micros::from_units(units),
        category: category.to_string(),
        description: format!("{category} purchase"),
        occurred_at: Some(Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()),
        owner,
    }
}

#[tokio::test]
async fn scenario_summary_balances_payments_against_expenses() {
    let svc = OrderService::open(MemoryGateway::new(), PaymentPolicy::default())
        .await
        .unwrap();
    let client = svc.create_client("Ana", "").await.unwrap();
    let order = svc
        .create_order(OrderInput {
            client_id: Some(client.id),
            items: vec![ItemInput::new("screen", 2, Micros::from_units(50))],
            deliver_by: None,
            paid: true,
            payment_method: None,
        })
        .await
        .unwrap();
    assert!(order.paid);

    svc.record_entry(expense(30, "parts", 1, None)).await.unwrap();
    svc.record_entry(expense(12, "rent", 2, Some(UserId(2)))).await.unwrap();

    let all = svc.ledger_summary(&LedgerQuery::all()).await;
    assert_eq!(all.revenue, Micros::from_units(100));
    assert_eq!(all.expense, Micros::from_units(42));
    assert_eq!(all.balance, Micros::from_units(58));
    assert_eq!(all.count, 3);

    let mine = svc.ledger_summary(&LedgerQuery::all().owner(UserId(2))).await;
    assert_eq!(mine.count, 1);
    assert_eq!(mine.expense, Micros::from_units(12));

    let parts = svc
        .ledger_entries(&LedgerQuery::all().kind(EntryKind::Expense).category("Parts"))
        .await;
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].owner, UserId(1));
    assert_eq!(parts[0].order_id, None);

    let days = svc.daily_totals(&LedgerQuery::all().kind(EntryKind::Expense)).await;
    assert_eq!(days.len(), 2);
    assert_eq!(days[0].expense, Micros::from_units(12));

    // Manual entries never count as order payments.
    assert!(svc.reconcile_sweep().await.is_clean());
}

#[tokio::test]
async fn scenario_invalid_manual_entries_are_rejected() {
    let svc = OrderService::open(MemoryGateway::new(), PaymentPolicy::default())
        .await
        .unwrap();

    let zero = expense(0, "parts", 1, None);
    assert!(matches!(
        svc.record_entry(zero).await,
        Err(ServiceError::Validation(_))
    ));

    let blank = expense(5, "  ", 1, None);
    assert!(matches!(
        svc.record_entry(blank).await,
        Err(ServiceError::Validation(_))
    ));

    let mut forged = expense(5, "services", 1, None);
    forged.kind = EntryKind::Revenue;
    forged.description = "Payment order #1 pix".to_string();
    assert!(matches!(
        svc.record_entry(forged).await,
        Err(ServiceError::Validation(_))
    ));

    assert!(svc.ledger_entries(&LedgerQuery::all()).await.is_empty());
}

#[tokio::test]
async fn scenario_configured_category_and_owner_are_stamped() {
    let policy = PaymentPolicy {
        revenue_category: "repairs".to_string(),
        owner: UserId(7),
    };
    let svc = OrderService::open(MemoryGateway::new(), policy).await.unwrap();
    let client = svc.create_client("Ana", "").await.unwrap();
    let order = svc
        .create_order(OrderInput {
            client_id: Some(client.id),
            items: vec![ItemInput::new("fan", 1, Micros::from_units(15))],
            deliver_by: None,
            paid: false,
            payment_method: None,
        })
        .await
        .unwrap();
    svc.set_order_paid(order.id, true, None).await.unwrap();

    let entries = svc.ledger_entries(&LedgerQuery::all()).await;
    assert_eq!(entries[0].category, "repairs");
    assert_eq!(entries[0].owner, UserId(7));
}
