mod common;

use chrono::Utc;
use rust_decimal_macros::dec;

use common::*;
use simone_storefront::application::returns::ReturnFilter;
use simone_storefront::domain::aggregates::{
    EntryKind, EntryStatus, OrderStatus, ReturnError, ReturnStatus,
};
use simone_storefront::domain::ports::EntryQuery;
use simone_storefront::EcommerceError;

#[tokio::test]
async fn test_approved_return_restocks_and_reverses_commission() {
    let h = harness().await;
    let account = platform_account(&h).await;
    let boots = product(&h, h.vendor.user_id, dec!(100), dec!(10), 5).await;
    let receipt = place_order(&h, &[(boots.id, 2)]).await;
    deliver(&h, &receipt, &account).await;
    let line_id = receipt.order.items()[0].id;

    let request = h.services.returns.request(&h.customer, receipt.order.id(), line_id, 1, "Talla incorrecta").await.unwrap();
    assert_eq!(request.status, ReturnStatus::Requested);
    assert_eq!(request.refund.amount(), dec!(100));
    assert_eq!(request.vendor_id, h.vendor.user_id);

    let approved = h.services.returns.approve(&h.vendor, request.id, true, Some("Recibido".into())).await.unwrap();
    assert_eq!(approved.status, ReturnStatus::Approved);

    assert_eq!(h.services.catalog.product_detail(boots.id).await.unwrap().stock.value(), 4);
    let order = h.services.orders.get(&h.customer, receipt.order.id()).await.unwrap();
    assert_eq!(order.items()[0].returned_quantity, 1);
    assert_eq!(order.status(), OrderStatus::Delivered);

    let entries = h.services.commissions.list_entries(&h.admin, EntryQuery::default()).await.unwrap();
    let reversal = entries.iter().find(|e| e.kind == EntryKind::Reversal).unwrap();
    assert_eq!(reversal.gross.amount(), dec!(-100));
    assert_eq!(reversal.commission.amount(), dec!(-10));
    assert_eq!(reversal.status, EntryStatus::Open);

    let err = h.services.returns.reject(&h.vendor, request.id, None).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Return(ReturnError::AlreadyResolved)));

    // Returning the last unit closes the order as returned; without restock the shelf stays as is.
    let last = h.services.returns.request(&h.customer, receipt.order.id(), line_id, 1, "Defectuoso").await.unwrap();
    h.services.returns.approve(&h.admin, last.id, false, None).await.unwrap();
    assert_eq!(h.services.catalog.product_detail(boots.id).await.unwrap().stock.value(), 4);
    assert_eq!(h.services.orders.get(&h.customer, receipt.order.id()).await.unwrap().status(), OrderStatus::Returned);
}

#[tokio::test]
async fn test_return_requires_delivery_and_respects_pending_quantity() {
    let h = harness().await;
    let account = platform_account(&h).await;
    let boots = product(&h, h.vendor.user_id, dec!(100), dec!(10), 5).await;
    let receipt = place_order(&h, &[(boots.id, 2)]).await;
    let order_id = receipt.order.id();
    let line_id = receipt.order.items()[0].id;

    let err = h.services.returns.request(&h.customer, order_id, line_id, 1, "No lo quiero").await.unwrap_err();
    assert!(matches!(err, EcommerceError::Return(ReturnError::OrderNotDelivered)));

    deliver(&h, &receipt, &account).await;
    h.services.returns.request(&h.customer, order_id, line_id, 1, "No lo quiero").await.unwrap();
    let err = h.services.returns.request(&h.customer, order_id, line_id, 2, "Ambos").await.unwrap_err();
    assert!(matches!(err, EcommerceError::Return(ReturnError::QuantityExceeded { returnable: 1 })));

    let err = h.services.returns.request(&h.other_vendor, order_id, line_id, 1, "Ajeno").await.unwrap_err();
    assert!(matches!(err, EcommerceError::NotFound { .. }));
}

#[tokio::test]
async fn test_vendors_only_resolve_their_own_returns() {
    let h = harness().await;
    let account = platform_account(&h).await;
    let boots = product(&h, h.vendor.user_id, dec!(100), dec!(10), 5).await;
    let receipt = place_order(&h, &[(boots.id, 1)]).await;
    deliver(&h, &receipt, &account).await;
    let request = h.services.returns
        .request(&h.customer, receipt.order.id(), receipt.order.items()[0].id, 1, "Color distinto")
        .await
        .unwrap();

    let err = h.services.returns.approve(&h.other_vendor, request.id, true, None).await.unwrap_err();
    assert!(matches!(err, EcommerceError::NotFound { .. } | EcommerceError::Forbidden(_)));
    let err = h.services.returns.approve(&h.customer, request.id, true, None).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Forbidden(_)));

    let rejected = h.services.returns.reject(&h.vendor, request.id, Some("Fuera de política".into())).await.unwrap();
    assert_eq!(rejected.status, ReturnStatus::Rejected);

    let mine = h.services.returns.list(&h.customer, ReturnFilter::default()).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert!(h.services.returns.list(&h.other_vendor, ReturnFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_cancel_of_paid_order_restocks_and_voids_commission() {
    let h = harness().await;
    let account = platform_account(&h).await;
    let boots = product(&h, h.vendor.user_id, dec!(100), dec!(10), 5).await;
    let receipt = place_order(&h, &[(boots.id, 3)]).await;
    pay(&h, &receipt, &account).await;
    assert_eq!(h.services.catalog.product_detail(boots.id).await.unwrap().stock.value(), 2);

    let err = h.services.orders.cancel(&h.customer, receipt.order.id(), None).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Forbidden(_)));

    let cancelled = h.services.orders.cancel(&h.admin, receipt.order.id(), Some("Sin stock en almacén".into())).await.unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(h.services.catalog.product_detail(boots.id).await.unwrap().stock.value(), 5);

    let entries = h.services.commissions.list_entries(&h.admin, EntryQuery::default()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, EntryStatus::Void);

    let today = Utc::now().date_naive();
    assert!(h.services.settlements.liquidate(&h.admin, h.vendor.user_id, today, today).await.is_err());
}

#[tokio::test]
async fn test_customer_cancels_unpaid_order() {
    let h = harness().await;
    platform_account(&h).await;
    let boots = product(&h, h.vendor.user_id, dec!(100), dec!(10), 5).await;
    let receipt = place_order(&h, &[(boots.id, 2)]).await;

    let cancelled = h.services.orders.cancel(&h.customer, receipt.order.id(), None).await.unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(h.services.catalog.product_detail(boots.id).await.unwrap().stock.value(), 5);

    let err = h.services.orders.cancel(&h.customer, receipt.order.id(), None).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Forbidden(_) | EcommerceError::Order(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_approvals_apply_a_return_once() {
    let h = harness().await;
    let account = platform_account(&h).await;
    let boots = product(&h, h.vendor.user_id, dec!(100), dec!(10), 5).await;
    let receipt = place_order(&h, &[(boots.id, 2)]).await;
    deliver(&h, &receipt, &account).await;
    let line_id = receipt.order.items()[0].id;
    let request = h.services.returns.request(&h.customer, receipt.order.id(), line_id, 1, "Talla incorrecta").await.unwrap();

    let (returns, admin) = (h.services.returns.clone(), h.admin.clone());
    let first = tokio::spawn(async move { returns.approve(&admin, request.id, true, None).await });
    let (returns, vendor) = (h.services.returns.clone(), h.vendor.clone());
    let second = tokio::spawn(async move { returns.approve(&vendor, request.id, true, None).await });
    let outcomes = [first.await.unwrap(), second.await.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    let loser = outcomes.iter().find_map(|o| o.as_ref().err()).unwrap();
    assert!(matches!(loser, EcommerceError::Return(ReturnError::AlreadyResolved)));

    let order = h.services.orders.get(&h.admin, receipt.order.id()).await.unwrap();
    assert_eq!(order.items()[0].returned_quantity, 1);
    assert_eq!(h.services.catalog.product_detail(boots.id).await.unwrap().stock.value(), 4);
    let entries = h.services.commissions.list_entries(&h.admin, EntryQuery::default()).await.unwrap();
    assert_eq!(entries.iter().filter(|e| e.kind == EntryKind::Reversal).count(), 1);
}
