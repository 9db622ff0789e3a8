mod common;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;

use common::*;
use simone_storefront::domain::aggregates::{
    CommissionScope, EntryStatus, OrderStatus, PaymentStatus, ProofStatus, SettlementDirection, SettlementError,
    SettlementStatus,
};
use simone_storefront::domain::ports::EntryQuery;
use simone_storefront::EcommerceError;

#[tokio::test]
async fn test_proof_upload_writes_file_and_sidecar() {
    let h = harness().await;
    let account = platform_account(&h).await;
    let chair = product(&h, h.vendor.user_id, dec!(120), dec!(15), 2).await;
    let table = product(&h, h.other_vendor.user_id, dec!(300), dec!(30), 1).await;
    let receipt = place_order(&h, &[(chair.id, 1), (table.id, 1)]).await;
    let order_id = receipt.order.id();

    let proof = h.services.payments.upload(&h.customer, order_id, deposit(&account, dec!(465))).await.unwrap();
    assert_eq!(proof.status, ProofStatus::Pending);
    assert!(proof.file_name.ends_with(".png"));

    let dir = h.uploads.path().join(order_id.to_string());
    assert!(dir.join(&proof.file_name).exists());
    let sidecar: serde_json::Value = serde_json::from_slice(&std::fs::read(dir.join(format!("{}.json", proof.id))).unwrap()).unwrap();
    assert_eq!(sidecar["operation_number"], "OP-000123");
    assert_eq!(sidecar["order_number"], receipt.order.order_number());

    let order = h.services.orders.get(&h.customer, order_id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::PaymentReview);
    assert_eq!(order.payment_status(), PaymentStatus::Submitted);

    let (stored, bytes) = h.services.payments.download(&h.admin, order_id, proof.id).await.unwrap();
    assert_eq!(stored.id, proof.id);
    assert_eq!(bytes, deposit(&account, dec!(1)).bytes);
    assert_eq!(h.services.payments.list(&h.customer, order_id).await.unwrap().len(), 1);

    // A second proof is refused while the first is under review.
    let again = h.services.payments.upload(&h.customer, order_id, deposit(&account, dec!(465))).await.unwrap_err();
    assert!(matches!(again, EcommerceError::Conflict(_)));
}

#[tokio::test]
async fn test_upload_validation() {
    let h = harness().await;
    let platform = platform_account(&h).await;
    let vendor_acc = vendor_account(&h, h.other_vendor.user_id).await;
    let chair = product(&h, h.vendor.user_id, dec!(120), dec!(15), 2).await;
    let receipt = place_order(&h, &[(chair.id, 1)]).await;
    let order_id = receipt.order.id();

    let mut future = deposit(&platform, dec!(135));
    future.deposited_on = Utc::now().date_naive() + Duration::days(2);
    let err = h.services.payments.upload(&h.customer, order_id, future).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation(_)));

    let err = h.services.payments.upload(&h.customer, order_id, deposit(&vendor_acc, dec!(135))).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation(_)));

    let mut text = deposit(&platform, dec!(135));
    text.content_type = "text/plain".into();
    let err = h.services.payments.upload(&h.customer, order_id, text).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation(_)));

    let err = h.services.payments.upload(&h.vendor, order_id, deposit(&platform, dec!(135))).await.unwrap_err();
    assert!(matches!(err, EcommerceError::NotFound { .. }));
}

#[tokio::test]
async fn test_short_deposit_cannot_be_accepted_and_rejection_reopens_payment() {
    let h = harness().await;
    let account = platform_account(&h).await;
    let chair = product(&h, h.vendor.user_id, dec!(120), dec!(15), 2).await;
    let other = product(&h, h.other_vendor.user_id, dec!(10), dec!(0), 2).await;
    let receipt = place_order(&h, &[(chair.id, 1), (other.id, 1)]).await;
    let order_id = receipt.order.id();

    let proof = h.services.payments.upload(&h.customer, order_id, deposit(&account, dec!(100))).await.unwrap();

    let err = h.services.payments.review(&h.vendor, order_id, proof.id, true, None).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Forbidden(_)));

    let err = h.services.payments.review(&h.admin, order_id, proof.id, true, None).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation(_)));

    let rejected = h.services.payments.review(&h.admin, order_id, proof.id, false, Some("Monto incompleto".into())).await.unwrap();
    assert_eq!(rejected.status, ProofStatus::Rejected);
    assert_eq!(rejected.review_note.as_deref(), Some("Monto incompleto"));

    let order = h.services.orders.get(&h.customer, order_id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::PendingPayment);
    assert_eq!(order.payment_status(), PaymentStatus::Rejected);

    // Reviewing the same proof twice is a conflict; a new proof is accepted.
    let err = h.services.payments.review(&h.admin, order_id, proof.id, false, None).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Conflict(_)));
    pay(&h, &receipt, &account).await;
    assert_eq!(h.services.orders.get(&h.admin, order_id).await.unwrap().status(), OrderStatus::Paid);
}

#[tokio::test]
async fn test_accepted_payment_books_commission_per_vendor() {
    let h = harness().await;
    let account = platform_account(&h).await;
    h.services.commissions.set_rule(&h.admin, CommissionScope::Vendor { vendor_id: h.vendor.user_id }, dec!(15), true).await.unwrap();
    let chair = product(&h, h.vendor.user_id, dec!(100), dec!(10), 2).await;
    let table = product(&h, h.other_vendor.user_id, dec!(50), dec!(5), 2).await;
    let receipt = place_order(&h, &[(chair.id, 1), (table.id, 1)]).await;

    pay(&h, &receipt, &account).await;
    let order = h.services.orders.get(&h.admin, receipt.order.id()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);
    assert!(order.paid_at().is_some());

    let entries = h.services.commissions.list_entries(&h.admin, EntryQuery::default()).await.unwrap();
    assert_eq!(entries.len(), 2);
    let of = |vendor_id| entries.iter().find(|e| e.vendor_id == vendor_id).unwrap();
    assert_eq!(of(h.vendor.user_id).commission.amount(), dec!(15));
    assert_eq!(of(h.vendor.user_id).shipping.amount(), dec!(10));
    assert_eq!(of(h.other_vendor.user_id).commission.amount(), dec!(5));

    // Vendors only see their own entries.
    let mine = h.services.commissions.list_entries(&h.vendor, EntryQuery::default()).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].vendor_id, h.vendor.user_id);
}

#[tokio::test]
async fn test_settlement_lifecycle() {
    let h = harness().await;
    let account = platform_account(&h).await;
    let chair = product(&h, h.vendor.user_id, dec!(100), dec!(10), 5).await;
    let table = product(&h, h.other_vendor.user_id, dec!(50), dec!(5), 5).await;
    let receipt = place_order(&h, &[(chair.id, 2), (table.id, 1)]).await;
    pay(&h, &receipt, &account).await;
    let today = Utc::now().date_naive();

    let settlement = h.services.settlements.liquidate(&h.admin, h.vendor.user_id, today, today).await.unwrap();
    assert_eq!(settlement.status, SettlementStatus::Pending);
    assert_eq!(settlement.gross.amount(), dec!(200));
    assert_eq!(settlement.platform_collected.amount(), dec!(210));
    assert_eq!(settlement.commission.amount(), dec!(20));
    assert_eq!(settlement.balance.amount(), dec!(190));
    assert_eq!(settlement.direction(), SettlementDirection::PlatformPaysVendor);

    let settled = EntryQuery { status: Some(EntryStatus::Settled), ..Default::default() };
    assert_eq!(h.services.commissions.list_entries(&h.admin, settled).await.unwrap().len(), 1);

    let err = h.services.settlements.liquidate(&h.admin, h.vendor.user_id, today, today).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Settlement(SettlementError::NothingToSettle)));

    let err = h.services.settlements.mark_paid(&h.admin, settlement.id, "TRX-1").await.unwrap_err();
    assert!(matches!(err, EcommerceError::Settlement(SettlementError::InvalidTransition { .. })));

    h.services.settlements.approve(&h.admin, settlement.id).await.unwrap();
    let err = h.services.settlements.mark_paid(&h.admin, settlement.id, "  ").await.unwrap_err();
    assert!(matches!(err, EcommerceError::Settlement(SettlementError::MissingReference)));
    let paid = h.services.settlements.mark_paid(&h.admin, settlement.id, "TRX-1").await.unwrap();
    assert_eq!(paid.status, SettlementStatus::Paid);
    assert_eq!(paid.payment_reference.as_deref(), Some("TRX-1"));

    let err = h.services.settlements.cancel(&h.admin, settlement.id, None).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Settlement(SettlementError::InvalidTransition { .. })));

    // Vendors read their own settlements but cannot liquidate.
    assert_eq!(h.services.settlements.list(&h.vendor, None, None).await.unwrap().len(), 1);
    assert!(h.services.settlements.list(&h.other_vendor, None, None).await.unwrap().is_empty());
    let err = h.services.settlements.liquidate(&h.vendor, h.vendor.user_id, today, today).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Forbidden(_)));
}

#[tokio::test]
async fn test_cancelled_settlement_releases_entries() {
    let h = harness().await;
    let account = platform_account(&h).await;
    let chair = product(&h, h.vendor.user_id, dec!(100), dec!(10), 5).await;
    let table = product(&h, h.other_vendor.user_id, dec!(50), dec!(5), 5).await;
    let receipt = place_order(&h, &[(chair.id, 1), (table.id, 1)]).await;
    pay(&h, &receipt, &account).await;
    let today = Utc::now().date_naive();

    let all = h.services.settlements.liquidate_all(&h.admin, today, today).await.unwrap();
    assert_eq!(all.len(), 2);

    let cancelled = h.services.settlements.cancel(&h.admin, all[0].id, Some("Periodo errado".into())).await.unwrap();
    assert_eq!(cancelled.status, SettlementStatus::Cancelled);

    let open = EntryQuery { status: Some(EntryStatus::Open), ..Default::default() };
    assert_eq!(h.services.commissions.list_entries(&h.admin, open).await.unwrap().len(), 1);

    let again = h.services.settlements.liquidate(&h.admin, all[0].vendor_id, today, today).await.unwrap();
    assert_eq!(again.entry_ids, all[0].entry_ids);
}

#[tokio::test]
async fn test_direct_payment_leaves_vendor_owing_commission() {
    let h = harness().await;
    platform_account(&h).await;
    let account = vendor_account(&h, h.vendor.user_id).await;
    let lamp = product(&h, h.vendor.user_id, dec!(80), dec!(12), 5).await;
    let receipt = place_order(&h, &[(lamp.id, 1)]).await;

    let proof = h.services.payments.upload(&h.customer, receipt.order.id(), deposit(&account, dec!(92))).await.unwrap();
    let err = h.services.payments.review(&h.other_vendor, receipt.order.id(), proof.id, true, None).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Forbidden(_)));
    h.services.payments.review(&h.vendor, receipt.order.id(), proof.id, true, None).await.unwrap();

    let today = Utc::now().date_naive();
    let settlement = h.services.settlements.liquidate(&h.admin, h.vendor.user_id, today, today).await.unwrap();
    assert_eq!(settlement.vendor_collected.amount(), dec!(92));
    assert!(settlement.platform_collected.is_zero());
    assert_eq!(settlement.balance.amount(), dec!(-8));
    assert_eq!(settlement.direction(), SettlementDirection::VendorPaysPlatform);
    assert_eq!(settlement.amount_due().amount(), dec!(8));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_accept_racing_customer_cancel_has_one_winner() {
    let h = harness().await;
    let account = platform_account(&h).await;
    let lamp = product(&h, h.vendor.user_id, dec!(30), dec!(5), 5).await;
    let receipt = place_order(&h, &[(lamp.id, 2)]).await;
    let order_id = receipt.order.id();
    let proof = h.services.payments.upload(&h.customer, order_id, deposit(&account, receipt.order.total().amount())).await.unwrap();

    let (payments, admin) = (h.services.payments.clone(), h.admin.clone());
    let accept = tokio::spawn(async move { payments.review(&admin, order_id, proof.id, true, None).await });
    let (orders, customer) = (h.services.orders.clone(), h.customer.clone());
    let cancel = tokio::spawn(async move { orders.cancel(&customer, order_id, None).await });
    let (accepted, cancelled) = (accept.await.unwrap(), cancel.await.unwrap());
    assert!(accepted.is_ok() != cancelled.is_ok(), "accept {:?} / cancel {:?}", accepted.as_ref().err(), cancelled.as_ref().err());

    let order = h.services.orders.get(&h.admin, order_id).await.unwrap();
    let stock = h.services.catalog.product_detail(lamp.id).await.unwrap().stock.value();
    let open = EntryQuery { status: Some(EntryStatus::Open), ..Default::default() };
    let open_entries = h.services.commissions.list_entries(&h.admin, open).await.unwrap();
    if accepted.is_ok() {
        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(stock, 3);
        assert_eq!(open_entries.len(), 1);
    } else {
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(stock, 5);
        assert!(open_entries.is_empty());
    }
}

#[tokio::test]
async fn test_stale_cancel_after_payment_is_refused() {
    let h = harness().await;
    let account = platform_account(&h).await;
    let lamp = product(&h, h.vendor.user_id, dec!(30), dec!(5), 5).await;
    let receipt = place_order(&h, &[(lamp.id, 2)]).await;
    let mut stale = h.ctx.stores.orders.get(receipt.order.id()).await.unwrap().unwrap();
    pay(&h, &receipt, &account).await;

    let restock = stale.cancel().unwrap();
    let err = h.ctx.stores.orders.cancel(&stale, OrderStatus::PendingPayment, &restock, &[]).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Conflict(_)));
    assert_eq!(h.services.orders.get(&h.admin, receipt.order.id()).await.unwrap().status(), OrderStatus::Paid);
    assert_eq!(h.services.catalog.product_detail(lamp.id).await.unwrap().stock.value(), 3);
}

#[tokio::test]
async fn test_liquidate_all_settles_each_vendor_once() {
    let h = harness().await;
    let account = platform_account(&h).await;
    let chair = product(&h, h.vendor.user_id, dec!(100), dec!(10), 5).await;
    let table = product(&h, h.other_vendor.user_id, dec!(50), dec!(5), 5).await;
    let receipt = place_order(&h, &[(chair.id, 2), (table.id, 1)]).await;
    pay(&h, &receipt, &account).await;
    let today = Utc::now().date_naive();

    let err = h.services.settlements.liquidate_all(&h.vendor, today, today).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Forbidden(_)));
    let err = h.services.settlements.liquidate_all(&h.admin, today, today - Duration::days(1)).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Settlement(SettlementError::InvalidPeriod)));

    let all = h.services.settlements.liquidate_all(&h.admin, today, today).await.unwrap();
    assert_eq!(all.len(), 2);
    let chair_side = all.iter().find(|s| s.vendor_id == h.vendor.user_id).unwrap();
    assert_eq!(chair_side.gross.amount(), dec!(200));
    assert_eq!(chair_side.commission.amount(), dec!(20));
    let table_side = all.iter().find(|s| s.vendor_id == h.other_vendor.user_id).unwrap();
    assert_eq!(table_side.gross.amount(), dec!(50));
    assert!(all.iter().all(|s| s.status == SettlementStatus::Pending));

    // Nothing left open, so a second run settles nobody.
    assert!(h.services.settlements.liquidate_all(&h.admin, today, today).await.unwrap().is_empty());
}
