mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::*;
use simone_storefront::application::catalog::{CategoryInput, ListFilter, ProductInput, MAX_PER_PAGE};
use simone_storefront::domain::aggregates::Product;
use simone_storefront::EcommerceError;

fn category(name: &str) -> CategoryInput {
    CategoryInput { name: name.into(), description: None, parent_id: None, active: true }
}

fn listing(vendor_id: Uuid, category_id: Option<Uuid>, name: &str, price: Decimal, publish: bool) -> ProductInput {
    ProductInput {
        vendor_id: Some(vendor_id),
        category_id,
        sku: format!("SKU-{}", &Uuid::now_v7().simple().to_string()[24..]),
        name: name.into(),
        description: String::new(),
        price,
        compare_at_price: None,
        shipping_cost: dec!(5),
        stock: 3,
        images: vec![],
        publish,
    }
}

async fn create(h: &Harness, input: ProductInput) -> Product {
    h.services.catalog.create_product(&h.admin, input).await.unwrap()
}

#[tokio::test]
async fn test_storefront_listing_filters() {
    let h = harness().await;
    let lighting = h.services.catalog.create_category(&h.admin, category("Iluminación")).await.unwrap();
    let seating = h.services.catalog.create_category(&h.admin, category("Asientos")).await.unwrap();
    let lamp = create(&h, listing(h.vendor.user_id, Some(lighting.id), "Lámpara de mesa", dec!(80), true)).await;
    let chair = create(&h, listing(h.other_vendor.user_id, Some(seating.id), "Silla tejida", dec!(120), true)).await;
    create(&h, listing(h.vendor.user_id, Some(lighting.id), "Lámpara borrador", dec!(60), false)).await;

    let by_category = h.services.catalog.list_products(ListFilter { category_id: Some(lighting.id), ..Default::default() }).await.unwrap();
    assert_eq!(by_category.total, 1);
    assert_eq!(by_category.data[0].id, lamp.id);

    let by_vendor = h.services.catalog.list_products(ListFilter { vendor_id: Some(h.other_vendor.user_id), ..Default::default() }).await.unwrap();
    assert_eq!(by_vendor.data.iter().map(|p| p.id).collect::<Vec<_>>(), vec![chair.id]);

    let by_text = h.services.catalog.list_products(ListFilter { search: Some("  LÁMPARA ".into()), ..Default::default() }).await.unwrap();
    assert_eq!(by_text.total, 1);
    assert_eq!(by_text.data[0].id, lamp.id);

    // Drafts only show up in the back office.
    let managed = h.services.catalog.list_managed_products(&h.vendor, ListFilter::default()).await.unwrap();
    assert_eq!(managed.total, 2);
    assert!(managed.data.iter().all(|p| p.vendor_id == h.vendor.user_id));
}

#[tokio::test]
async fn test_listing_pagination_is_clamped() {
    let h = harness().await;
    for n in 0..3 {
        product(&h, h.vendor.user_id, Decimal::from(10 + n), dec!(0), 1).await;
    }

    let page = h.services.catalog.list_products(ListFilter { page: Some(0), per_page: Some(0), ..Default::default() }).await.unwrap();
    assert_eq!((page.page, page.per_page), (1, 1));
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.total, 3);

    let page = h.services.catalog.list_products(ListFilter { per_page: Some(10_000), ..Default::default() }).await.unwrap();
    assert_eq!(page.per_page, MAX_PER_PAGE);
    assert_eq!(page.data.len(), 3);

    let past_end = h.services.catalog.list_products(ListFilter { page: Some(3), per_page: Some(2), ..Default::default() }).await.unwrap();
    assert!(past_end.data.is_empty());
    assert_eq!(past_end.total, 3);
}

#[tokio::test]
async fn test_category_writes_refresh_cached_list() {
    let h = harness().await;
    assert!(h.services.catalog.list_categories(false).await.unwrap().is_empty());

    let decor = h.services.catalog.create_category(&h.admin, category("Decoración")).await.unwrap();
    let listed = h.services.catalog.list_categories(false).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Decoración");

    h.services.catalog.update_category(&h.admin, decor.id, CategoryInput { active: false, ..category("Decoración") }).await.unwrap();
    assert!(h.services.catalog.list_categories(false).await.unwrap().is_empty());
    assert_eq!(h.services.catalog.list_categories(true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_product_writes_refresh_cached_detail() {
    let h = harness().await;
    let lamp = create(&h, listing(h.vendor.user_id, None, "Lámpara", dec!(80), true)).await;
    assert_eq!(h.services.catalog.product_detail(lamp.id).await.unwrap().price.amount(), dec!(80));

    h.services.catalog.update_product(&h.vendor, lamp.id, listing(h.vendor.user_id, None, "Lámpara", dec!(95), true)).await.unwrap();
    assert_eq!(h.services.catalog.product_detail(lamp.id).await.unwrap().price.amount(), dec!(95));

    h.services.catalog.adjust_stock(&h.vendor, lamp.id, 4).await.unwrap();
    assert_eq!(h.services.catalog.product_detail(lamp.id).await.unwrap().stock.value(), 7);

    h.services.catalog.archive_product(&h.vendor, lamp.id).await.unwrap();
    let err = h.services.catalog.product_detail(lamp.id).await.unwrap_err();
    assert!(matches!(err, EcommerceError::NotFound { .. }));
}

#[tokio::test]
async fn test_category_in_use_cannot_be_deleted() {
    let h = harness().await;
    let lighting = h.services.catalog.create_category(&h.admin, category("Iluminación")).await.unwrap();
    let lamp = create(&h, listing(h.vendor.user_id, Some(lighting.id), "Lámpara", dec!(80), true)).await;

    let err = h.services.catalog.delete_category(&h.vendor, lighting.id).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Forbidden(_)));
    let err = h.services.catalog.delete_category(&h.admin, lighting.id).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Conflict(_)));
    assert!(h.services.catalog.get_category(lighting.id).await.is_ok());

    h.services.catalog.update_product(&h.vendor, lamp.id, listing(h.vendor.user_id, None, "Lámpara", dec!(80), true)).await.unwrap();
    h.services.catalog.delete_category(&h.admin, lighting.id).await.unwrap();
    assert!(h.services.catalog.list_categories(true).await.unwrap().is_empty());
    let err = h.services.catalog.delete_category(&h.admin, lighting.id).await.unwrap_err();
    assert!(matches!(err, EcommerceError::NotFound { .. }));
}
