mod common;

use common::*;
use simone_storefront::application::users::UserInput;
use simone_storefront::domain::aggregates::Role;
use simone_storefront::EcommerceError;

fn vendor_input(email: &str) -> UserInput {
    UserInput {
        email: email.into(),
        full_name: "Rosa Mamani".into(),
        role: Role::Vendor,
        password: Some("tejidos-2024".into()),
        store_name: Some("Tejidos Rosa".into()),
        phone: Some("+51 987 654 321".into()),
        active: true,
    }
}

fn admin_input(h: &Harness) -> UserInput {
    UserInput {
        email: h.admin.email.clone(),
        full_name: "admin".into(),
        role: Role::Admin,
        password: None,
        store_name: None,
        phone: None,
        active: true,
    }
}

#[tokio::test]
async fn test_admin_creates_lists_and_edits_users() {
    let h = harness().await;
    let created = h.services.users.create(&h.admin, vendor_input("Rosa@Tejidos.pe")).await.unwrap();
    assert_eq!(created.email, "rosa@tejidos.pe");
    assert_eq!(created.role, Role::Vendor);
    assert!(h.services.auth.login("rosa@tejidos.pe", "tejidos-2024", None).await.is_ok());

    let vendors = h.services.users.list(&h.admin, Some(Role::Vendor)).await.unwrap();
    assert_eq!(vendors.len(), 3);
    assert_eq!(h.services.users.list(&h.admin, None).await.unwrap().len(), 5);

    let err = h.services.users.create(&h.admin, vendor_input("rosa@tejidos.pe")).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Conflict(_)));
    let err = h.services.users.create(&h.admin, UserInput { store_name: None, ..vendor_input("sin@tienda.pe") }).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation(_)));
    let err = h.services.users.create(&h.admin, UserInput { password: Some("corta".into()), ..vendor_input("corta@tienda.pe") }).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation(_)));

    // An empty password on update keeps the current one.
    let updated = h.services.users
        .update(&h.admin, created.id, UserInput { password: Some(String::new()), store_name: Some("Tejidos Andinos".into()), ..vendor_input("rosa@tejidos.pe") })
        .await
        .unwrap();
    assert_eq!(updated.store_name.as_deref(), Some("Tejidos Andinos"));
    assert!(h.services.auth.login("rosa@tejidos.pe", "tejidos-2024", None).await.is_ok());

    let err = h.services.users.update(&h.admin, created.id, vendor_input(&h.customer.email)).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Conflict(_)));
}

#[tokio::test]
async fn test_deactivated_user_loses_access() {
    let h = harness().await;
    let created = h.services.users.create(&h.admin, vendor_input("rosa@tejidos.pe")).await.unwrap();
    let session = h.services.auth.login("rosa@tejidos.pe", "tejidos-2024", None).await.unwrap();

    let disabled = h.services.users.deactivate(&h.admin, created.id).await.unwrap();
    assert!(!disabled.active);
    let err = h.services.auth.authenticate(&session.token).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Unauthorized));
    let err = h.services.auth.login("rosa@tejidos.pe", "tejidos-2024", None).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Forbidden(_)));
}

#[tokio::test]
async fn test_admins_cannot_demote_or_disable_themselves() {
    let h = harness().await;
    let id = h.admin.user_id;

    let err = h.services.users.update(&h.admin, id, UserInput { role: Role::Customer, ..admin_input(&h) }).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation(_)));
    let err = h.services.users.update(&h.admin, id, UserInput { active: false, ..admin_input(&h) }).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation(_)));
    let err = h.services.users.deactivate(&h.admin, id).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation(_)));

    let me = h.services.users.get(&h.admin, id).await.unwrap();
    assert_eq!(me.role, Role::Admin);
    assert!(me.active);
    assert!(h.services.users.update(&h.admin, id, UserInput { full_name: "Administración".into(), ..admin_input(&h) }).await.is_ok());
}

#[tokio::test]
async fn test_user_admin_is_admin_only() {
    let h = harness().await;
    let err = h.services.users.list(&h.vendor, None).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Forbidden(_)));
    let err = h.services.users.create(&h.customer, vendor_input("rosa@tejidos.pe")).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Forbidden(_)));
    let err = h.services.users.deactivate(&h.vendor, h.customer.user_id).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Forbidden(_)));
}
