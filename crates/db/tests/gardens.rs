//! Integration tests for users, gardens and garden membership.

mod common;

use common::{create_garden, create_user, setup_test_pool};
use db::models::{
    garden::{Garden, GardenFilter, GardenMember, GardenRole, UpdateGarden},
    user::{CreateUser, User},
};
use utils::pagination::{PageParams, Pagination};

#[tokio::test]
async fn test_user_email_is_unique_case_insensitively() {
    let (pool, _temp_dir) = setup_test_pool().await;
    create_user(&pool, "Ada").await;

    let duplicate = CreateUser {
        name: "Other Ada".to_string(),
        email: "  ADA@example.test ".to_string(),
        password_hash: "hash".to_string(),
        role: Default::default(),
    };
    let err = User::create(&pool, &duplicate).await.unwrap_err();
    assert!(
        err.as_database_error()
            .is_some_and(|e| e.is_unique_violation())
    );

    let found = User::find_by_email(&pool, "Ada@Example.Test")
        .await
        .unwrap()
        .expect("lookup should ignore case");
    assert_eq!(found.name, "Ada");
}

#[tokio::test]
async fn test_password_hash_is_never_serialized() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let user = create_user(&pool, "Grace").await;

    let json = serde_json::to_value(&user).unwrap();
    assert!(json.get("password_hash").is_none());
    assert_eq!(json["email"], "grace@example.test");
}

#[tokio::test]
async fn test_create_garden_registers_owner_membership() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let garden = create_garden(&pool, &owner, "Riverside Beds", true).await;

    let membership = GardenMember::find(&pool, garden.id, owner.id)
        .await
        .unwrap()
        .expect("owner should be a member");
    assert_eq!(membership.role, GardenRole::Owner);

    let fetched = Garden::find_by_id(&pool, garden.id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "Riverside Beds");
    assert_eq!(fetched.location, "Riverside");
    assert_eq!(fetched.size_sqm, Some(250.0));
    assert!(fetched.is_public);
}

#[tokio::test]
async fn test_private_gardens_are_hidden_from_non_members() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let outsider = create_user(&pool, "Outsider").await;

    create_garden(&pool, &owner, "Public Plot", true).await;
    let private = create_garden(&pool, &owner, "Private Plot", false).await;

    let filter = GardenFilter {
        visible_to: Some(outsider.id),
        ..Default::default()
    };
    let page = Garden::list(&pool, &filter, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].name, "Public Plot");

    GardenMember::add(&pool, private.id, outsider.id, GardenRole::Member)
        .await
        .unwrap();
    let page = Garden::list(&pool, &filter, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn test_garden_listing_keeps_insertion_order_and_honours_sort() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    for name in ["Charlie", "Alpha", "Bravo"] {
        create_garden(&pool, &owner, name, true).await;
    }

    let default = Garden::list(&pool, &GardenFilter::default(), &Pagination::default())
        .await
        .unwrap();
    let names: Vec<_> = default.items.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["Charlie", "Alpha", "Bravo"]);

    let sorted = PageParams {
        page: Some(1),
        limit: Some(2),
        sort: Some("-name".to_string()),
    }
    .resolve(db::models::garden::SORTABLE)
    .unwrap();
    let page = Garden::list(&pool, &GardenFilter::default(), &sorted)
        .await
        .unwrap();
    let names: Vec<_> = page.items.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["Charlie", "Bravo"]);
    assert_eq!(page.total, 3);
    assert_eq!(page.limit, 2);
}

#[tokio::test]
async fn test_search_treats_wildcards_literally() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    create_garden(&pool, &owner, "100% Organic", true).await;
    create_garden(&pool, &owner, "1000 Oaks", true).await;
    create_garden(&pool, &owner, "Bee_Friendly", true).await;
    create_garden(&pool, &owner, "Beet Friendly", true).await;

    let search = |term: &str| GardenFilter {
        search: Some(term.to_string()),
        ..Default::default()
    };

    let page = Garden::list(&pool, &search("0%"), &Pagination::default())
        .await
        .unwrap();
    let names: Vec<_> = page.items.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["100% Organic"]);

    let page = Garden::list(&pool, &search("Bee_"), &Pagination::default())
        .await
        .unwrap();
    let names: Vec<_> = page.items.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["Bee_Friendly"]);
}

#[tokio::test]
async fn test_update_garden_keeps_unspecified_fields() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let garden = create_garden(&pool, &owner, "Before", true).await;

    let updated = Garden::update(
        &pool,
        garden.id,
        &UpdateGarden {
            name: Some("After".to_string()),
            is_public: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.name, "After");
    assert!(!updated.is_public);
    assert_eq!(updated.location, garden.location);
    assert_eq!(updated.description, garden.description);
}

#[tokio::test]
async fn test_deleting_garden_cascades_to_members() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let member = create_user(&pool, "Member").await;
    let garden = create_garden(&pool, &owner, "Short-lived", true).await;
    GardenMember::add(&pool, garden.id, member.id, GardenRole::SecondAdmin)
        .await
        .unwrap();

    assert_eq!(Garden::delete(&pool, garden.id).await.unwrap(), 1);

    let memberships = GardenMember::memberships_for_user(&pool, member.id)
        .await
        .unwrap();
    assert!(memberships.is_empty());
}

#[tokio::test]
async fn test_duplicate_membership_is_rejected() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let member = create_user(&pool, "Member").await;
    let garden = create_garden(&pool, &owner, "Roster", true).await;

    GardenMember::add(&pool, garden.id, member.id, GardenRole::Member)
        .await
        .unwrap();
    let err = GardenMember::add(&pool, garden.id, member.id, GardenRole::Member)
        .await
        .unwrap_err();
    assert!(
        err.as_database_error()
            .is_some_and(|e| e.is_unique_violation())
    );

    let roster = GardenMember::list_profiles(&pool, garden.id).await.unwrap();
    assert_eq!(roster.len(), 2);
    assert_eq!(roster[0].user_id, owner.id);
    assert_eq!(roster[1].role, GardenRole::Member);
}
