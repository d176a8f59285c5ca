//! Integration tests for posts, notifications, audit logs, QR codes and chat history.

mod common;

use common::{create_garden, create_user, setup_test_pool};
use db::models::{
    audit_log::{AuditLog, AuditLogFilter, NewAuditLog},
    chat_message::ChatMessage,
    notification::{CreateNotification, Notification, NotificationKind},
    plot::{CreatePlot, Plot},
    post::{CreatePost, Post, PostFilter, UpdatePost},
    qr_code::QrCode,
};
use serde_json::json;
use utils::pagination::Pagination;

#[tokio::test]
async fn test_posts_filter_by_tag() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let author = create_user(&pool, "Author").await;

    let tomato = Post::create(
        &pool,
        author.id,
        &CreatePost {
            garden_id: None,
            title: "Blight again".to_string(),
            content: "Any tips?".to_string(),
            tags: vec!["Tomatoes".to_string(), "disease".to_string()],
        },
    )
    .await
    .unwrap();
    assert_eq!(tomato.tags.0, vec!["tomatoes", "disease"]);

    Post::create(
        &pool,
        author.id,
        &CreatePost {
            garden_id: None,
            title: "Compost ratios".to_string(),
            content: "Browns vs greens".to_string(),
            tags: vec!["compost".to_string()],
        },
    )
    .await
    .unwrap();

    let filter = PostFilter {
        tag: Some("TOMATOES".to_string()),
        ..Default::default()
    };
    let page = Post::list(&pool, &filter, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, tomato.id);

    let updated = Post::update(
        &pool,
        tomato.id,
        &UpdatePost {
            tags: Some(vec!["solved".to_string()]),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.title, "Blight again");
    assert_eq!(updated.tags.0, vec!["solved"]);
}

#[tokio::test]
async fn test_post_listing_hides_private_gardens_from_outsiders() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let outsider = create_user(&pool, "Outsider").await;
    let walled = create_garden(&pool, &owner, "Walled", false).await;
    let commons = create_garden(&pool, &owner, "Commons", true).await;

    for (garden_id, title) in [
        (Some(walled.id), "Gate code"),
        (Some(commons.id), "Open day"),
        (None, "Platform news"),
    ] {
        Post::create(
            &pool,
            owner.id,
            &CreatePost {
                garden_id,
                title: title.to_string(),
                content: "Details inside".to_string(),
                tags: Vec::new(),
            },
        )
        .await
        .unwrap();
    }

    let visible = |user_id| PostFilter {
        visible_to: Some(user_id),
        ..Default::default()
    };

    let page = Post::list(&pool, &visible(outsider.id), &Pagination::default())
        .await
        .unwrap();
    let titles: Vec<_> = page.items.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, ["Open day", "Platform news"]);

    let page = Post::list(&pool, &visible(owner.id), &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 3);
}

#[tokio::test]
async fn test_notifications_read_flow() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let user = create_user(&pool, "Reader").await;

    let mut ids = Vec::new();
    for title in ["One", "Two", "Three"] {
        let n = Notification::create(
            &pool,
            &CreateNotification {
                user_id: user.id,
                title: title.to_string(),
                message: "hello".to_string(),
                kind: Some(NotificationKind::Task),
                link: None,
            },
        )
        .await
        .unwrap();
        ids.push(n.id);
    }
    assert_eq!(Notification::unread_count(&pool, user.id).await.unwrap(), 3);

    let read = Notification::mark_read(&pool, ids[0]).await.unwrap();
    let first_read_at = read.read_at.expect("read_at should be set");
    let again = Notification::mark_read(&pool, ids[0]).await.unwrap();
    assert_eq!(again.read_at, Some(first_read_at));

    let unread = Notification::list_for_user(&pool, user.id, true, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(unread.total, 2);

    assert_eq!(Notification::mark_all_read(&pool, user.id).await.unwrap(), 2);
    assert_eq!(Notification::unread_count(&pool, user.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_audit_log_records_details() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let actor = create_user(&pool, "Actor").await;
    let garden = create_garden(&pool, &actor, "Audited", true).await;

    AuditLog::record(
        &pool,
        NewAuditLog {
            actor_id: Some(actor.id),
            action: "garden.create".to_string(),
            entity_type: "garden".to_string(),
            entity_id: Some(garden.id),
            details: json!({ "name": "Audited" }),
        },
    )
    .await
    .unwrap();
    AuditLog::record(
        &pool,
        NewAuditLog {
            actor_id: None,
            action: "user.register".to_string(),
            entity_type: "user".to_string(),
            entity_id: Some(actor.id),
            details: json!({}),
        },
    )
    .await
    .unwrap();

    let filter = AuditLogFilter {
        entity_type: Some("garden".to_string()),
        ..Default::default()
    };
    let page = AuditLog::list(&pool, &filter, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].details.0["name"], "Audited");
}

#[tokio::test]
async fn test_qr_code_scans_are_counted() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let garden = create_garden(&pool, &owner, "Codes", true).await;
    let plot = Plot::create(
        &pool,
        garden.id,
        &CreatePlot {
            name: "Bed 2".to_string(),
            size_sqm: None,
            soil_type: None,
        },
    )
    .await
    .unwrap();

    let code = QrCode::create(&pool, plot.id, owner.id, "abc123").await.unwrap();
    assert_eq!(code.scan_count, 0);

    QrCode::record_scan(&pool, "abc123").await.unwrap();
    let scanned = QrCode::record_scan(&pool, "abc123")
        .await
        .unwrap()
        .expect("code exists");
    assert_eq!(scanned.scan_count, 2);
    assert_eq!(scanned.plot_id, plot.id);

    assert!(QrCode::record_scan(&pool, "missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_chat_history_is_oldest_first_per_room() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let sender = create_user(&pool, "Sender").await;
    let room = create_garden(&pool, &sender, "Room", true).await;
    let other = create_garden(&pool, &sender, "Other", true).await;

    for content in ["first", "second"] {
        ChatMessage::create(&pool, room.id, sender.id, content)
            .await
            .unwrap();
    }
    ChatMessage::create(&pool, other.id, sender.id, "elsewhere")
        .await
        .unwrap();

    let history = ChatMessage::list_for_garden(&pool, room.id, &Pagination::default())
        .await
        .unwrap();
    let contents: Vec<_> = history.items.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["first", "second"]);
    assert_eq!(history.total, 2);
}
