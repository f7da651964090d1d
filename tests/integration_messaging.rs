mod common;

use common::TestApp;
use internlink_sync::SyncError;
use internlink_sync::domain::NotificationCategory;
use internlink_sync::storage::MessageStore;

#[tokio::test]
async fn test_send_persists_and_notifies_receiver() {
    let app = TestApp::new();
    let mut alice = app.synchronizer_for(&app.alice);

    alice.send_message(app.bob.id, "hello").await.expect("send");

    assert_eq!(app.backend.message_count(), 1);

    let notifications = app.backend.delivered_notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].recipient_id, app.bob.id);
    assert_eq!(notifications[0].category, NotificationCategory::Message);
    assert_eq!(notifications[0].body, "hello");
}

#[tokio::test]
async fn test_whitespace_only_send_is_rejected_before_any_backend_call() {
    let app = TestApp::new();
    let mut alice = app.synchronizer_for(&app.alice);
    alice.open_conversation(app.bob.id).await.expect("open");

    let result = alice.send_message(app.bob.id, "   ").await;
    assert!(matches!(result, Err(SyncError::EmptyContent)));

    assert_eq!(app.backend.message_count(), 0, "nothing persisted");
    assert!(app.backend.delivered_notifications().await.is_empty(), "no notification fired");
    assert_eq!(alice.open_messages().expect("open").len(), 0, "local state untouched");
}

#[tokio::test]
async fn test_over_length_send_is_rejected_before_any_backend_call() {
    let app = TestApp::new();
    let mut alice = app.synchronizer_for(&app.alice);
    alice.open_conversation(app.bob.id).await.expect("open");

    let max = internlink_sync::config::MessagingConfig::default().max_content_len;
    let content = "a".repeat(max + 1);

    let result = alice.send_message(app.bob.id, &content).await;
    assert!(matches!(result, Err(SyncError::ContentTooLong { .. })));

    assert_eq!(app.backend.message_count(), 0, "nothing persisted");
    assert!(app.backend.delivered_notifications().await.is_empty(), "no notification fired");
    assert_eq!(alice.open_messages().expect("open").len(), 0, "local state untouched");

    // The limit counts characters, not bytes: multibyte content at the
    // ceiling still goes through.
    let widest = "誰".repeat(max);
    alice.send_message(app.bob.id, &widest).await.expect("send at the limit");
    assert_eq!(app.backend.message_count(), 1);
}

#[tokio::test]
async fn test_self_addressed_send_is_rejected() {
    let app = TestApp::new();
    let mut alice = app.synchronizer_for(&app.alice);

    let result = alice.send_message(app.alice.id, "note to self").await;
    assert!(matches!(result, Err(SyncError::SelfAddressed)));
    assert_eq!(app.backend.message_count(), 0);
}

#[tokio::test]
async fn test_send_to_unknown_recipient_is_rejected() {
    let app = TestApp::new();
    let mut alice = app.synchronizer_for(&app.alice);

    let result = alice.send_message(uuid::Uuid::new_v4(), "hello").await;
    assert!(matches!(result, Err(SyncError::UnknownProfile(_))));

    assert_eq!(app.backend.message_count(), 0);
    assert!(app.backend.delivered_notifications().await.is_empty());
}

#[tokio::test]
async fn test_sent_message_appears_once_via_feed_echo() {
    let app = TestApp::new();
    let mut alice = app.synchronizer_for(&app.alice);
    alice.open_conversation(app.bob.id).await.expect("open");

    let mut feed = app.backend.subscribe();
    alice.send_message(app.bob.id, "hello").await.expect("send");

    // The send itself must not have touched the open view.
    assert_eq!(alice.open_messages().expect("open").len(), 0);

    let event = feed.next().await.expect("insert event");
    alice.handle_event(event).await;

    let messages = alice.open_messages().expect("open");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "hello");

    let listed = alice.conversation(app.bob.id).expect("conversation");
    assert_eq!(listed.last_message.as_ref().expect("last").content, "hello");
    assert_eq!(listed.unread, 0, "own messages are never unread for the sender");
}

#[tokio::test]
async fn test_duplicate_feed_delivery_does_not_duplicate_messages() {
    let app = TestApp::new();
    let mut alice = app.synchronizer_for(&app.alice);
    alice.open_conversation(app.bob.id).await.expect("open");

    let mut feed = app.backend.subscribe();
    alice.send_message(app.bob.id, "hello").await.expect("send");

    let event = feed.next().await.expect("insert event");
    alice.handle_event(event.clone()).await;
    alice.handle_event(event).await;

    let messages = alice.open_messages().expect("open");
    assert_eq!(messages.len(), 1, "identifier-based dedup must hold");

    let mut ids: Vec<_> = messages.iter().map(|m| m.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), messages.len());
}

#[tokio::test]
async fn test_failed_notification_delivery_does_not_fail_the_send() {
    let app = TestApp::new();
    app.backend.set_fail_deliver(true);

    let mut alice = app.synchronizer_for(&app.alice);
    alice.send_message(app.bob.id, "hello").await.expect("send must still succeed");

    assert_eq!(app.backend.message_count(), 1);
    assert!(app.backend.delivered_notifications().await.is_empty());
}
