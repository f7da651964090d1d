mod common;

use common::TestApp;
use internlink_sync::storage::{ChangeEvent, MessageStore};

#[tokio::test]
async fn test_insert_event_appends_to_open_view_and_bumps_unread() {
    let app = TestApp::new();
    let mut bob = app.synchronizer_for(&app.bob);
    bob.open_conversation(app.alice.id).await.expect("open");

    let mut feed = app.backend.subscribe();
    let mut alice = app.synchronizer_for(&app.alice);
    alice.send_message(app.bob.id, "ping").await.expect("send");

    let event = feed.next().await.expect("insert event");
    bob.handle_event(event).await;

    let messages = bob.open_messages().expect("open");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "ping");

    // The list refresh sees the new message as unread; it is only marked
    // read when the conversation is opened again.
    assert_eq!(bob.conversation(app.alice.id).expect("alice").unread, 1);
}

#[tokio::test]
async fn test_insert_for_another_pair_refreshes_list_but_not_open_view() {
    let app = TestApp::new();
    let mut bob = app.synchronizer_for(&app.bob);
    bob.open_conversation(app.erin.id).await.expect("open");

    let mut feed = app.backend.subscribe();
    let mut alice = app.synchronizer_for(&app.alice);
    alice.send_message(app.bob.id, "ping").await.expect("send");

    let event = feed.next().await.expect("insert event");
    bob.handle_event(event).await;

    assert_eq!(bob.open_messages().expect("open with erin").len(), 0);
    assert_eq!(bob.conversation(app.alice.id).expect("alice").unread, 1);
}

#[tokio::test]
async fn test_update_event_refetches_open_history() {
    let app = TestApp::new();
    let mut alice = app.synchronizer_for(&app.alice);
    alice.send_message(app.bob.id, "hello").await.expect("send");
    alice.open_conversation(app.bob.id).await.expect("open");
    assert!(
        alice.open_messages().expect("open")[0].read_at.is_none(),
        "bob has not opened the conversation yet"
    );

    let mut feed = app.backend.subscribe();
    let mut bob = app.synchronizer_for(&app.bob);
    bob.open_conversation(app.alice.id).await.expect("open marks read");

    let event = feed.next().await.expect("update event");
    assert!(matches!(event, ChangeEvent::Updated(_)));
    alice.handle_event(event).await;

    assert!(
        alice.open_messages().expect("open")[0].read_at.is_some(),
        "read receipt propagated into the sender's open view"
    );
}

#[tokio::test]
async fn test_closed_view_discards_late_updates() {
    let app = TestApp::new();
    let mut alice = app.synchronizer_for(&app.alice);
    alice.send_message(app.bob.id, "hello").await.expect("send");
    alice.open_conversation(app.bob.id).await.expect("open");
    alice.close_conversation();

    let mut feed = app.backend.subscribe();
    let mut bob = app.synchronizer_for(&app.bob);
    bob.open_conversation(app.alice.id).await.expect("open marks read");

    let event = feed.next().await.expect("update event");
    alice.handle_event(event).await;

    assert!(alice.open_with().is_none(), "closed view stays closed");
    assert!(alice.drain_notices().is_empty());
}

#[tokio::test]
async fn test_events_not_involving_the_user_are_ignored() {
    let app = TestApp::new();
    let mut carol = app.synchronizer_for(&app.carol);

    let mut feed = app.backend.subscribe();
    let mut alice = app.synchronizer_for(&app.alice);
    alice.send_message(app.bob.id, "private").await.expect("send");

    let event = feed.next().await.expect("insert event");
    carol.handle_event(event).await;

    assert!(carol.conversations().is_empty(), "no reconciliation was triggered");
    assert!(carol.open_with().is_none());
}

#[tokio::test]
async fn test_lagged_feed_skips_and_keeps_receiving() {
    let app = TestApp::new();
    // Tiny channel so the unconsumed feed overflows.
    let backend = internlink_sync::storage::memory::MemoryBackend::new(1);
    backend.insert_profile(app.alice.clone());
    backend.insert_profile(app.bob.clone());

    let mut feed = backend.subscribe();
    for content in ["one", "two", "three"] {
        backend
            .insert(internlink_sync::domain::MessageDraft {
                sender_id: app.alice.id,
                receiver_id: app.bob.id,
                content: content.to_string(),
            })
            .await
            .expect("insert");
    }

    // The first two events were overwritten; the feed must skip them and
    // still deliver the latest one.
    let event = feed.next().await.expect("event after lag");
    match event {
        ChangeEvent::Inserted(message) => assert_eq!(message.content, "three"),
        other => panic!("expected insert, got {other:?}"),
    }
}

#[tokio::test]
async fn test_feed_is_a_scoped_resource() {
    let app = TestApp::new();
    assert_eq!(app.backend.feed_subscribers(), 0);

    let feed = app.backend.subscribe();
    let second = app.backend.subscribe();
    assert_eq!(app.backend.feed_subscribers(), 2);

    drop(feed);
    assert_eq!(app.backend.feed_subscribers(), 1);
    drop(second);
    assert_eq!(app.backend.feed_subscribers(), 0);
}
