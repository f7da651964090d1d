#![allow(dead_code)]

use internlink_sync::config::MessagingConfig;
use internlink_sync::domain::{Profile, Role};
use internlink_sync::services::synchronizer::ConversationSynchronizer;
use internlink_sync::storage::memory::MemoryBackend;
use internlink_sync::storage::{MessageStore, NotificationSink, ProfileStore};
use internlink_sync::telemetry;
use std::sync::Arc;
use uuid::Uuid;

pub fn profile(name: &str, role: Role) -> Profile {
    Profile {
        id: Uuid::new_v4(),
        display_name: name.to_string(),
        role,
        contact_number: None,
    }
}

/// One in-memory backend shared by every synchronizer in a test, plus a
/// small cast of programme participants.
pub struct TestApp {
    pub backend: Arc<MemoryBackend>,
    pub alice: Profile,
    pub erin: Profile,
    pub bob: Profile,
    pub carol: Profile,
}

impl TestApp {
    pub fn new() -> Self {
        telemetry::init_test_tracing();
        let backend = Arc::new(MemoryBackend::default());

        let alice = profile("alice", Role::Intern);
        let erin = profile("erin", Role::Intern);
        let bob = profile("bob", Role::Supervisor);
        let carol = profile("carol", Role::Supervisor);

        for p in [&alice, &erin, &bob, &carol] {
            backend.insert_profile(p.clone());
        }

        Self { backend, alice, erin, bob, carol }
    }

    pub fn synchronizer_for(&self, user: &Profile) -> ConversationSynchronizer {
        ConversationSynchronizer::new(
            user,
            Arc::clone(&self.backend) as Arc<dyn MessageStore>,
            Arc::clone(&self.backend) as Arc<dyn ProfileStore>,
            Arc::clone(&self.backend) as Arc<dyn NotificationSink>,
            MessagingConfig::default(),
        )
    }
}
