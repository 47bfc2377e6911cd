use signmotion_engine::{CacheEvent, Conversation, ConversationCache, MessageEntry, TranslationStatus};

#[test]
fn test_update_touches_only_matching_message() {
    let cache = ConversationCache::new();
    let mut conversation = Conversation::new("c1");
    conversation.messages.push(MessageEntry::new("m1", TranslationStatus::Processing));
    conversation.messages.push(MessageEntry::new("m2", TranslationStatus::Completed));
    cache.put_conversation(conversation);
    let m2_before = cache.message("c1", "m2").unwrap();

    assert!(cache.update_message("c1", "m1", |entry| {
        entry.status = TranslationStatus::Completed;
        entry.output_preview = Some("HELLO".to_string());
    }));

    assert_eq!(cache.message("c1", "m2").unwrap(), m2_before);
    let m1 = cache.message("c1", "m1").unwrap();
    assert_eq!(m1.status, TranslationStatus::Completed);
    assert_eq!(m1.output_preview.as_deref(), Some("HELLO"));
}

#[test]
fn test_unknown_message_not_created() {
    let cache = ConversationCache::new();
    cache.put_conversation(Conversation::new("c1"));
    assert!(!cache.update_message("c1", "m3", |entry| entry.status = TranslationStatus::Failed));
    assert!(cache.conversation("c1").unwrap().messages.is_empty());
}

#[tokio::test]
async fn test_invalidate_is_broadcast_to_every_subscriber() {
    let cache = ConversationCache::new();
    let mut first = cache.subscribe();
    let mut second = cache.clone().subscribe();

    cache.invalidate("c1");
    let expected = CacheEvent::Invalidated {
        conversation_id: Some("c1".to_string()),
    };
    assert_eq!(first.recv().await.unwrap(), expected);
    assert_eq!(second.recv().await.unwrap(), expected);
    assert!(cache.is_stale("c1"));
    assert!(!cache.is_stale("c2"));
}
