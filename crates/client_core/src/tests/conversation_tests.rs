use chrono::{TimeZone, Utc};

use shared::domain::{DeliveryStatus, MediaKind, Message, Peer};

use super::*;

fn peer(id: &str) -> Peer {
    Peer {
        id: id.into(),
        username: format!("user-{id}"),
        avatar: None,
        online: false,
        last_seen: None,
    }
}

fn message(id: &str, sender: &str, receiver: &str, at_secs: i64) -> Message {
    Message {
        id: id.into(),
        sender_id: sender.into(),
        receiver_id: receiver.into(),
        content: Some(format!("content-{id}")),
        media_key: None,
        media_kind: None,
        created_at: Utc.timestamp_opt(at_secs, 0).unwrap(),
        status: Some(DeliveryStatus::Sent),
        is_read: false,
    }
}

#[test]
fn replace_history_sorts_ascending_and_replaces() {
    let mut conversation = Conversation::new(peer("alice"));
    conversation.append_optimistic(message("stale", "me", "alice", 99));

    conversation.replace_history(vec![
        message("h2", "alice", "me", 30),
        message("h1", "me", "alice", 10),
        message("h3", "me", "alice", 20),
    ]);

    let ids: Vec<&str> = conversation.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["h1", "h3", "h2"]);
}

#[test]
fn apply_seen_is_idempotent() {
    let mut conversation = Conversation::new(peer("alice"));
    conversation.replace_history(vec![
        message("h1", "me", "alice", 10),
        message("h2", "alice", "me", 20),
    ]);

    assert!(conversation.apply_seen(&"alice".into()));
    let after_first = conversation.messages.clone();
    assert!(!conversation.apply_seen(&"alice".into()));
    assert_eq!(conversation.messages, after_first);

    assert_eq!(
        conversation.messages[0].status,
        Some(DeliveryStatus::Seen)
    );
    assert!(conversation.messages[0].is_read);
}

#[test]
fn apply_seen_skips_other_receivers() {
    let mut conversation = Conversation::new(peer("alice"));
    conversation.replace_history(vec![
        message("to-alice", "me", "alice", 10),
        message("to-me", "alice", "me", 20),
    ]);

    conversation.apply_seen(&"alice".into());

    assert_eq!(
        conversation.messages[1].status,
        Some(DeliveryStatus::Sent),
        "messages addressed to someone else must be untouched"
    );
    assert!(!conversation.messages[1].is_read);
}

#[test]
fn apply_seen_on_empty_scope_is_a_silent_no_op() {
    let mut conversation = Conversation::new(peer("alice"));
    conversation.replace_history(vec![message("h1", "me", "alice", 10)]);

    assert!(!conversation.apply_seen(&"nobody".into()));
}

#[test]
fn optimistic_entries_keep_call_order_at_the_tail() {
    let mut conversation = Conversation::new(peer("alice"));
    conversation.replace_history(vec![message("h1", "alice", "me", 10)]);

    let first = Message::provisional("me".into(), "alice".into(), Some("one".into()), None);
    let second = Message::provisional("me".into(), "alice".into(), Some("two".into()), None);
    conversation.append_optimistic(first.clone());
    conversation.append_optimistic(second.clone());

    let tail: Vec<&str> = conversation.messages[1..]
        .iter()
        .map(|m| m.id.as_str())
        .collect();
    assert_eq!(tail, vec![first.id.as_str(), second.id.as_str()]);
    assert!(first.is_provisional());
    assert!(conversation.messages.last().expect("tail").status.is_none());
}

#[test]
fn reconcile_updates_provisional_in_place() {
    let mut conversation = Conversation::new(peer("alice"));
    conversation.replace_history(vec![message("h1", "alice", "me", 10)]);
    let provisional = Message::provisional("me".into(), "alice".into(), Some("hi".into()), None);
    conversation.append_optimistic(provisional.clone());

    conversation.reconcile_provisional(&provisional.id, message("srv-1", "me", "alice", 15));

    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[1].id.as_str(), "srv-1");
    assert!(conversation.messages.iter().all(|m| !m.is_provisional()));
}

#[test]
fn reconcile_inserts_in_order_when_provisional_was_superseded() {
    let mut conversation = Conversation::new(peer("alice"));
    conversation.replace_history(vec![
        message("h1", "alice", "me", 10),
        message("h2", "alice", "me", 30),
    ]);

    conversation.reconcile_provisional(&"local-gone".into(), message("srv-9", "me", "alice", 20));

    let ids: Vec<&str> = conversation.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["h1", "srv-9", "h2"]);
}

#[test]
fn reconcile_never_duplicates_a_known_server_id() {
    let mut conversation = Conversation::new(peer("alice"));
    let provisional = Message::provisional("me".into(), "alice".into(), Some("hi".into()), None);
    conversation.append_optimistic(provisional.clone());
    // A reload already hydrated the server copy of this message.
    conversation
        .messages
        .insert(0, message("srv-1", "me", "alice", 5));

    conversation.reconcile_provisional(&provisional.id, message("srv-1", "me", "alice", 5));

    let matching = conversation
        .messages
        .iter()
        .filter(|m| m.id.as_str() == "srv-1")
        .count();
    assert_eq!(matching, 1);
    assert!(conversation.messages.iter().all(|m| m.id != provisional.id));
}

#[test]
fn clear_staged_drops_draft_and_media() {
    let mut conversation = Conversation::new(peer("alice"));
    conversation.draft = "half-typed".to_string();
    conversation.staged_media = Some(MediaUpload {
        filename: "pic.png".to_string(),
        mime_type: "image/png".to_string(),
        bytes: vec![1, 2, 3],
        kind: MediaKind::Image,
    });

    conversation.clear_staged();

    assert!(conversation.draft.is_empty());
    assert!(conversation.staged_media.is_none());
}
