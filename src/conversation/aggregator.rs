use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;
use uuid::Uuid;

use crate::message::message_models::Message;

use super::conversation_models::{Conversation, ConversationContext, RefreshOutcome};

/// Stable sort by `(created_at, id)`.
pub fn sort_chronologically(messages: &mut [Message]) {
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

/// Groups the viewer's sent and received messages into per-partner
/// conversations, most recently active first.
///
/// A message id seen twice (self-addressed rows, overlapping fetches) is kept
/// once. Partners are visited in id order before the stable sort so equal
/// `last_message_time`s always come out in the same order.
pub fn build_conversations(
    sent: &[Message],
    received: &[Message],
    ctx: &ConversationContext,
) -> Vec<Conversation> {
    let mut seen = HashSet::new();
    let mut groups: BTreeMap<Uuid, Vec<Message>> = BTreeMap::new();

    for message in sent.iter().chain(received) {
        if !seen.insert(message.id) {
            continue;
        }
        groups
            .entry(message.partner_of(ctx.current_user_id))
            .or_default()
            .push(message.clone());
    }

    let mut conversations: Vec<Conversation> = groups
        .into_iter()
        .filter_map(|(partner_id, messages)| {
            Conversation::from_messages(partner_id, messages, ctx.current_user_id)
        })
        .collect();

    sort_by_recent_activity(&mut conversations);
    conversations
}

/// Stable sort, most recent `last_message_time` first.
pub fn sort_by_recent_activity(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
}

/// Reconciles a fresh poll of the open conversation with what is on screen.
///
/// Messages are merged by id so a short poll never hides history already
/// shown. For ids present on both sides the polled copy wins, except that a
/// message already read locally stays read.
pub fn refresh_conversation(
    existing: &[Message],
    polled: &[Message],
    ctx: &ConversationContext,
    already_marked: &HashSet<i64>,
) -> RefreshOutcome {
    let is_new = polled.len() > existing.len();

    let mut by_id: HashMap<i64, Message> = existing.iter().map(|m| (m.id, m.clone())).collect();
    let mut polled_ids = HashSet::with_capacity(polled.len());

    for message in polled {
        polled_ids.insert(message.id);
        let was_read = by_id.get(&message.id).is_some_and(|m| m.is_read);
        let mut message = message.clone();
        message.is_read |= was_read;
        by_id.insert(message.id, message);
    }

    let kept_locally = existing.iter().filter(|m| !polled_ids.contains(&m.id)).count();
    if kept_locally > 0 {
        debug!(
            kept_locally,
            polled = polled.len(),
            "Poll is missing messages already shown, keeping local copies"
        );
    }

    let mut merged: Vec<Message> = by_id.into_values().collect();
    sort_chronologically(&mut merged);

    let to_mark = merged
        .iter()
        .filter(|m| m.is_unread_for(ctx.current_user_id) && !already_marked.contains(&m.id))
        .map(|m| m.id)
        .collect();

    RefreshOutcome {
        merged,
        is_new,
        to_mark,
    }
}

/// Badge count across every conversation.
pub fn unread_total(conversations: &[Conversation]) -> i64 {
    conversations.iter().map(|c| c.unread_count).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_790_000_000 + secs, 0).unwrap()
    }

    fn msg(id: i64, sender_id: Uuid, receiver_id: Uuid, secs: i64, is_read: bool) -> Message {
        Message {
            id,
            sender_id,
            receiver_id,
            content: format!("message {}", id),
            is_read,
            created_at: at(secs),
        }
    }

    fn ids(messages: &[Message]) -> Vec<i64> {
        messages.iter().map(|m| m.id).collect()
    }

    #[test]
    fn test_empty_inputs_produce_no_conversations() {
        let ctx = ConversationContext::new(Uuid::new_v4());
        assert!(build_conversations(&[], &[], &ctx).is_empty());
    }

    #[test]
    fn test_two_participants_form_one_conversation() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ctx = ConversationContext::new(a);

        let sent = vec![msg(1, a, b, 10, true), msg(3, a, b, 30, false)];
        let received = vec![msg(2, b, a, 20, true), msg(4, b, a, 40, false)];

        let conversations = build_conversations(&sent, &received, &ctx);

        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].partner_id, b);
        assert_eq!(ids(&conversations[0].messages), vec![1, 2, 3, 4]);
        assert_eq!(conversations[0].last_message, "message 4");
        assert_eq!(conversations[0].last_message_time, at(40));
        // Message 3 is unread but addressed to b, not to the viewer.
        assert_eq!(conversations[0].unread_count, 1);
    }

    #[test]
    fn test_messages_sorted_by_time_then_id() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let ctx = ConversationContext::new(me);

        let received = vec![
            msg(9, other, me, 50, true),
            msg(5, other, me, 20, true),
            msg(7, other, me, 20, true),
            msg(6, other, me, 20, true),
            msg(1, other, me, 5, true),
        ];

        let conversations = build_conversations(&[], &received, &ctx);
        let messages = &conversations[0].messages;

        assert_eq!(ids(messages), vec![1, 5, 6, 7, 9]);
        for pair in messages.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
            if pair[0].created_at == pair[1].created_at {
                assert!(pair[0].id < pair[1].id);
            }
        }
    }

    #[test]
    fn test_conversations_ordered_by_latest_activity() {
        let me = Uuid::new_v4();
        let quiet = Uuid::new_v4();
        let busy = Uuid::new_v4();
        let ctx = ConversationContext::new(me);

        let sent = vec![msg(1, me, quiet, 10, false), msg(2, me, busy, 20, false)];
        let received = vec![msg(3, busy, me, 90, false), msg(4, quiet, me, 15, false)];

        let conversations = build_conversations(&sent, &received, &ctx);

        let partners: Vec<Uuid> = conversations.iter().map(|c| c.partner_id).collect();
        assert_eq!(partners, vec![busy, quiet]);
    }

    #[test]
    fn test_tied_conversations_keep_the_same_order() {
        let me = Uuid::new_v4();
        let ctx = ConversationContext::new(me);
        let partners: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();

        let received: Vec<Message> = partners
            .iter()
            .enumerate()
            .map(|(i, partner)| msg(i as i64 + 1, *partner, me, 100, false))
            .collect();
        let mut reversed = received.clone();
        reversed.reverse();

        let first = build_conversations(&[], &received, &ctx);
        let second = build_conversations(&[], &reversed, &ctx);

        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_ids_are_counted_once() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let ctx = ConversationContext::new(me);

        let received = vec![msg(1, other, me, 10, false)];
        let overlapping = received.clone();

        let conversations = build_conversations(&overlapping, &received, &ctx);

        assert_eq!(conversations[0].messages.len(), 1);
        assert_eq!(conversations[0].unread_count, 1);
    }

    #[test]
    fn test_unread_count_tracks_read_flips() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let ctx = ConversationContext::new(me);

        let mut received: Vec<Message> =
            (1..=5).map(|id| msg(id, other, me, id * 10, false)).collect();
        let sent = vec![msg(6, me, other, 60, false)];

        for flip in [2, 4, 4, 1] {
            if let Some(m) = received.iter_mut().find(|m| m.id == flip) {
                m.is_read = true;
            }
            let conversation = &build_conversations(&sent, &received, &ctx)[0];
            let expected = conversation
                .messages
                .iter()
                .filter(|m| m.receiver_id == me && !m.is_read)
                .count() as i64;
            assert_eq!(conversation.unread_count, expected);
        }

        assert_eq!(build_conversations(&sent, &received, &ctx)[0].unread_count, 2);
    }

    #[test]
    fn test_refresh_two_new_messages_arrive() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let ctx = ConversationContext {
            current_user_id: me,
            open_partner_id: Some(other),
        };

        let existing = vec![
            msg(1, other, me, 10, true),
            msg(2, other, me, 20, true),
            msg(3, other, me, 30, false),
        ];
        let mut polled = existing.clone();
        polled.push(msg(5, other, me, 50, false));
        polled.push(msg(4, other, me, 40, false));

        let outcome = refresh_conversation(&existing, &polled, &ctx, &HashSet::new());
        assert!(outcome.is_new);
        assert_eq!(ids(&outcome.merged), vec![1, 2, 3, 4, 5]);
        assert_eq!(outcome.to_mark, vec![3, 4, 5]);

        let marked: HashSet<i64> = [3].into_iter().collect();
        let outcome = refresh_conversation(&existing, &polled, &ctx, &marked);
        assert_eq!(outcome.to_mark, vec![4, 5]);
    }

    #[test]
    fn test_refresh_without_changes_is_not_new() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let ctx = ConversationContext::new(me);

        let existing = vec![msg(1, me, other, 10, false), msg(2, other, me, 20, true)];

        let outcome = refresh_conversation(&existing, &existing, &ctx, &HashSet::new());
        assert!(!outcome.is_new);
        assert_eq!(outcome.merged, existing);
        assert!(outcome.to_mark.is_empty());
    }

    #[test]
    fn test_refresh_keeps_history_missing_from_short_poll() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let ctx = ConversationContext::new(me);

        let existing = vec![
            msg(1, other, me, 10, true),
            msg(2, me, other, 20, false),
            msg(3, other, me, 30, true),
        ];
        let polled = vec![msg(1, other, me, 10, true), msg(3, other, me, 30, true)];

        let outcome = refresh_conversation(&existing, &polled, &ctx, &HashSet::new());
        assert!(!outcome.is_new);
        assert_eq!(ids(&outcome.merged), vec![1, 2, 3]);
    }

    #[test]
    fn test_refresh_never_shrinks_on_superset_poll() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let ctx = ConversationContext::new(me);

        let existing: Vec<Message> = (1..=4).map(|id| msg(id, other, me, id, true)).collect();
        for extra in 0..4 {
            let polled: Vec<Message> =
                (1..=4 + extra).map(|id| msg(id, other, me, id, true)).collect();
            let outcome = refresh_conversation(&existing, &polled, &ctx, &HashSet::new());
            assert!(outcome.merged.len() >= existing.len());
            assert_eq!(outcome.merged.len(), polled.len());
            assert_eq!(outcome.is_new, extra > 0);
        }
    }

    #[test]
    fn test_refresh_does_not_unread_a_read_message() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let ctx = ConversationContext::new(me);

        let existing = vec![msg(1, other, me, 10, true)];
        let lagging = vec![msg(1, other, me, 10, false)];

        let outcome = refresh_conversation(&existing, &lagging, &ctx, &HashSet::new());
        assert!(outcome.merged[0].is_read);
        assert!(outcome.to_mark.is_empty());
    }

    #[test]
    fn test_refresh_picks_up_read_flip_from_server() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let ctx = ConversationContext::new(other);

        // The partner read what `other` sent.
        let existing = vec![msg(1, other, me, 10, false)];
        let polled = vec![msg(1, other, me, 10, true)];

        let outcome = refresh_conversation(&existing, &polled, &ctx, &HashSet::new());
        assert!(outcome.merged[0].is_read);
    }

    #[test]
    fn test_unread_total_sums_badges() {
        let conversations: Vec<Conversation> = [2, 0, 5]
            .into_iter()
            .enumerate()
            .map(|(i, unread_count)| Conversation {
                partner_id: Uuid::from_u128(i as u128 + 1),
                messages: vec![],
                last_message: String::new(),
                last_message_time: at(0),
                unread_count,
            })
            .collect();

        assert_eq!(unread_total(&conversations), 7);
        assert_eq!(unread_total(&[]), 0);
    }
}
