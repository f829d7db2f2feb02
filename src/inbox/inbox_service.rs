use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::conversation::{
    build_conversations, refresh_conversation, sort_by_recent_activity, sort_chronologically,
    unread_total, Conversation, ConversationContext,
};
use crate::error::InboxError;
use crate::message::{Message, MessageDirection};

use super::inbox_client::MessageSource;
use super::inbox_models::{InboxSnapshot, OpenConversation, PollIntervals};
use super::read_tracker::ReadTracker;

type SendReply = oneshot::Sender<Result<Message, InboxError>>;

enum Command {
    Open(Uuid),
    Close,
    Send {
        receiver_id: Uuid,
        content: String,
        reply: SendReply,
    },
    Shutdown,
}

/// One list refresh. The badge is fetched alongside but fails on its own.
struct ListFetch {
    messages: Result<(Vec<Message>, Vec<Message>), InboxError>,
    server_unread: Result<i64, InboxError>,
}

enum Event {
    ListFetched(ListFetch),
    ConversationFetched {
        partner_id: Uuid,
        result: Result<Vec<Message>, InboxError>,
    },
    MarkedRead(i64),
    MarkReadFailed {
        message_id: i64,
        error: InboxError,
    },
    Sent {
        reply: SendReply,
        result: Result<Message, InboxError>,
    },
}

/// Control side of a running [`Inbox`].
pub struct InboxHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<InboxSnapshot>,
    task: JoinHandle<()>,
}

impl InboxHandle {
    /// Shows a conversation and starts polling it. Any previously open
    /// conversation stops polling first.
    pub fn open(&self, partner_id: Uuid) -> Result<(), InboxError> {
        self.command(Command::Open(partner_id))
    }

    pub fn close(&self) -> Result<(), InboxError> {
        self.command(Command::Close)
    }

    /// On failure nothing is added locally, so the caller can keep the draft.
    pub async fn send(
        &self,
        receiver_id: Uuid,
        content: impl Into<String>,
    ) -> Result<Message, InboxError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(InboxError::EmptyMessage);
        }

        let (reply, response) = oneshot::channel();
        self.command(Command::Send {
            receiver_id,
            content,
            reply,
        })?;

        response.await.map_err(|_| InboxError::Closed)?
    }

    pub fn snapshot(&self) -> InboxSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<InboxSnapshot> {
        self.snapshots.clone()
    }

    /// Stops both refresh loops and waits for the inbox task to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            error!("Inbox task ended abnormally: {}", e);
        }
    }

    fn command(&self, command: Command) -> Result<(), InboxError> {
        self.commands.send(command).map_err(|_| InboxError::Closed)
    }
}

/// Client-side inbox for one user.
///
/// All state lives in a single task. Two timers feed it: the list timer
/// (conversation list and unread badge) runs for the inbox's lifetime, the
/// conversation timer only while a conversation is open and is restarted on
/// every switch. Each tick spawns its fetch, so a slow request never delays
/// the other timer. A timer skips its tick while its previous fetch is still
/// pending, and every fetch gives up after `fetch_timeout`. Results for a
/// conversation that is no longer open are dropped.
pub struct Inbox<S: MessageSource> {
    source: Arc<S>,
    intervals: PollIntervals,
    ctx: ConversationContext,
    conversations: Vec<Conversation>,
    open: Option<OpenConversation>,
    tracker: ReadTracker,
    /// Sent this session and not yet seen in a list result.
    pending_sent: Vec<Message>,
    server_unread: Option<i64>,
    list_stale: bool,
    conversation_stale: bool,
    events: mpsc::UnboundedSender<Event>,
    list_timer: Option<JoinHandle<()>>,
    conversation_timer: Option<JoinHandle<()>>,
    snapshots: watch::Sender<InboxSnapshot>,
}

impl<S: MessageSource> Inbox<S> {
    pub fn spawn(source: Arc<S>, user_id: Uuid, intervals: PollIntervals) -> InboxHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, snapshots_rx) = watch::channel(InboxSnapshot::default());

        let inbox = Inbox::new(source, user_id, intervals.clamped(), events_tx, snapshots_tx);
        let task = tokio::spawn(inbox.run(commands_rx, events_rx));

        InboxHandle {
            commands: commands_tx,
            snapshots: snapshots_rx,
            task,
        }
    }

    fn new(
        source: Arc<S>,
        user_id: Uuid,
        intervals: PollIntervals,
        events: mpsc::UnboundedSender<Event>,
        snapshots: watch::Sender<InboxSnapshot>,
    ) -> Self {
        Inbox {
            source,
            intervals,
            ctx: ConversationContext::new(user_id),
            conversations: Vec::new(),
            open: None,
            tracker: ReadTracker::new(),
            pending_sent: Vec::new(),
            server_unread: None,
            list_stale: false,
            conversation_stale: false,
            events,
            list_timer: None,
            conversation_timer: None,
            snapshots,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        info!("Inbox started for user {}", self.ctx.current_user_id);
        self.list_timer = Some(self.spawn_list_timer());

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Some(event) = events.recv() => self.handle_event(event),
            }
        }

        self.stop_conversation_timer();
        if let Some(timer) = self.list_timer.take() {
            timer.abort();
        }
        info!("Inbox stopped for user {}", self.ctx.current_user_id);
    }

    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Open(partner_id) => self.open_conversation(partner_id),
            Command::Close => self.close_conversation(),
            Command::Send {
                receiver_id,
                content,
                reply,
            } => self.start_send(receiver_id, content, reply),
            Command::Shutdown => return false,
        }
        true
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::ListFetched(fetch) => self.apply_list(fetch),
            Event::ConversationFetched { partner_id, result } => {
                if !self.ctx.is_open(partner_id) {
                    debug!("Discarding refresh for {}, no longer open", partner_id);
                    return;
                }
                match result {
                    Ok(polled) => self.apply_conversation(polled),
                    Err(error) => {
                        log_fetch_failure("open conversation", &error);
                        self.conversation_stale = true;
                        self.publish();
                    }
                }
            }
            Event::MarkedRead(message_id) => self.apply_read(message_id),
            Event::MarkReadFailed { message_id, error } => {
                warn!("Marking message {} as read failed, will retry: {}", message_id, error);
                self.tracker.release(message_id);
            }
            Event::Sent { reply, result } => {
                match &result {
                    Ok(message) => self.apply_sent(message.clone()),
                    Err(error) => warn!("Sending message failed: {}", error),
                }
                let _ = reply.send(result);
            }
        }
    }

    fn open_conversation(&mut self, partner_id: Uuid) {
        if self.ctx.is_open(partner_id) {
            return;
        }
        self.stop_conversation_timer();

        // Show what the list already knows until the first poll lands.
        let messages = self
            .conversations
            .iter()
            .find(|c| c.partner_id == partner_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default();

        self.ctx.open_partner_id = Some(partner_id);
        self.open = Some(OpenConversation {
            partner_id,
            messages,
            has_new: false,
        });
        self.conversation_stale = false;
        self.conversation_timer = Some(self.spawn_conversation_timer(partner_id));

        debug!("Opened conversation with {}", partner_id);
        self.publish();
    }

    fn close_conversation(&mut self) {
        self.stop_conversation_timer();
        if let Some(open) = self.open.take() {
            debug!("Closed conversation with {}", open.partner_id);
        }
        self.ctx.open_partner_id = None;
        self.conversation_stale = false;
        self.publish();
    }

    fn start_send(&self, receiver_id: Uuid, content: String, reply: SendReply) {
        let source = self.source.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = source.send_message(receiver_id, &content).await;
            let _ = events.send(Event::Sent { reply, result });
        });
    }

    fn apply_list(&mut self, fetch: ListFetch) {
        match fetch.server_unread {
            Ok(count) => self.server_unread = Some(count),
            Err(error) => warn!("Refreshing unread badge failed, keeping last value: {}", error),
        }

        match fetch.messages {
            Ok((sent, received)) => self.rebuild_list(sent, received),
            Err(error) => {
                log_fetch_failure("conversation list", &error);
                self.list_stale = true;
            }
        }

        self.publish();
    }

    fn rebuild_list(&mut self, mut sent: Vec<Message>, mut received: Vec<Message>) {
        // Reads issued this session may not have reached the server yet.
        let issued = self.tracker.issued();
        for message in received.iter_mut() {
            if issued.contains(&message.id) {
                message.is_read = true;
            }
        }

        // Nor may sends.
        self.pending_sent
            .retain(|pending| !sent.iter().any(|m| m.id == pending.id));
        sent.extend(self.pending_sent.iter().cloned());

        self.conversations = build_conversations(&sent, &received, &self.ctx);
        self.sync_open_into_list();

        if let Some(server) = self.server_unread {
            let local = unread_total(&self.conversations);
            if local != server {
                debug!(local, server, "Unread counts disagree");
            }
        }

        self.list_stale = false;
    }

    fn apply_conversation(&mut self, polled: Vec<Message>) {
        let Some(open) = self.open.as_mut() else {
            return;
        };

        let outcome = refresh_conversation(&open.messages, &polled, &self.ctx, self.tracker.issued());
        if outcome.is_new {
            debug!(
                "{} new message(s) with {}",
                outcome.merged.len().saturating_sub(open.messages.len()),
                open.partner_id
            );
        }
        open.messages = outcome.merged;
        open.has_new = outcome.is_new;

        self.conversation_stale = false;
        self.issue_mark_read(outcome.to_mark);
        self.sync_open_into_list();
        self.publish();
    }

    fn apply_read(&mut self, message_id: i64) {
        let user_id = self.ctx.current_user_id;

        if let Some(open) = self.open.as_mut() {
            if let Some(message) = open.messages.iter_mut().find(|m| m.id == message_id) {
                message.is_read = true;
            }
        }
        for conversation in self.conversations.iter_mut() {
            if mark_read_in(conversation, message_id, user_id) {
                break;
            }
        }

        self.publish();
    }

    fn apply_sent(&mut self, message: Message) {
        let user_id = self.ctx.current_user_id;
        let partner_id = message.partner_of(user_id);
        info!("Message {} sent to {}", message.id, partner_id);

        if let Some(open) = self.open.as_mut().filter(|o| o.partner_id == partner_id) {
            if !open.messages.iter().any(|m| m.id == message.id) {
                open.messages.push(message.clone());
                sort_chronologically(&mut open.messages);
            }
        }

        let mut messages = self
            .conversations
            .iter()
            .position(|c| c.partner_id == partner_id)
            .map(|i| self.conversations.remove(i).messages)
            .unwrap_or_default();
        if !messages.iter().any(|m| m.id == message.id) {
            messages.push(message.clone());
        }
        if let Some(conversation) = Conversation::from_messages(partner_id, messages, user_id) {
            self.conversations.push(conversation);
        }
        sort_by_recent_activity(&mut self.conversations);

        self.pending_sent.push(message);
        self.publish();
    }

    fn issue_mark_read(&mut self, ids: Vec<i64>) {
        for message_id in self.tracker.claim(ids) {
            let source = self.source.clone();
            let events = self.events.clone();

            tokio::spawn(async move {
                let event = match source.mark_read(message_id).await {
                    Ok(()) => Event::MarkedRead(message_id),
                    Err(error) => Event::MarkReadFailed { message_id, error },
                };
                let _ = events.send(event);
            });
        }
    }

    /// Folds the open conversation into its list entry so the list never
    /// lags behind what is on screen.
    fn sync_open_into_list(&mut self) {
        let Some(open) = &self.open else {
            return;
        };

        let position = self
            .conversations
            .iter()
            .position(|c| c.partner_id == open.partner_id);
        let listed = position
            .map(|i| self.conversations[i].messages.as_slice())
            .unwrap_or(&[]);

        let merged = refresh_conversation(listed, &open.messages, &self.ctx, self.tracker.issued()).merged;
        let Some(conversation) =
            Conversation::from_messages(open.partner_id, merged, self.ctx.current_user_id)
        else {
            return;
        };

        match position {
            Some(i) => self.conversations[i] = conversation,
            None => self.conversations.push(conversation),
        }
        sort_by_recent_activity(&mut self.conversations);
    }

    fn publish(&self) {
        self.snapshots.send_replace(InboxSnapshot {
            conversations: self.conversations.clone(),
            open_conversation: self.open.clone(),
            unread_total: unread_total(&self.conversations),
            server_unread: self.server_unread,
            stale: self.list_stale || self.conversation_stale,
        });
    }

    fn spawn_list_timer(&self) -> JoinHandle<()> {
        let source = self.source.clone();
        let events = self.events.clone();
        let user_id = self.ctx.current_user_id;
        let limit = self.intervals.fetch_timeout;

        spawn_timer("list", self.intervals.list, move || {
            let source = source.clone();
            let events = events.clone();
            async move {
                let fetch = fetch_list(source.as_ref(), user_id, limit).await;
                let _ = events.send(Event::ListFetched(fetch));
            }
        })
    }

    fn spawn_conversation_timer(&self, partner_id: Uuid) -> JoinHandle<()> {
        let source = self.source.clone();
        let events = self.events.clone();
        let user_id = self.ctx.current_user_id;
        let limit = self.intervals.fetch_timeout;

        spawn_timer("conversation", self.intervals.conversation, move || {
            let source = source.clone();
            let events = events.clone();
            async move {
                let result = within(limit, source.conversation(user_id, partner_id)).await;
                let _ = events.send(Event::ConversationFetched { partner_id, result });
            }
        })
    }

    fn stop_conversation_timer(&mut self) {
        if let Some(timer) = self.conversation_timer.take() {
            timer.abort();
        }
    }
}

/// Fires `poll` immediately and then every `period`, skipping ticks while
/// the previous poll is still running. Aborting the returned handle stops
/// future ticks; a poll already spawned runs to completion.
fn spawn_timer<F, Fut>(name: &'static str, period: Duration, mut poll: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let in_flight = Arc::new(AtomicBool::new(false));

        loop {
            ticker.tick().await;
            if in_flight.swap(true, Ordering::AcqRel) {
                debug!("Previous {} refresh still running, skipping tick", name);
                continue;
            }

            let fetch = poll();
            let in_flight = in_flight.clone();
            tokio::spawn(async move {
                fetch.await;
                in_flight.store(false, Ordering::Release);
            });
        }
    })
}

async fn within<T>(
    limit: Duration,
    fetch: impl Future<Output = Result<T, InboxError>>,
) -> Result<T, InboxError> {
    tokio::time::timeout(limit, fetch)
        .await
        .map_err(|_| InboxError::Timeout(limit))?
}

async fn fetch_list<S: MessageSource>(source: &S, user_id: Uuid, limit: Duration) -> ListFetch {
    let messages = async {
        tokio::try_join!(
            source.list_messages(user_id, MessageDirection::Sent),
            source.list_messages(user_id, MessageDirection::Received),
        )
    };

    let (messages, server_unread) = tokio::join!(
        within(limit, messages),
        within(limit, source.unread_count(user_id)),
    );

    ListFetch {
        messages,
        server_unread,
    }
}

fn log_fetch_failure(what: &str, error: &InboxError) {
    if error.is_transient() {
        warn!("Refreshing {} failed, retrying next cycle: {}", what, error);
    } else {
        error!("Refreshing {} failed: {}", what, error);
    }
}

/// Returns whether the message belongs to this conversation.
fn mark_read_in(conversation: &mut Conversation, message_id: i64, user_id: Uuid) -> bool {
    let Some(message) = conversation.messages.iter_mut().find(|m| m.id == message_id) else {
        return false;
    };
    message.is_read = true;
    conversation.unread_count = conversation
        .messages
        .iter()
        .filter(|m| m.is_unread_for(user_id))
        .count() as i64;
    true
}
