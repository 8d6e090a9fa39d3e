//! Boundary contracts for the two external collaborators this crate does
//! not implement: the chat platform and the message broker (§1, §6).
//!
//! The controller and command layer depend only on [`ChatTransport`] and
//! [`BrokerTransport`]; a live binary wires them to a real Discord gateway
//! client and a real MQTT client, while tests use the in-memory fakes in
//! [`fake`]. This mirrors `examples/original_source/discord-bot/gridbot/tests/simulacra.py`'s
//! `mock_mqtt`/`mock_bot`/`mock_context`/`mock_message` helpers, generalized
//! into real trait objects instead of Python monkeypatch stand-ins.

use async_trait::async_trait;

/// A place a reply, an attachment, or a standalone message can be sent:
/// a channel, or in reply to a specific prior message.
#[derive(Debug, Clone)]
pub enum ChatDestination {
    Channel(String),
    ReplyTo { channel: String, message_id: String },
}

/// A chat attachment: a filename, its raw bytes (for outgoing sends), and
/// the platform-hosted URL a node can `curl` directly (for `!upload`,
/// SPEC_FULL.md §C.9) when this attachment came in on an incoming message.
#[derive(Debug, Clone)]
pub struct ChatAttachment {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub url: Option<String>,
}

/// A chat message observed by the bot, abstracted away from any particular
/// platform's event type.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub channel: String,
    pub author: String,
    pub author_is_admin: bool,
    pub content: String,
    pub attachments: Vec<ChatAttachment>,
    /// The id of the message this one is a reply to, if any.
    pub replied_to: Option<String>,
}

/// The chat-platform boundary: everything the controller needs to speak to
/// the channel, without depending on a concrete gateway client crate.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Posts a standalone message, returning its platform-assigned id.
    async fn send(&self, dest: &ChatDestination, content: &str) -> anyhow::Result<String>;

    /// Posts a message with one or more attachments.
    async fn send_with_attachments(
        &self,
        dest: &ChatDestination,
        content: &str,
        attachments: Vec<ChatAttachment>,
    ) -> anyhow::Result<String>;

    /// Edits a previously sent message in place, used for live job-output
    /// updates (§4.4).
    async fn edit(&self, channel: &str, message_id: &str, content: &str) -> anyhow::Result<()>;

    /// Fetches the raw bytes of an attachment a user uploaded, for `!upload`
    /// (SPEC_FULL.md §C.9).
    async fn fetch_attachment(&self, attachment: &ChatAttachment) -> anyhow::Result<Vec<u8>>;

    /// Blocks until the next inbound chat message is available.
    async fn recv(&mut self) -> anyhow::Result<ChatMessage>;
}

/// A broker event the controller reacts to.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// A node announced itself on `node/connect`.
    NodeConnect { node: String, version: String },
    /// A node went away on `node/disconnect`.
    NodeDisconnect { node: String },
    /// A free-form announcement on `node/announce`, broadcast to the
    /// target channel verbatim.
    NodeAnnounce { text: String },
    /// A node's roll-call response, naming the jobs it still has running.
    RollCall { node: String, jobs: Vec<u64> },
    /// A chunk of a job's stdout/stderr.
    JobOutput { node: String, jid: u64, data: Vec<u8> },
    /// A job on `node` acknowledged it actually started, on `job/<jid>/startup`.
    Startup { node: String, jid: u64 },
    /// A node refused to start a job, on `job/<jid>/reject`.
    Reject { node: String, jid: u64, reason: Vec<u8> },
    /// A job on `node` has exited, with its raw `waitpid` status.
    JobDone { node: String, jid: u64, status: i32 },
    /// The broker connection itself dropped and was re-established.
    Reconnected,
}

/// The broker boundary: topic publish/subscribe, abstracted away from any
/// particular MQTT client crate.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Publishes a raw payload to `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()>;

    /// Blocks until the next broker event is available.
    async fn recv(&mut self) -> anyhow::Result<BrokerEvent>;
}

/// In-memory fakes for [`ChatTransport`] and [`BrokerTransport`]. Used by
/// this crate's own test suite, and available to downstream deployments
/// that want to dry-run the controller loop without a live chat/broker
/// connection (no concrete gateway client ships in this crate — see §1).
pub mod fake {
    use std::sync::Mutex;

    use super::*;

    /// Records every send/edit so tests can assert on what the controller
    /// told the channel.
    #[derive(Debug, Clone)]
    pub enum SentChat {
        Send {
            dest: ChatDestination,
            content: String,
        },
        Edit {
            channel: String,
            message_id: String,
            content: String,
        },
    }

    #[derive(Default)]
    pub struct FakeChatTransport {
        sent: Mutex<Vec<SentChat>>,
        next_id: Mutex<u64>,
        inbox: Mutex<std::collections::VecDeque<ChatMessage>>,
    }

    impl FakeChatTransport {
        pub fn new() -> Self {
            FakeChatTransport::default()
        }

        pub fn sent(&self) -> Vec<SentChat> {
            self.sent.lock().unwrap().clone()
        }

        /// Queues a message for a later `recv()` call, for tests/dry-runs
        /// that want to drive the chat-message handling path.
        pub fn push_incoming(&self, message: ChatMessage) {
            self.inbox.lock().unwrap().push_back(message);
        }

        fn fresh_id(&self) -> String {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            next.to_string()
        }
    }

    #[async_trait]
    impl ChatTransport for FakeChatTransport {
        async fn send(&self, dest: &ChatDestination, content: &str) -> anyhow::Result<String> {
            let id = self.fresh_id();
            self.sent.lock().unwrap().push(SentChat::Send {
                dest: dest.clone(),
                content: content.to_owned(),
            });
            Ok(id)
        }

        async fn send_with_attachments(
            &self,
            dest: &ChatDestination,
            content: &str,
            _attachments: Vec<ChatAttachment>,
        ) -> anyhow::Result<String> {
            self.send(dest, content).await
        }

        async fn edit(&self, channel: &str, message_id: &str, content: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(SentChat::Edit {
                channel: channel.to_owned(),
                message_id: message_id.to_owned(),
                content: content.to_owned(),
            });
            Ok(())
        }

        async fn fetch_attachment(&self, attachment: &ChatAttachment) -> anyhow::Result<Vec<u8>> {
            Ok(attachment.bytes.clone())
        }

        async fn recv(&mut self) -> anyhow::Result<ChatMessage> {
            loop {
                if let Some(message) = self.inbox.lock().unwrap().pop_front() {
                    return Ok(message);
                }
                std::future::pending::<()>().await;
            }
        }
    }

    /// Feeds a scripted sequence of events and records every publish.
    #[derive(Default)]
    pub struct FakeBrokerTransport {
        pub published: Mutex<Vec<(String, Vec<u8>)>>,
        pub queue: Mutex<std::collections::VecDeque<BrokerEvent>>,
    }

    impl FakeBrokerTransport {
        pub fn new(events: impl IntoIterator<Item = BrokerEvent>) -> Self {
            FakeBrokerTransport {
                published: Mutex::new(Vec::new()),
                queue: Mutex::new(events.into_iter().collect()),
            }
        }

        pub fn push(&self, event: BrokerEvent) {
            self.queue.lock().unwrap().push_back(event);
        }

        pub fn published(&self) -> Vec<(String, Vec<u8>)> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrokerTransport for FakeBrokerTransport {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_owned(), payload));
            Ok(())
        }

        async fn recv(&mut self) -> anyhow::Result<BrokerEvent> {
            loop {
                if let Some(event) = self.queue.lock().unwrap().pop_front() {
                    return Ok(event);
                }
                std::future::pending::<()>().await;
            }
        }
    }

    #[tokio::test]
    async fn fake_chat_records_sends() {
        let chat = FakeChatTransport::new();
        let dest = ChatDestination::Channel("general".to_owned());
        chat.send(&dest, "hello").await.unwrap();
        assert_eq!(chat.sent().len(), 1);
    }

    #[tokio::test]
    async fn fake_broker_drains_queue() {
        let mut broker = FakeBrokerTransport::new([BrokerEvent::Reconnected]);
        let ev = broker.recv().await.unwrap();
        assert!(matches!(ev, BrokerEvent::Reconnected));
    }

    #[tokio::test]
    async fn fake_chat_drains_inbox() {
        let mut chat = FakeChatTransport::new();
        chat.push_incoming(ChatMessage {
            id: "1".to_owned(),
            channel: "general".to_owned(),
            author: "alice".to_owned(),
            author_is_admin: false,
            content: "$yougood".to_owned(),
            attachments: Vec::new(),
            replied_to: None,
        });
        let message = chat.recv().await.unwrap();
        assert_eq!(message.content, "$yougood");
    }
}
