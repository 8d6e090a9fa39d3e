//! The grid controller: node/job tables, broker topic routing, roll-call
//! reconciliation, and the submit pipeline (§4.5, §4.6).
//!
//! Grounded on `examples/original_source/discord-bot/gridbot/gridbot.py`'s
//! `GridMiiBot` (the `do_mqtt_task`/`on_mqtt`/`submit_job` trio) and
//! `entity.py`'s `Node.pick_node`/`submit_job`. The unstarted-cleanup timer
//! uses `tokio_util::time::DelayQueue` instead of the original's
//! spawn-then-flag-check task, per this crate's design note preferring
//! explicit cancellation over a flag-check pattern (§9): `startup`/`reject`
//! remove the job's queue entry outright instead of merely setting a flag
//! for a sleeping task to notice later.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::time::delay_queue::Key;
use tokio_util::time::DelayQueue;
use tracing::{debug, error, info, instrument, warn};

use crate::denylist;
use crate::error::GridError;
use crate::job::{Job, JobResult, OutputMessage};
use crate::job_table::JobTable;
use crate::node::NodeTable;
use crate::output::{BacktickFilter, FastfetchFilter, OutputFilter};
use crate::prefs::PrefsTable;
use crate::transport::{BrokerEvent, BrokerTransport, ChatDestination, ChatTransport};
use crate::wait_status;

pub(crate) const ROLL_CALL_TOPIC: &str = "grid/roll_call";

/// How often [`Controller::run`] rescans the job table for the long-running
/// notification rule (§4.4). Independent of `notify_threshold_secs` itself,
/// which is the elapsed-time threshold that rule fires on.
const NOTIFY_CHECK_PERIOD: Duration = Duration::from_secs(30);

/// Everything submitted over `node/connect`, in either the structured or
/// legacy-bare-name shape (§6).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NodeConnectPayload {
    Structured { node: String, version: String },
    Legacy(String),
}

#[derive(Debug, Deserialize)]
struct RollCallPayload {
    node: String,
    jobs: Vec<u64>,
}

/// Everything the controller owns: node/job tables, per-user preferences,
/// and the unstarted-job timeout queue. Single-owner, single-task state —
/// per §5, no locks are required because one event loop drives everything.
pub struct Controller {
    pub nodes: NodeTable,
    pub jobs: JobTable,
    pub prefs: PrefsTable,
    unstarted: DelayQueue<u64>,
    unstarted_keys: HashMap<u64, Key>,
    unstarted_timeout: Duration,
    target_channel: Option<String>,
    banned_users: Vec<String>,
    guild: u64,
    notify_threshold: Duration,
    min_report: Duration,
    relay_configured: bool,
}

impl Controller {
    pub fn new(
        target_node: Option<String>,
        target_channel: Option<String>,
        guild: u64,
        notify_threshold: Duration,
        min_report: Duration,
        relay_configured: bool,
        unstarted_timeout: Duration,
    ) -> Self {
        Controller {
            nodes: NodeTable::new().with_locus(target_node),
            jobs: JobTable::new(),
            prefs: PrefsTable::new(),
            unstarted: DelayQueue::new(),
            unstarted_keys: HashMap::new(),
            unstarted_timeout,
            target_channel,
            banned_users: Vec::new(),
            guild,
            notify_threshold,
            min_report,
            relay_configured,
        }
    }

    /// Sets the banned-user list (`GridMiiCogBase.cog_check`'s ban check),
    /// sourced from the `banned_users` config key.
    pub fn with_banned_users(mut self, banned_users: Vec<String>) -> Self {
        self.banned_users = banned_users;
        self
    }

    /// Whether `!download` should be exposed (SPEC_FULL.md §C.9).
    pub fn relay_configured(&self) -> bool {
        self.relay_configured
    }

    /// Builds the jump URL to a message, for the long-running-job
    /// notification mention (§4.4).
    fn jump_url(&self, channel: &str, message_id: &str) -> String {
        format!("https://discord.com/channels/{}/{}/{}", self.guild, channel, message_id)
    }

    /// Scans every running job for the long-running notification rule
    /// (§4.4), called periodically from [`Controller::run`].
    pub async fn check_notifications(&mut self, chat: &dyn ChatTransport) -> anyhow::Result<()> {
        for (_, job) in self.jobs.iter_mut() {
            job.maybe_notify(chat, self.notify_threshold).await?;
        }
        Ok(())
    }

    fn announce_dest(&self) -> Option<ChatDestination> {
        self.target_channel
            .clone()
            .map(ChatDestination::Channel)
    }

    /// Differentiates a propagated error per §7's propagation policy:
    /// user errors get a single chat reply, remote-transient and protocol
    /// failures are logged (the latter dropped outright), and fatal errors
    /// are additionally announced to the target channel when one is set.
    async fn report_chat_error(
        &self,
        chat: &dyn ChatTransport,
        message: &crate::transport::ChatMessage,
        error: anyhow::Error,
    ) {
        match error.downcast::<GridError>() {
            Ok(GridError::User(reply)) => {
                let dest = ChatDestination::ReplyTo {
                    channel: message.channel.clone(),
                    message_id: message.id.clone(),
                };
                chat.send(&dest, &reply).await.ok();
            },
            Ok(GridError::Protocol(reason)) => {
                warn!(reason, "protocol violation handling chat message, dropping");
            },
            Ok(GridError::RemoteTransient(source)) => {
                warn!(error = %source, "remote-transient failure handling chat message");
            },
            Ok(GridError::Fatal(source)) => {
                error!(error = %source, "fatal error handling chat message");
                if let Some(dest) = self.announce_dest() {
                    chat.send(&dest, &format!(":rotating_light: internal error: {source}")).await.ok();
                }
            },
            Err(error) => warn!(%error, "error handling chat message"),
        }
    }

    /// Same differentiation as [`Controller::report_chat_error`], for
    /// errors coming out of broker-event handling, where there's no
    /// originating chat message to reply to.
    async fn report_broker_error(&self, chat: &dyn ChatTransport, error: anyhow::Error) {
        match error.downcast::<GridError>() {
            Ok(GridError::User(reply)) => {
                if let Some(dest) = self.announce_dest() {
                    chat.send(&dest, &reply).await.ok();
                }
            },
            Ok(GridError::Protocol(reason)) => {
                warn!(reason, "protocol violation handling broker event, dropping");
            },
            Ok(GridError::RemoteTransient(source)) => {
                warn!(error = %source, "remote-transient failure handling broker event");
            },
            Ok(GridError::Fatal(source)) => {
                error!(error = %source, "fatal error handling broker event");
                if let Some(dest) = self.announce_dest() {
                    chat.send(&dest, &format!(":rotating_light: internal error: {source}")).await.ok();
                }
            },
            Err(error) => warn!(%error, "error handling broker event"),
        }
    }

    /// Submits a new job, picking a node via the submitter's locus
    /// preference or the table-global fallback (§4.5). Returns the fresh
    /// JID, or `None` if no node was available or the script was
    /// denylisted (in both cases a user-visible reply has already been
    /// sent).
    #[instrument(skip(self, chat, broker_publish), fields(author))]
    pub async fn submit<F>(
        &mut self,
        chat: &dyn ChatTransport,
        broker_publish: impl FnOnce(String, Vec<u8>) -> F,
        dest: ChatDestination,
        author: &str,
        script: &str,
        filter: Box<dyn OutputFilter>,
    ) -> anyhow::Result<Option<u64>>
    where
        F: std::future::Future<Output = anyhow::Result<()>>,
    {
        if !denylist::permit(script) {
            chat.send(&dest, ":no_entry: that script is not permitted").await?;
            return Ok(None);
        }

        let prefs = self.prefs.get(author);
        let node_name = match prefs.locus.as_deref().filter(|n| self.nodes.node_present(n)) {
            Some(name) => name.to_owned(),
            None => match self.nodes.pick_node() {
                Some(node) => node.name().to_owned(),
                None => {
                    chat.send(&dest, ":x: No nodes are available at the moment.").await?;
                    return Ok(None);
                },
            },
        };

        if !self
            .nodes
            .get_node(&node_name)
            .is_some_and(|n| n.can_accept_jobs())
        {
            chat.send(
                &dest,
                &format!(
                    "Your job was not submitted because node {node_name} has been ejected.\nPlease select another node."
                ),
            )
            .await?;
            return Ok(None);
        }

        let message_id = chat.send(&dest, "Your job is starting...").await?;
        let channel = match &dest {
            ChatDestination::Channel(c) => c.clone(),
            ChatDestination::ReplyTo { channel, .. } => channel.clone(),
        };
        let jump_url = self.jump_url(&channel, &message_id);
        let output_message = OutputMessage {
            channel,
            message_id,
        };

        let jid = self.jobs.insert_new(|jid| {
            let mut job = Job::new(jid, &node_name, author, output_message)
                .with_filter(filter)
                .with_jump_url(jump_url);
            if let Some(term) = prefs.term {
                job = job.with_terminal(crate::terminal::TerminalModel::new(term.columns, term.lines));
            }
            job
        });

        let payload = serde_json::json!({ "script": script }).to_string();
        let topic = format!("{node_name}/submit/{jid}");
        if let Err(error) = broker_publish(topic, payload.into_bytes()).await {
            warn!(%error, jid, "error publishing job submission");
            let job = self.jobs.remove(jid).expect("just inserted");
            chat.edit(
                job.output_channel(),
                job.output_message_id(),
                &format!("**Couldn't submit job**: {error}"),
            )
            .await
            .ok();
            return Ok(None);
        }

        let key = self.unstarted.insert(jid, self.unstarted_timeout);
        self.unstarted_keys.insert(jid, key);

        Ok(Some(jid))
    }

    /// Polls the unstarted-job timeout queue; call this from the
    /// controller's select loop alongside broker/chat event polling.
    pub async fn next_unstarted_timeout(&mut self) -> Option<u64> {
        use futures::StreamExt;
        self.unstarted.next().await.map(|expired| {
            let jid = expired.into_inner();
            self.unstarted_keys.remove(&jid);
            jid
        })
    }

    /// Called when a job's timeout fires without it having started.
    #[instrument(skip(self, chat))]
    pub async fn unstarted_timeout(&mut self, chat: &dyn ChatTransport, jid: u64) -> anyhow::Result<()> {
        if let Some(job) = self.jobs.get(jid) {
            if !job.started() {
                warn!(jid, node = job.node(), "job did not start in time");
                chat.edit(
                    &job_channel(job),
                    &job_message_id(job),
                    ":x: Your job did not start. The node might not be online.",
                )
                .await?;
                self.jobs.remove(jid);
            }
        }
        Ok(())
    }

    fn cancel_unstarted_timer(&mut self, jid: u64) {
        if let Some(key) = self.unstarted_keys.remove(&jid) {
            self.unstarted.remove(&key);
        }
    }

    /// Dispatches one broker event into node/job table updates (§4.6).
    #[instrument(skip(self, chat, event))]
    pub async fn handle_broker_event(
        &mut self,
        chat: &dyn ChatTransport,
        event: BrokerEvent,
    ) -> anyhow::Result<()> {
        match event {
            BrokerEvent::NodeConnect { node, version } => {
                info!(node, version, "node is present");
                self.nodes.node_seen(&node, Some(version));
                if let Some(dest) = self.announce_dest() {
                    chat.send(&dest, &format!(":inbox_tray: Node `{node}` is connected")).await?;
                }
            },
            BrokerEvent::NodeDisconnect { node } => {
                info!(node, "node disconnected");
                self.nodes.node_gone(&node);
                if let Some(dest) = self.announce_dest() {
                    chat.send(&dest, &format!(":outbox_tray: Node `{node}` disconnected")).await?;
                }
            },
            BrokerEvent::NodeAnnounce { text } => {
                if let Some(dest) = self.announce_dest() {
                    chat.send(&dest, &text).await?;
                }
            },
            BrokerEvent::RollCall { node, jobs: acked } => {
                self.reconcile_roll_call(chat, &node, &acked).await?;
            },
            BrokerEvent::JobOutput { node: _, jid, data } => {
                if let Some(job) = self.jobs.get_mut(jid) {
                    job.write(chat, &data).await?;
                } else {
                    debug!(jid, "got output for spurious job");
                }
            },
            BrokerEvent::Startup { node: _, jid } => {
                if self.jobs.contains(jid) {
                    self.job_started(chat, jid).await?;
                } else {
                    debug!(jid, "got startup for spurious job");
                }
            },
            BrokerEvent::Reject { node: _, jid, reason } => {
                if self.jobs.contains(jid) {
                    self.job_rejected(chat, jid, &reason).await?;
                } else {
                    debug!(jid, "got reject for spurious job");
                }
            },
            BrokerEvent::JobDone { node: _, jid, status } => {
                if let Some(mut job) = self.jobs.remove(jid) {
                    self.cancel_unstarted_timer(jid);
                    job.stopped(chat, JobResult::Exited(status), self.min_report).await?;
                } else {
                    debug!(jid, "got stop message for spurious job");
                }
            },
            BrokerEvent::Reconnected => {
                if let Some(dest) = self.announce_dest() {
                    chat.send(&dest, ":arrows_counterclockwise: Reconnected to the broker").await?;
                }
            },
        }
        Ok(())
    }

    /// Marks a job as started (§4.4 PENDING -> RUNNING), canceling its
    /// unstarted timer explicitly.
    pub async fn job_started(&mut self, chat: &dyn ChatTransport, jid: u64) -> anyhow::Result<()> {
        self.cancel_unstarted_timer(jid);
        if let Some(job) = self.jobs.get_mut(jid) {
            job.startup(chat).await?;
        }
        Ok(())
    }

    /// Marks a job as rejected (§4.4 PENDING -> DONE via reject).
    pub async fn job_rejected(&mut self, chat: &dyn ChatTransport, jid: u64, reason: &[u8]) -> anyhow::Result<()> {
        self.cancel_unstarted_timer(jid);
        if let Some(mut job) = self.jobs.remove(jid) {
            job.reject(chat, reason).await?;
        }
        Ok(())
    }

    /// Reconciles a node's self-reported job set against the controller's
    /// table (§4.6 roll-call reconciliation, scenario 6 in §8).
    async fn reconcile_roll_call(
        &mut self,
        chat: &dyn ChatTransport,
        node: &str,
        acked: &[u64],
    ) -> anyhow::Result<()> {
        let stale: Vec<u64> = self
            .jobs
            .jids_on_node(node)
            .filter(|jid| !acked.contains(jid))
            .collect();

        for jid in stale {
            warn!(jid, node, "job not acknowledged by roll call, abandoning");
            self.cancel_unstarted_timer(jid);
            if let Some(mut job) = self.jobs.remove(jid) {
                job.stopped(chat, JobResult::Abandoned, self.min_report).await?;
            }
        }
        Ok(())
    }

    /// Explicit admin `!abandon` (SPEC_FULL.md §C.2): runs the `stopped`
    /// path and then publishes signal 9 as a best-effort kill (§4.4 "RUNNING
    /// → DONE (abandon)").
    pub async fn abandon_job(
        &mut self,
        chat: &dyn ChatTransport,
        broker: &dyn BrokerTransport,
        jid: u64,
    ) -> anyhow::Result<bool> {
        self.cancel_unstarted_timer(jid);
        match self.jobs.remove(jid) {
            Some(mut job) => {
                let signal_topic = job.signal_topic(9);
                job.stopped(chat, JobResult::Abandoned, self.min_report).await?;
                if let Err(error) = broker.publish(&signal_topic, Vec::new()).await {
                    warn!(%error, jid, "best-effort kill signal failed to publish");
                }
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Handles one inbound chat message: channel/ban gating, then either a
    /// structured `!command` or a `$`-prefixed flex script submitted as a
    /// job (`GridMiiBot.flex_command`). Messages that don't start with the
    /// command prefix, or that fail the gate, are silently ignored.
    #[instrument(skip(self, chat, broker, message), fields(author = %message.author))]
    pub async fn handle_chat_message(
        &mut self,
        chat: &dyn ChatTransport,
        broker: &dyn BrokerTransport,
        message: &crate::transport::ChatMessage,
    ) -> anyhow::Result<()> {
        if !crate::commands::is_allowed(
            self.target_channel.as_deref(),
            &message.channel,
            &message.author,
            &self.banned_users,
        ) {
            return Ok(());
        }

        let Some(rest) = message.content.strip_prefix('$') else {
            return Ok(());
        };

        match crate::commands::parse_command(rest) {
            Some(cmd) => {
                let rules_bytes = if matches!(cmd, crate::commands::Command::Rules) {
                    tokio::fs::read("data/rules.md").await.ok()
                } else {
                    None
                };
                crate::commands::dispatch(self, chat, broker, message, cmd, rules_bytes).await
            },
            None => {
                let dest = ChatDestination::ReplyTo {
                    channel: message.channel.clone(),
                    message_id: message.id.clone(),
                };
                self.submit(
                    chat,
                    |topic, payload| async move { broker.publish(&topic, payload).await },
                    dest,
                    &message.author,
                    rest,
                    Self::default_filter(),
                )
                .await?;
                Ok(())
            },
        }
    }

    /// Parses a `node/connect` payload in either its structured or legacy
    /// bare-name shape (§6).
    pub fn parse_node_connect(payload: &[u8]) -> Result<(String, Option<String>), GridError> {
        let text = std::str::from_utf8(payload)
            .map_err(|error| GridError::Protocol(format!("node/connect payload is not UTF-8: {error}")))?;
        match serde_json::from_str::<NodeConnectPayload>(text) {
            Ok(NodeConnectPayload::Structured { node, version }) => Ok((node, Some(version))),
            Ok(NodeConnectPayload::Legacy(name)) => Ok((name, None)),
            Err(_) => Ok((text.to_owned(), None)),
        }
    }

    pub fn parse_roll_call(payload: &[u8]) -> Result<(String, Vec<u64>), GridError> {
        let parsed: RollCallPayload = serde_json::from_slice(payload)
            .map_err(|error| GridError::Protocol(format!("malformed roll-call payload: {error}")))?;
        Ok((parsed.node, parsed.jobs))
    }

    /// The neofetch "flex" script: run fastfetch twice and stitch the
    /// outputs back together client-side (mirrors `gridbot.py::neofetch`).
    pub fn neofetch_script() -> &'static str {
        "fastfetch --pipe false -s none\necho '===snip==='\nfastfetch --pipe false -l none -s 'Title:Separator:OS:Host:Kernel:Uptime:Packages:CPU:Memory:Swap:Disk:LocalIp:Locale:Break'\n"
    }

    pub fn neofetch_filter() -> Box<dyn OutputFilter> {
        Box::new(FastfetchFilter)
    }

    pub fn default_filter() -> Box<dyn OutputFilter> {
        Box::new(BacktickFilter)
    }

    /// Decodes a POSIX wait status into a display phrase (§4.4).
    pub fn describe_status(status: i32) -> String {
        wait_status::decode(status).phrase()
    }

    /// Drives the controller's event loop: broker events, the unstarted-job
    /// timeout queue, and the hourly auto-roll-call publish all interleave
    /// on one task, matching the single-loop cooperative model of §5.
    /// Returns once `cancel` fires.
    #[instrument(skip_all)]
    pub async fn run(
        &mut self,
        chat: &mut dyn ChatTransport,
        broker: &mut dyn BrokerTransport,
        cancel: tokio_util::sync::CancellationToken,
        roll_call_period: Duration,
    ) -> anyhow::Result<()> {
        let mut roll_call_timer = tokio::time::interval(roll_call_period);
        roll_call_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut notify_timer = tokio::time::interval(NOTIFY_CHECK_PERIOD);
        notify_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("controller shutting down");
                    return Ok(());
                },
                event = broker.recv() => {
                    match event {
                        Ok(event) => {
                            if let Err(error) = self.handle_broker_event(chat, event).await {
                                self.report_broker_error(chat, error).await;
                            }
                        },
                        Err(error) => warn!(%error, "broker recv failed"),
                    }
                },
                message = chat.recv() => {
                    match message {
                        Ok(message) => {
                            if let Err(error) = self.handle_chat_message(chat, broker, &message).await {
                                self.report_chat_error(chat, &message, error).await;
                            }
                        },
                        Err(error) => warn!(%error, "chat recv failed"),
                    }
                },
                Some(jid) = self.next_unstarted_timeout() => {
                    self.unstarted_timeout(chat, jid).await?;
                },
                _ = roll_call_timer.tick() => {
                    info!("performing scheduled roll call");
                    if let Err(error) = broker.publish(ROLL_CALL_TOPIC, Vec::new()).await {
                        warn!(%error, "failed to publish scheduled roll call");
                    }
                },
                _ = notify_timer.tick() => {
                    self.check_notifications(chat).await?;
                },
            }
        }
    }
}

fn job_channel(job: &Job) -> String {
    // Job doesn't expose its channel directly; reconstructed here because
    // only `Job::write`/`startup`/`reject`/`stopped` need it internally.
    // Exposed for the timeout path, which has to edit without going
    // through one of those methods.
    job.output_channel().to_owned()
}

fn job_message_id(job: &Job) -> String {
    job.output_message_id().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeChatTransport;

    fn make_controller() -> Controller {
        let mut c = Controller::new(
            None,
            Some("general".to_owned()),
            1,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            false,
            Duration::from_secs(20),
        );
        c.nodes.node_seen("hal", Some("1.0".to_owned()));
        c
    }

    #[tokio::test]
    async fn submit_picks_a_node_and_publishes() {
        let mut c = make_controller();
        let chat = FakeChatTransport::new();
        let mut published = Vec::new();
        let jid = c
            .submit(
                &chat,
                |topic, payload| {
                    published.push((topic, payload));
                    std::future::ready(Ok(()))
                },
                ChatDestination::Channel("general".to_owned()),
                "alice",
                "echo hi",
                Controller::default_filter(),
            )
            .await
            .unwrap();
        assert_eq!(jid, Some(1));
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "hal/submit/1");
    }

    #[tokio::test]
    async fn submit_refuses_denylisted_script() {
        let mut c = make_controller();
        let chat = FakeChatTransport::new();
        let jid = c
            .submit(
                &chat,
                |_, _| std::future::ready(Ok(())),
                ChatDestination::Channel("general".to_owned()),
                "alice",
                "rm -rf /",
                Controller::default_filter(),
            )
            .await
            .unwrap();
        assert_eq!(jid, None);
    }

    #[tokio::test]
    async fn submit_refuses_when_no_nodes() {
        let mut c = Controller::new(
            None,
            None,
            1,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            false,
            Duration::from_secs(20),
        );
        let chat = FakeChatTransport::new();
        let jid = c
            .submit(
                &chat,
                |_, _| std::future::ready(Ok(())),
                ChatDestination::Channel("general".to_owned()),
                "alice",
                "echo hi",
                Controller::default_filter(),
            )
            .await
            .unwrap();
        assert_eq!(jid, None);
    }

    #[tokio::test]
    async fn roll_call_abandons_stale_jobs() {
        let mut c = make_controller();
        let chat = FakeChatTransport::new();
        for _ in 0..3 {
            c.submit(
                &chat,
                |_, _| std::future::ready(Ok(())),
                ChatDestination::Channel("general".to_owned()),
                "alice",
                "echo hi",
                Controller::default_filter(),
            )
            .await
            .unwrap();
        }
        assert!(c.jobs.contains(1));
        assert!(c.jobs.contains(2));
        assert!(c.jobs.contains(3));

        c.reconcile_roll_call(&chat, "hal", &[1, 3]).await.unwrap();
        assert!(c.jobs.contains(1));
        assert!(!c.jobs.contains(2));
        assert!(c.jobs.contains(3));
    }

    #[test]
    fn parse_node_connect_handles_both_shapes() {
        let (name, version) = Controller::parse_node_connect(br#"{"node":"hal","version":"1.0"}"#).unwrap();
        assert_eq!(name, "hal");
        assert_eq!(version.as_deref(), Some("1.0"));

        let (name, version) = Controller::parse_node_connect(b"hal").unwrap();
        assert_eq!(name, "hal");
        assert_eq!(version, None);
    }

    #[test]
    fn parse_roll_call_extracts_jobs() {
        let (node, jobs) = Controller::parse_roll_call(br#"{"node":"hal","jobs":[1,3]}"#).unwrap();
        assert_eq!(node, "hal");
        assert_eq!(jobs, vec![1, 3]);
    }

    #[test]
    fn parse_roll_call_rejects_malformed_json() {
        let error = Controller::parse_roll_call(b"not json").unwrap_err();
        assert!(matches!(error, GridError::Protocol(_)));
    }

    #[tokio::test]
    async fn report_chat_error_replies_for_user_errors() {
        let c = make_controller();
        let chat = FakeChatTransport::new();
        let message = crate::transport::ChatMessage {
            id: "42".to_owned(),
            channel: "general".to_owned(),
            author: "alice".to_owned(),
            author_is_admin: false,
            content: String::new(),
            attachments: Vec::new(),
            replied_to: None,
        };

        c.report_chat_error(
            &chat,
            &message,
            GridError::User(":x: no such node".to_owned()).into(),
        )
        .await;

        match &chat.sent()[0] {
            crate::transport::fake::SentChat::Send { content, .. } => {
                assert_eq!(content, ":x: no such node");
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn report_chat_error_drops_protocol_violations_silently() {
        let c = make_controller();
        let chat = FakeChatTransport::new();
        let message = crate::transport::ChatMessage {
            id: "42".to_owned(),
            channel: "general".to_owned(),
            author: "alice".to_owned(),
            author_is_admin: false,
            content: String::new(),
            attachments: Vec::new(),
            replied_to: None,
        };

        c.report_chat_error(&chat, &message, GridError::Protocol("bad json".to_owned()).into())
            .await;

        assert!(chat.sent().is_empty());
    }
}
