//! A single running (or finished) job and its chat-facing output buffer
//! (§3, §4.4).
//!
//! Grounded on `examples/original_source/discord-bot/gridbot/entity.py`'s
//! `Job`/`RefusedJob`. The output-message lifecycle (edit-in-place while
//! running, attach-as-file once the transcript outgrows a chat message) is
//! carried over verbatim; only the collaborators change, from a concrete
//! `discord.Message`/`aiomqtt.Client` pair to this crate's
//! [`crate::transport::ChatTransport`]/[`crate::transport::BrokerTransport`]
//! boundary traits.

use crate::output::{BacktickFilter, OutputFilter};
use crate::terminal::TerminalModel;
use crate::transport::{ChatAttachment, ChatDestination, ChatTransport};
use crate::wait_status;

/// The largest content body a chat message can hold; past this the
/// transcript gets attached as a file instead of inlined (§4.4).
pub const MESSAGE_LIMIT: usize = 2000;

/// Where a job's output message lives, so edits/attachments can find it
/// again without threading channel/message ids through every call site.
#[derive(Debug, Clone)]
pub struct OutputMessage {
    pub channel: String,
    pub message_id: String,
}

impl OutputMessage {
    fn reply_dest(&self) -> ChatDestination {
        ChatDestination::ReplyTo {
            channel: self.channel.clone(),
            message_id: self.message_id.clone(),
        }
    }
}

/// A job running (or about to run, or recently finished) on a node.
pub struct Job {
    jid: u64,
    node: String,
    output_message: OutputMessage,
    filter: Box<dyn OutputFilter>,
    output_buffer: Vec<u8>,
    started: bool,
    will_attach: bool,
    notified: bool,
    terminal: Option<TerminalModel>,
    start_time: std::time::Instant,
    author: String,
    jump_url: Option<String>,
}

impl Job {
    pub(crate) fn new(jid: u64, node: impl Into<String>, author: impl Into<String>, output_message: OutputMessage) -> Self {
        Job {
            jid,
            node: node.into(),
            output_message,
            filter: Box::new(BacktickFilter),
            output_buffer: Vec::new(),
            started: false,
            will_attach: false,
            notified: false,
            terminal: None,
            start_time: std::time::Instant::now(),
            author: author.into(),
            jump_url: None,
        }
    }

    pub fn with_filter(mut self, filter: Box<dyn OutputFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Attaches a terminal model to this job, populated only when the
    /// submitter had a `!term` size set at submission time (SPEC_FULL.md §D).
    pub fn with_terminal(mut self, terminal: TerminalModel) -> Self {
        self.terminal = Some(terminal);
        self
    }

    /// Records the jump URL to this job's display message, for the
    /// long-running notification mention (§4.4 "Notification rule").
    pub fn with_jump_url(mut self, jump_url: impl Into<String>) -> Self {
        self.jump_url = Some(jump_url.into());
        self
    }

    pub fn jid(&self) -> u64 {
        self.jid
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn jump_url(&self) -> Option<&str> {
        self.jump_url.as_deref()
    }

    pub fn output_channel(&self) -> &str {
        &self.output_message.channel
    }

    pub fn output_message_id(&self) -> &str {
        &self.output_message.message_id
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn notified(&self) -> bool {
        self.notified
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn terminal(&self) -> Option<&TerminalModel> {
        self.terminal.as_ref()
    }

    pub fn terminal_mut(&mut self) -> Option<&mut TerminalModel> {
        self.terminal.as_mut()
    }

    /// Decodes the buffer with replacement and runs it through this job's
    /// output filter. When a terminal model is attached (SPEC_FULL.md §D),
    /// the rendered screen plane is shown instead of the raw filtered
    /// buffer, trimmed of trailing blank rows.
    fn buffer_contents(&self) -> String {
        if let Some(tty) = &self.terminal {
            let rendered = tty.render();
            let trimmed: Vec<&str> = rendered
                .lines()
                .rev()
                .skip_while(|line| line.trim().is_empty())
                .collect();
            return trimmed.into_iter().rev().collect::<Vec<_>>().join("\n");
        }
        let raw = String::from_utf8_lossy(&self.output_buffer);
        self.filter.filter(&raw)
    }

    /// Called once the node has acknowledged the job actually started.
    pub async fn startup(&mut self, chat: &dyn ChatTransport) -> anyhow::Result<()> {
        chat.edit(
            &self.output_message.channel,
            &self.output_message.message_id,
            "Your job has started! Stand by for output...",
        )
        .await?;
        self.started = true;
        Ok(())
    }

    /// Called when the node refused to start the job at all.
    pub async fn reject(&mut self, chat: &dyn ChatTransport, error: &[u8]) -> anyhow::Result<()> {
        let error = String::from_utf8_lossy(error);
        let content = format!("**Could not start job:** `{error}`");
        chat.edit(
            &self.output_message.channel,
            &self.output_message.message_id,
            &content,
        )
        .await?;
        // Don't let the clean-if-unstarted sweep fire for a job that's
        // already terminal.
        self.started = true;
        Ok(())
    }

    /// Notification rule (§4.4): once elapsed time crosses `threshold` and
    /// no notification has fired yet, mention the original author with the
    /// display message's jump URL. A no-op if there's no submission context
    /// or the job has already notified.
    pub async fn maybe_notify(&mut self, chat: &dyn ChatTransport, threshold: std::time::Duration) -> anyhow::Result<()> {
        if self.notified || self.elapsed() < threshold {
            return Ok(());
        }
        self.notified = true;
        let url_suffix = match &self.jump_url {
            Some(url) => format!(": {url}"),
            None => String::new(),
        };
        let content = format!("<@{}> your job is taking a while{url_suffix}", self.author);
        chat.send(&self.output_message.reply_dest(), &content).await?;
        Ok(())
    }

    /// Called when a chunk of stdout/stderr arrives for this job.
    pub async fn write(&mut self, chat: &dyn ChatTransport, data: &[u8]) -> anyhow::Result<()> {
        if let Some(tty) = &mut self.terminal {
            tty.write(data);
        }
        self.output_buffer.extend_from_slice(data);

        if self.will_attach {
            return Ok(());
        }

        let content = format!("Running...\n```ansi\n{}\n```", self.buffer_contents());
        let content = if content.chars().count() > MESSAGE_LIMIT {
            self.will_attach = true;
            "Running...\n*Output will be attached to this message when the job completes*"
                .to_owned()
        } else {
            content
        };
        chat.edit(
            &self.output_message.channel,
            &self.output_message.message_id,
            &content,
        )
        .await?;
        Ok(())
    }

    /// Stdin topic this job's controller should publish to.
    pub fn stdin_topic(&self) -> String {
        format!("{}/stdin/{}", self.node, self.jid)
    }

    pub fn eof_topic(&self) -> String {
        format!("{}/eof/{}", self.node, self.jid)
    }

    pub fn signal_topic(&self, signal_num: u32) -> String {
        format!("{}/signal/{}/{}", self.node, self.jid, signal_num)
    }

    /// Called when the job has terminated, successfully or not. Finalizes
    /// the output message (inline or attached) and returns the finalized
    /// job so the caller can drop it from the job table.
    pub async fn stopped(
        &mut self,
        chat: &dyn ChatTransport,
        result: JobResult,
        min_report: std::time::Duration,
    ) -> anyhow::Result<()> {
        let mut status = match result {
            JobResult::Exited(status) => wait_status::decode(status).phrase(),
            JobResult::Abandoned => "The job was abandoned".to_owned(),
        };
        if self.elapsed() >= min_report {
            status.push_str(&format!(" (ran for {}s)", self.elapsed().as_secs()));
        }

        if self.will_attach {
            let attachment = ChatAttachment {
                filename: format!("gridmii-output-{}.txt", self.jid),
                bytes: self.output_buffer.clone(),
                url: None,
            };
            chat.edit(
                &self.output_message.channel,
                &self.output_message.message_id,
                &status,
            )
            .await?;
            chat.send_with_attachments(&self.output_message.reply_dest(), "", vec![attachment])
                .await?;
            return Ok(());
        }

        let output = self.buffer_contents();
        let content = if !output.trim().is_empty() {
            format!("\n```ansi\n{output}\n```\n{status}")
        } else {
            format!("{status}\n*The command had no output*")
        };

        if content.chars().count() > MESSAGE_LIMIT {
            // Edge case: the termination message alone would overflow the
            // message. Back-pedal into attach mode and retry.
            self.will_attach = true;
            return Box::pin(self.stopped(chat, result, min_report)).await;
        }

        chat.edit(
            &self.output_message.channel,
            &self.output_message.message_id,
            &content,
        )
        .await?;
        Ok(())
    }

    /// Returns the last `lines` lines of buffered output (§C.2, `!jobtail`).
    pub fn tail(&self, lines: usize) -> Vec<String> {
        let contents = self.buffer_contents();
        let all_lines: Vec<&str> = contents.split('\n').collect();
        let start = all_lines.len().saturating_sub(lines);
        all_lines[start..].iter().map(|s| s.to_string()).collect()
    }
}

/// How a job terminated, as observed from the broker.
#[derive(Debug, Clone, Copy)]
pub enum JobResult {
    /// A `waitpid`-style status reported by the node.
    Exited(i32),
    /// The controller gave up on the job without a node-reported status.
    Abandoned,
}

/// A stub returned in place of a real job when submission was refused
/// outright (target node ejected, denylist hit, etc). Never occupies a JID
/// or a job-table slot.
pub struct RefusedJob {
    node: String,
}

impl RefusedJob {
    pub fn new(node: impl Into<String>) -> Self {
        RefusedJob { node: node.into() }
    }

    pub async fn notify(&self, chat: &dyn ChatTransport, dest: &ChatDestination, reason: &str) -> anyhow::Result<()> {
        let content = format!(
            "Your job was not submitted because node {} has been ejected.\n{reason}",
            self.node
        );
        chat.send(dest, &content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeChatTransport;

    fn msg() -> OutputMessage {
        OutputMessage {
            channel: "general".to_owned(),
            message_id: "1".to_owned(),
        }
    }

    #[tokio::test]
    async fn startup_marks_started_and_edits() {
        let chat = FakeChatTransport::new();
        let mut job = Job::new(1, "hal", "alice", msg());
        job.startup(&chat).await.unwrap();
        assert!(job.started());
        assert_eq!(chat.sent().len(), 1);
    }

    #[tokio::test]
    async fn reject_marks_started_so_cleanup_skips_it() {
        let chat = FakeChatTransport::new();
        let mut job = Job::new(1, "hal", "alice", msg());
        job.reject(&chat, b"no such command").await.unwrap();
        assert!(job.started());
    }

    #[tokio::test]
    async fn write_formats_running_transcript() {
        let chat = FakeChatTransport::new();
        let mut job = Job::new(1, "hal", "alice", msg());
        job.write(&chat, b"hello\n").await.unwrap();
        assert!(!job.will_attach);
    }

    #[tokio::test]
    async fn write_switches_to_attach_mode_past_message_limit() {
        let chat = FakeChatTransport::new();
        let mut job = Job::new(1, "hal", "alice", msg());
        let huge = vec![b'a'; MESSAGE_LIMIT + 10];
        job.write(&chat, &huge).await.unwrap();
        assert!(job.will_attach);
    }

    #[tokio::test]
    async fn stopped_reports_exit_status_inline() {
        let chat = FakeChatTransport::new();
        let mut job = Job::new(1, "hal", "alice", msg());
        job.write(&chat, b"ok\n").await.unwrap();
        job.stopped(&chat, JobResult::Exited(0), std::time::Duration::from_secs(3600)).await.unwrap();
        let sent = chat.sent();
        let last = sent.last().unwrap();
        match last {
            crate::transport::fake::SentChat::Edit { content, .. } => {
                assert!(content.contains("completed successfully"));
            },
            _ => panic!("expected an edit"),
        }
    }

    #[tokio::test]
    async fn stopped_with_no_output_says_so() {
        let chat = FakeChatTransport::new();
        let mut job = Job::new(1, "hal", "alice", msg());
        job.stopped(&chat, JobResult::Exited(0), std::time::Duration::from_secs(3600)).await.unwrap();
        let sent = chat.sent();
        match sent.last().unwrap() {
            crate::transport::fake::SentChat::Edit { content, .. } => {
                assert!(content.contains("no output"));
            },
            _ => panic!("expected an edit"),
        }
    }

    #[tokio::test]
    async fn stopped_attaches_file_once_will_attach() {
        let chat = FakeChatTransport::new();
        let mut job = Job::new(1, "hal", "alice", msg());
        let huge = vec![b'a'; MESSAGE_LIMIT + 10];
        job.write(&chat, &huge).await.unwrap();
        job.stopped(&chat, JobResult::Exited(0), std::time::Duration::from_secs(3600)).await.unwrap();
        // one edit for the "Running..." placeholder swap, one for the
        // final status, plus one attachment send
        assert!(chat.sent().len() >= 3);
    }

    #[test]
    fn tail_returns_last_n_lines() {
        let mut job = Job::new(1, "hal", "alice", msg());
        job.output_buffer = b"one\ntwo\nthree\nfour\n".to_vec();
        assert_eq!(job.tail(2), vec!["four".to_owned(), "".to_owned()]);
    }

    #[tokio::test]
    async fn maybe_notify_fires_once_past_threshold() {
        let chat = FakeChatTransport::new();
        let mut job = Job::new(1, "hal", "alice", msg()).with_jump_url("https://example/1");
        job.maybe_notify(&chat, std::time::Duration::from_secs(0)).await.unwrap();
        assert!(job.notified());
        assert_eq!(chat.sent().len(), 1);

        // a second call past the same threshold does nothing further
        job.maybe_notify(&chat, std::time::Duration::from_secs(0)).await.unwrap();
        assert_eq!(chat.sent().len(), 1);
    }

    #[tokio::test]
    async fn maybe_notify_does_not_fire_before_threshold() {
        let chat = FakeChatTransport::new();
        let mut job = Job::new(1, "hal", "alice", msg());
        job.maybe_notify(&chat, std::time::Duration::from_secs(3600)).await.unwrap();
        assert!(!job.notified());
        assert!(chat.sent().is_empty());
    }
}
