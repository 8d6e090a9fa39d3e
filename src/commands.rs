//! Chat command surface: structured `$commands`, `$flex` script dispatch,
//! and reply-to-job commands (`!jobinfo`, `!signal`, `!kill`, ...) (§6,
//! SPEC_FULL.md §C.2-C.4).
//!
//! Grounded on `examples/original_source/discord-bot/gridbot/grid_cmd.py`'s
//! three cogs (`UserCommandCog`, `AdminCommandCog`, `JobControlCog`) and
//! `gridbot.py`'s `check_channel`/banned-user gating. Parsing is kept as
//! plain pattern matching over a tokenized line, in the same spirit as the
//! teacher's hand-written line-oriented parser in `src/wire/decoder.rs`
//! rather than pulling in a parser-combinator dependency for a dozen
//! fixed-shape commands.

use crate::controller::Controller;
use crate::node::NodeMatch;
use crate::prefs::TermSize;
use crate::transport::{BrokerTransport, ChatDestination, ChatMessage, ChatTransport};

/// One structured `!command` and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    YouGood,
    Nodes,
    Locus(Option<String>),
    Jobs,
    Term(TermCommand),
    Rules,
    JobInfo,
    Eof,
    Signal(u32),
    Kill,
    CtrlC,
    JobTail(usize),
    Scram,
    Reload(String),
    Eject(String),
    Abandon(u64),
    RollCall,
    Upload,
    Download(String),
    Neofetch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TermCommand {
    Query,
    Off,
    Set { term: String, columns: usize, lines: usize },
}

/// Commands gated behind membership in the configured admin-role set
/// (`AdminCommandCog.cog_check`).
pub fn is_admin_command(cmd: &Command) -> bool {
    matches!(
        cmd,
        Command::Scram
            | Command::Reload(_)
            | Command::Eject(_)
            | Command::Abandon(_)
            | Command::RollCall
    )
}

/// Parses a structured command line (without the leading `!`). Returns
/// `None` for anything unrecognized, which callers treat as "not a
/// structured command" rather than an error.
pub fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let name = words.next()?;
    let rest: Vec<&str> = words.collect();

    Some(match name {
        "yougood" => Command::YouGood,
        "nodes" => Command::Nodes,
        "locus" => Command::Locus(rest.first().map(|s| s.to_string())),
        "jobs" => Command::Jobs,
        "term" => Command::Term(parse_term(&rest)),
        "rules" => Command::Rules,
        "jobinfo" => Command::JobInfo,
        "eof" => Command::Eof,
        "signal" => Command::Signal(rest.first()?.parse().ok()?),
        "kill" => Command::Kill,
        "ctrl-c" => Command::CtrlC,
        "jobtail" => Command::JobTail(rest.first().and_then(|s| s.parse().ok()).unwrap_or(5)),
        "scram" => Command::Scram,
        "reload" => Command::Reload(rest.first()?.to_string()),
        "eject" => Command::Eject(rest.first()?.to_string()),
        "abandon" => Command::Abandon(rest.first()?.parse().ok()?),
        "rollcall" => Command::RollCall,
        "upload" => Command::Upload,
        "download" => Command::Download(rest.first()?.to_string()),
        "neofetch" => Command::Neofetch,
        _ => return None,
    })
}

fn parse_term(rest: &[&str]) -> TermCommand {
    match rest.first() {
        None => TermCommand::Query,
        Some(&"off") => TermCommand::Off,
        Some(&"on") => TermCommand::Set {
            term: "dumb".to_owned(),
            columns: 40,
            lines: 20,
        },
        Some(&term) => TermCommand::Set {
            term: term.to_owned(),
            columns: rest.get(1).and_then(|s| s.parse().ok()).unwrap_or(40),
            lines: rest.get(2).and_then(|s| s.parse().ok()).unwrap_or(20),
        },
    }
}

/// Renders a `nodes_by_name` lookup failure/ambiguity into the standard
/// chat replies used by `!locus`, `!reload`, and `!eject`. A missing or
/// ambiguous node name is a [`GridError::User`], per §7's taxonomy.
pub fn describe_node_match(
    query: &str,
    found: NodeMatch<'_>,
) -> Result<String, crate::error::GridError> {
    match found {
        NodeMatch::None => Err(crate::error::GridError::User(format!(
            ":x: `{query}` is not in the node table."
        ))),
        NodeMatch::Single(name) => Ok(name.to_owned()),
        NodeMatch::Ambiguous(names) => {
            let mut msg = format!(":question: `{query}` matches multiple nodes:\n");
            for n in names {
                msg.push_str(&format!("- `{n}`\n"));
            }
            msg.push_str("\nPlease specify exactly one of the above nodes.");
            Err(crate::error::GridError::User(msg))
        },
    }
}

/// Renders the `!term` getter/setter reply and the `TermSize` (if any) that
/// should be stored in the user's preferences.
pub fn apply_term_command(cmd: &TermCommand, current: Option<TermSize>) -> (String, TermUpdate) {
    match cmd {
        TermCommand::Query => match current {
            None => ("tty mode is currently off".to_owned(), TermUpdate::Unchanged),
            Some(t) => (
                format!("TERM={}, {} x {}", t.name, t.columns, t.lines),
                TermUpdate::Unchanged,
            ),
        },
        TermCommand::Off => (
            ":+1: tty mode has been turned off".to_owned(),
            TermUpdate::Set(None),
        ),
        TermCommand::Set { term, columns, lines } => (
            format!(":+1: tty mode has been turned on\nTERM={term}, {columns} x {lines}"),
            TermUpdate::Set(Some(TermSize {
                name: term.clone(),
                columns: *columns,
                lines: *lines,
            })),
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermUpdate {
    Unchanged,
    Set(Option<TermSize>),
}

/// Whether a command or script dispatch is allowed: the channel gate and
/// the ban list (`GridMiiCogBase.cog_check` / `check_channel`).
pub fn is_allowed(
    configured_channel: Option<&str>,
    message_channel: &str,
    author: &str,
    banned_users: &[String],
) -> bool {
    let channel_ok = configured_channel.map_or(true, |c| c == message_channel);
    channel_ok && !banned_users.iter().any(|u| u == author)
}

/// Renders the `!nodes` reply body.
pub fn render_node_list<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let mut names = names.peekable();
    if names.peek().is_none() {
        return "No nodes are online".to_owned();
    }
    names.map(|n| format!("* {n}")).collect::<Vec<_>>().join("\n")
}

/// Renders the `!jobtail` reply body, padding by one extra line per the
/// original's "there's probably a blank trailing line" heuristic.
pub fn render_jobtail(tail: &[String]) -> String {
    let body = tail.join("\n");
    let output = format!("```ansi\n{body}\n```");
    let char_count = output.chars().count();
    if char_count > crate::job::MESSAGE_LIMIT {
        format!(
            "***Output too large***\nThe message would have been {} characters long, but only {} are allowed",
            char_count,
            crate::job::MESSAGE_LIMIT
        )
    } else {
        output
    }
}

/// Sends the rules file attachment (`!rules`); the bytes themselves come
/// from whatever reads `data/rules.md` at the call site.
pub async fn send_rules(
    chat: &dyn ChatTransport,
    dest: &ChatDestination,
    rules_bytes: Option<Vec<u8>>,
) -> anyhow::Result<()> {
    match rules_bytes {
        Some(bytes) => {
            chat.send_with_attachments(
                dest,
                "",
                vec![crate::transport::ChatAttachment {
                    filename: "rules.md".to_owned(),
                    bytes,
                    url: None,
                }],
            )
            .await?;
        },
        None => {
            chat.send(dest, "rules file not found").await?;
        },
    }
    Ok(())
}

/// The `!upload`/`!download` curl-based job scripts (SPEC_FULL.md §C.9),
/// carried over from `xfer.py`'s `UPLOAD_SCRIPT`/`DOWNLOAD_SCRIPT` templates.
fn upload_script(url: &str) -> String {
    format!(
        "if command -v curl > /dev/null\nthen\n  echo Downloading:\n  echo '{url}'\n  curl -Os '{url}'\nelse\n  echo Please install curl, then download this url:\n  echo '{url}'\nfi\n"
    )
}

/// Finds the job a command is replying to, by matching the replied-to
/// message id against the job table's output messages (`JobControlCog.job_for_reply`).
fn job_for_reply(controller: &Controller, message: &ChatMessage) -> Option<u64> {
    let replied = message.replied_to.as_deref()?;
    controller.jobs.find_by_message_id(replied)
}

/// Publishes an empty-payload signal to the job a command replies to, and
/// tells the user. Shared by `!signal`, `!kill`, and `!ctrl-c`.
async fn signal_job(
    controller: &Controller,
    chat: &dyn ChatTransport,
    broker: &dyn BrokerTransport,
    message: &ChatMessage,
    dest: &ChatDestination,
    signal_num: u32,
) -> anyhow::Result<()> {
    if let Some(jid) = job_for_reply(controller, message) {
        if let Some(job) = controller.jobs.get(jid) {
            broker.publish(&job.signal_topic(signal_num), Vec::new()).await.ok();
            chat.send(dest, &format!("Sent signal {signal_num} to the job")).await?;
        }
    }
    Ok(())
}

/// Executes one parsed [`Command`] against controller state, replying over
/// `chat` and publishing over `broker` as needed. This is the counterpart of
/// `grid_cmd.py`'s three cogs collapsed into one dispatch function, since
/// this crate has no cog/framework layer of its own to hang handlers off of.
pub async fn dispatch(
    controller: &mut Controller,
    chat: &dyn ChatTransport,
    broker: &dyn BrokerTransport,
    message: &ChatMessage,
    cmd: Command,
    rules_bytes: Option<Vec<u8>>,
) -> anyhow::Result<()> {
    let dest = ChatDestination::ReplyTo {
        channel: message.channel.clone(),
        message_id: message.id.clone(),
    };

    if is_admin_command(&cmd) && !message.author_is_admin {
        tracing::info!(author = %message.author, "admin command denied");
        return Ok(());
    }

    match cmd {
        Command::YouGood => {
            chat.send(&dest, ":+1:").await?;
        },

        Command::Nodes => {
            let body = render_node_list(controller.nodes.iter().map(|n| n.name()));
            chat.send(&dest, &body).await?;
        },

        Command::Locus(None) => {
            let prefs = controller.prefs.get(&message.author);
            let content = match prefs.locus {
                None => "You don't have a locus node set.".to_owned(),
                Some(name) if controller.nodes.node_present(&name) => {
                    format!("Commands are being sent to `{name}`.")
                },
                Some(name) => {
                    format!(":warning: Commands are being sent to `{name}`, but that node isn't present.")
                },
            };
            chat.send(&dest, &content).await?;
        },

        Command::Locus(Some(target)) => {
            let name = describe_node_match(&target, controller.nodes.lookup(&target))?;
            controller.prefs.set_locus(&message.author, Some(name.clone()));
            chat.send(&dest, &format!(":+1: Your commands will now run on `{name}`")).await?;
        },

        Command::Jobs => {
            if !controller.jobs.has_jobs() {
                chat.send(&dest, "No jobs running").await?;
            } else {
                let lines: Vec<String> = controller
                    .jobs
                    .iter()
                    .map(|(jid, job)| {
                        let elapsed = humantime::format_duration(std::time::Duration::from_secs(job.elapsed().as_secs()));
                        let jump = job.jump_url().unwrap_or("(no link)");
                        format!(
                            "* #{jid}, started by **{}**, on `{}`, running for **{elapsed}**, see {jump}",
                            job.author(),
                            job.node()
                        )
                    })
                    .collect();
                chat.send(&dest, &lines.join("\n")).await?;
            }
        },

        Command::Term(term_cmd) => {
            let prefs = controller.prefs.get(&message.author);
            let (content, update) = apply_term_command(&term_cmd, prefs.term);
            if let TermUpdate::Set(new_term) = update {
                controller.prefs.set_term(&message.author, new_term);
            }
            chat.send(&dest, &content).await?;
        },

        Command::Rules => {
            send_rules(chat, &dest, rules_bytes).await?;
        },

        Command::JobInfo => {
            if let Some(jid) = job_for_reply(controller, message) {
                if let Some(job) = controller.jobs.get(jid) {
                    let content = format!(
                        "Job #{jid}: node=`{}`, author={}, started={}, elapsed={}s",
                        job.node(),
                        job.author(),
                        job.started(),
                        job.elapsed().as_secs()
                    );
                    chat.send(&dest, &content).await?;
                }
            }
        },

        Command::Eof => {
            if let Some(jid) = job_for_reply(controller, message) {
                if let Some(job) = controller.jobs.get(jid) {
                    broker.publish(&job.eof_topic(), Vec::new()).await.ok();
                }
            }
        },

        Command::Signal(signal_num) => {
            signal_job(controller, chat, broker, message, &dest, signal_num).await?;
        },

        Command::Kill => {
            signal_job(controller, chat, broker, message, &dest, 9).await?;
        },

        Command::CtrlC => {
            signal_job(controller, chat, broker, message, &dest, 2).await?;
        },

        Command::JobTail(lines) => {
            if let Some(jid) = job_for_reply(controller, message) {
                if let Some(job) = controller.jobs.get(jid) {
                    // +1 because there's probably a blank trailing line the
                    // user isn't counting.
                    let tail = job.tail(lines + 1);
                    chat.send(&dest, &render_jobtail(&tail)).await?;
                }
            }
        },

        Command::Scram => match broker.publish("grid/scram", Vec::new()).await {
            Ok(()) => {
                chat.send(&dest, ":+1: wait for the jobs to complete").await?;
            },
            Err(error) => {
                chat.send(&dest, &format!("**Couldn't send scram request**: {error}")).await?;
            },
        },

        Command::Reload(node) => {
            let name = describe_node_match(&node, controller.nodes.lookup(&node))?;
            broker.publish(&format!("{name}/reload"), Vec::new()).await.ok();
            chat.send(&dest, &format!(":+1: Reloaded `{name}`")).await?;
        },

        Command::Eject(node) => {
            let name = describe_node_match(&node, controller.nodes.lookup(&node))?;
            controller.nodes.eject(&name);
            broker.publish(&format!("{name}/exit"), Vec::new()).await.ok();
            chat.send(&dest, ":+1:").await?;
        },

        Command::Abandon(jid) => {
            let jump_url = controller.jobs.get(jid).and_then(|j| j.jump_url()).map(|s| s.to_owned());
            if controller.abandon_job(chat, broker, jid).await? {
                let suffix = jump_url.map(|url| format!(", see {url}")).unwrap_or_default();
                chat.send(&dest, &format!(":+1:{suffix}")).await?;
            } else {
                chat.send(&dest, &format!(":x: job #{jid} is not in the job table")).await?;
            }
        },

        Command::RollCall => {
            broker.publish(crate::controller::ROLL_CALL_TOPIC, Vec::new()).await.ok();
            chat.send(&dest, ":+1:").await?;
        },

        Command::Upload => match message.attachments.first() {
            None => {
                chat.send(&dest, ":x: You need to attach one or more files").await?;
            },
            Some(attachment) => {
                if message.attachments.len() > 1 {
                    chat.send(&dest, ":x: Currently only one file at a time can be uploaded").await?;
                }
                let url = attachment.url.as_deref().unwrap_or(&attachment.filename);
                let script = upload_script(url);
                controller
                    .submit(
                        chat,
                        |topic, payload| async move { broker.publish(&topic, payload).await },
                        dest,
                        &message.author,
                        &script,
                        Controller::default_filter(),
                    )
                    .await?;
            },
        },

        Command::Download(_file) => {
            if controller.relay_configured() {
                chat.send(&dest, "***TODO STUB***, but the relay is operational :+1:").await?;
            } else {
                chat.send(&dest, ":x: File downloads are not currently available").await?;
            }
        },

        Command::Neofetch => {
            controller
                .submit(
                    chat,
                    |topic, payload| async move { broker.publish(&topic, payload).await },
                    dest,
                    &message.author,
                    Controller::neofetch_script(),
                    Controller::neofetch_filter(),
                )
                .await?;
        },
    }

    Ok(())
}
