//! Line-oriented chat transport over any async reader/writer pair.
//!
//! Plain lines become group-chat messages. A few `!` directives simulate the other
//! inbound events:
//! - `!private <text>`: message from a one-to-one chat
//! - `!select <token>`: the user picked a selection option
//! - `!join <name>[,<name>...]`: members joined the group

use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use marquee_core::{
    ChatAction, ChatId, ChatKind, ChatRef, ChatTransport, DeliveryOptions, EventSource,
    InboundEvent, InboundMessage, MessageHandle,
};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, warn};

/// Chat id used for plain input lines.
pub const GROUP_CHAT_ID: ChatId = ChatId(-100);
/// Chat id used for `!private` lines.
pub const PRIVATE_CHAT_ID: ChatId = ChatId(1);

const GROUP_TITLE: &str = "console";
const CONSOLE_USER: &str = "console";

/// Chat transport backed by a line reader and a writer.
pub struct ConsoleTransport<R, W> {
    lines: Mutex<LinesStream<R>>,
    out: Mutex<W>,
    next_message_id: AtomicI64,
}

impl ConsoleTransport<BufReader<Stdin>, Stdout> {
    /// Transport bound to the process stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> ConsoleTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap a reader and writer.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: Mutex::new(LinesStream::new(tokio::io::AsyncBufReadExt::lines(reader))),
            out: Mutex::new(writer),
            next_message_id: AtomicI64::new(1),
        }
    }

    /// Consume the transport and return the writer.
    pub fn into_writer(self) -> W {
        self.out.into_inner()
    }

    fn allocate_message_id(&self) -> i64 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn write_block(&self, block: String) -> anyhow::Result<()> {
        let mut out = self.out.lock().await;
        out.write_all(block.as_bytes())
            .await
            .context("failed to write console output")?;
        out.flush().await.context("failed to flush console output")
    }
}

#[async_trait]
impl<R, W> ChatTransport for ConsoleTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn deliver(
        &self,
        chat_id: ChatId,
        text: &str,
        options: DeliveryOptions,
    ) -> anyhow::Result<MessageHandle> {
        let handle = MessageHandle {
            chat_id,
            message_id: self.allocate_message_id(),
        };
        let mut block = format!("[chat {chat_id} #{}] {text}\n", handle.message_id);
        for option in &options.selections {
            block.push_str(&format!("    [{}] {}\n", option.token, option.label));
        }
        for attachment in &options.attachments {
            block.push_str(&format!("    + {}\n", attachment.display()));
        }
        self.write_block(block).await?;
        Ok(handle)
    }

    async fn edit(&self, handle: MessageHandle, text: &str) -> anyhow::Result<()> {
        self.write_block(format!(
            "[chat {} #{} edited] {text}\n",
            handle.chat_id, handle.message_id
        ))
        .await
    }

    async fn notify_action(&self, chat_id: ChatId, action: ChatAction) -> anyhow::Result<()> {
        debug!(chat_id = %chat_id, ?action, "chat action");
        Ok(())
    }
}

#[async_trait]
impl<R, W> EventSource for ConsoleTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn next_event(&self) -> Option<InboundEvent> {
        let mut lines = self.lines.lock().await;
        loop {
            match lines.next().await? {
                Ok(line) => {
                    if let Some(event) = parse_line(&line, self.allocate_message_id()) {
                        return Some(event);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "console input failed");
                    return None;
                }
            }
        }
    }
}

/// Translate one input line into an inbound event; blank lines yield `None`.
#[must_use]
pub fn parse_line(line: &str, message_id: i64) -> Option<InboundEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(rest) = directive(trimmed, "!private") {
        return Some(InboundEvent::Message(InboundMessage {
            chat: private_chat(),
            message_id,
            sender: Some(CONSOLE_USER.to_string()),
            text: rest.to_string(),
        }));
    }
    if let Some(rest) = directive(trimmed, "!select") {
        if rest.is_empty() {
            return None;
        }
        return Some(InboundEvent::Selection {
            chat: group_chat(),
            token: rest.to_string(),
            message: None,
        });
    }
    if let Some(rest) = directive(trimmed, "!join") {
        let members: Vec<String> = rest
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .collect();
        if members.is_empty() {
            return None;
        }
        return Some(InboundEvent::MembersJoined {
            chat: group_chat(),
            members,
        });
    }
    Some(InboundEvent::Message(InboundMessage {
        chat: group_chat(),
        message_id,
        sender: Some(CONSOLE_USER.to_string()),
        text: trimmed.to_string(),
    }))
}

fn directive<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

fn group_chat() -> ChatRef {
    ChatRef {
        id: GROUP_CHAT_ID,
        kind: ChatKind::Supergroup,
        title: Some(GROUP_TITLE.to_string()),
    }
}

const fn private_chat() -> ChatRef {
    ChatRef {
        id: PRIVATE_CHAT_ID,
        kind: ChatKind::Private,
        title: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::SelectionOption;
    use std::path::PathBuf;

    #[test]
    fn plain_lines_are_group_messages() {
        let Some(InboundEvent::Message(message)) = parse_line("  /search dune ", 7) else {
            panic!("expected message");
        };
        assert_eq!(message.text, "/search dune");
        assert_eq!(message.chat.id, GROUP_CHAT_ID);
        assert!(message.chat.kind.is_group());
        assert_eq!(message.message_id, 7);
    }

    #[test]
    fn directives_map_to_events() {
        assert!(matches!(
            parse_line("!private hello", 1),
            Some(InboundEvent::Message(InboundMessage { ref chat, .. }))
                if chat.kind == ChatKind::Private
        ));
        assert!(matches!(
            parse_line("!select 42", 1),
            Some(InboundEvent::Selection { ref token, .. }) if token == "42"
        ));
        assert!(matches!(
            parse_line("!join ana, bo", 1),
            Some(InboundEvent::MembersJoined { ref members, .. }) if members.len() == 2
        ));
    }

    #[test]
    fn blank_and_empty_directives_are_skipped() {
        assert!(parse_line("   ", 1).is_none());
        assert!(parse_line("!select", 1).is_none());
        assert!(parse_line("!join ,", 1).is_none());
        assert!(matches!(
            parse_line("!selection", 1),
            Some(InboundEvent::Message(_))
        ));
    }

    #[tokio::test]
    async fn events_are_read_in_order_until_eof() {
        let input: &[u8] = b"first\n\n!select 9\n";
        let transport = ConsoleTransport::new(input, Vec::new());
        assert!(matches!(
            transport.next_event().await,
            Some(InboundEvent::Message(_))
        ));
        assert!(matches!(
            transport.next_event().await,
            Some(InboundEvent::Selection { .. })
        ));
        assert!(transport.next_event().await.is_none());
    }

    #[tokio::test]
    async fn deliver_writes_options_and_attachments() -> anyhow::Result<()> {
        let input: &[u8] = b"";
        let transport = ConsoleTransport::new(input, Vec::new());
        let handle = transport
            .deliver(
                GROUP_CHAT_ID,
                "pick one",
                DeliveryOptions {
                    selections: vec![SelectionOption {
                        label: "1".to_string(),
                        token: "123".to_string(),
                    }],
                    attachments: vec![PathBuf::from("downloads/movie.mkv")],
                    reply_to: None,
                },
            )
            .await?;
        transport.edit(handle, "updated").await?;
        let written = String::from_utf8(transport.into_writer())?;
        assert!(written.contains("pick one"));
        assert!(written.contains("[123] 1"));
        assert!(written.contains("+ downloads/movie.mkv"));
        assert!(written.contains("edited] updated"));
        Ok(())
    }
}
