//! IMAP mailbox for inbound items, SMTP via lettre for replies.
//!
//! IMAP is spoken directly over a rustls stream. Every operation opens its
//! own session and runs under `spawn_blocking`.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox as Address;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::{MessageParser, MimeHeaders};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

use crate::channels::{Mailbox, OutgoingReply};
use crate::error::ChannelError;
use crate::workflow::state::SourceItem;

const CHANNEL_NAME: &str = "email";

/// Email channel configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    pub poll_interval_secs: u64,
}

impl EmailConfig {
    /// Build config from environment variables.
    /// Returns `None` if `EMAIL_IMAP_HOST` is not set (mailbox disabled).
    pub fn from_env() -> Option<Self> {
        let imap_host = std::env::var("EMAIL_IMAP_HOST").ok()?;

        let imap_port: u16 = std::env::var("EMAIL_IMAP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let smtp_host =
            std::env::var("EMAIL_SMTP_HOST").unwrap_or_else(|_| imap_host.replace("imap", "smtp"));

        let smtp_port: u16 = std::env::var("EMAIL_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("EMAIL_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("EMAIL_PASSWORD").unwrap_or_default());
        let from_address = std::env::var("EMAIL_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        let poll_interval_secs: u64 = std::env::var("EMAIL_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        Some(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
            poll_interval_secs,
        })
    }
}

/// Mailbox backed by an IMAP inbox and an SMTP relay. Item ids are IMAP UIDs.
pub struct ImapMailbox {
    config: EmailConfig,
}

impl ImapMailbox {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn send_blocking(config: &EmailConfig, reply: &OutgoingReply) -> Result<(), ChannelError> {
        let send_err = |reason: String| ChannelError::SendFailed {
            name: CHANNEL_NAME.into(),
            reason,
        };

        let from: Address = config
            .from_address
            .parse()
            .map_err(|e| send_err(format!("Invalid from address: {e}")))?;
        let to: Address = reply
            .to
            .parse()
            .map_err(|e| send_err(format!("Invalid to address: {e}")))?;

        let mut builder = Message::builder().from(from).to(to).subject(&reply.subject);
        for cc in &reply.cc {
            let addr: Address = cc
                .parse()
                .map_err(|e| send_err(format!("Invalid cc address {cc}: {e}")))?;
            builder = builder.cc(addr);
        }
        if let Some(id) = &reply.in_reply_to {
            builder = builder.in_reply_to(id.clone()).references(id.clone());
        }
        let email = builder
            .body(reply.body.clone())
            .map_err(|e| send_err(format!("Failed to build email: {e}")))?;

        let relay = if config.smtp_port == 465 {
            SmtpTransport::relay(&config.smtp_host)
        } else {
            SmtpTransport::starttls_relay(&config.smtp_host)
        };
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );
        let transport = relay
            .map_err(|e| send_err(format!("SMTP relay error: {e}")))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        transport
            .send(&email)
            .map_err(|e| send_err(format!("SMTP send failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn fetch_unseen(&self) -> Result<Vec<SourceItem>, ChannelError> {
        let cfg = self.config.clone();
        let fetched = tokio::task::spawn_blocking(move || fetch_unseen_imap(&cfg))
            .await
            .map_err(|e| fetch_err(format!("IMAP task panicked: {e}")))?
            .map_err(|e| fetch_err(e.to_string()))?;

        let own = self.config.from_address.to_lowercase();
        let items: Vec<SourceItem> = fetched
            .into_iter()
            .filter(|item| {
                let self_sent = item.sender.eq_ignore_ascii_case(&own);
                if self_sent {
                    tracing::debug!(uid = %item.id, "Skipping self-sent email");
                }
                !self_sent
            })
            .collect();

        tracing::debug!(count = items.len(), "Fetched unseen emails");
        Ok(items)
    }

    async fn mark_as_read(&self, id: &str) -> Result<(), ChannelError> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ChannelError::InvalidMessage(format!(
                "'{id}' is not an IMAP UID"
            )));
        }

        let cfg = self.config.clone();
        let uid = id.to_string();
        let mark_err = |reason: String| ChannelError::MarkFailed {
            name: CHANNEL_NAME.into(),
            id: id.to_string(),
            reason,
        };
        tokio::task::spawn_blocking(move || mark_seen_imap(&cfg, &uid))
            .await
            .map_err(|e| mark_err(format!("IMAP task panicked: {e}")))?
            .map_err(|e| mark_err(e.to_string()))?;

        tracing::info!(uid = %id, "Marked email as read");
        Ok(())
    }

    async fn send_reply(&self, reply: OutgoingReply) -> Result<(), ChannelError> {
        let cfg = self.config.clone();
        let to = reply.to.clone();
        tokio::task::spawn_blocking(move || Self::send_blocking(&cfg, &reply))
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("SMTP task panicked: {e}"),
            })??;

        tracing::info!(to = %to, "Email sent");
        Ok(())
    }
}

fn fetch_err(reason: String) -> ChannelError {
    ChannelError::FetchFailed {
        name: CHANNEL_NAME.into(),
        reason,
    }
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Quote a string for use as an IMAP astring.
pub fn quote_imap(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Collect the UIDs from `* SEARCH` lines.
pub fn parse_search_response(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace())
        .filter(|uid| uid.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// Build a source item from a raw RFC 822 message.
pub fn parse_message(uid: &str, raw: &[u8]) -> Option<SourceItem> {
    let parsed = MessageParser::default().parse(raw)?;

    let sender = extract_addresses(parsed.from())
        .into_iter()
        .next()
        .unwrap_or_else(|| "unknown".into());
    let recipients = extract_addresses(parsed.to());
    let subject = parsed.subject().unwrap_or("(no subject)").to_string();
    let body = extract_text(&parsed);
    let thread_id = parsed.message_id().map(|id| format!("<{id}>"));
    let received_at = parsed
        .date()
        .and_then(|d| chrono::DateTime::from_timestamp(d.to_timestamp(), 0));

    Some(SourceItem {
        id: uid.to_string(),
        sender,
        recipients,
        subject,
        body,
        thread_id,
        received_at,
    })
}

/// Extract email addresses from an optional mail_parser address field.
fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}

/// Extract readable text from a parsed email.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.trim().to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        let part: &mail_parser::MessagePart = part;
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            let name = MimeHeaders::attachment_name(part).unwrap_or("file");
            return format!("[Attachment: {name}]\n{text}");
        }
    }
    "(no readable content)".to_string()
}

// ── IMAP session ────────────────────────────────────────────────────

type ImapError = Box<dyn std::error::Error + Send + Sync>;
type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Untagged lines of a command response plus any literal payloads.
#[derive(Debug, Default)]
struct ImapResponse {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

/// A logged-in IMAP session (blocking; run in spawn_blocking).
struct ImapSession {
    stream: BufReader<TlsStream>,
    tag: u32,
    literal: Regex,
}

impl ImapSession {
    fn connect(config: &EmailConfig) -> Result<Self, ImapError> {
        let tcp = TcpStream::connect((&*config.imap_host, config.imap_port))?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)?;

        let mut session = Self {
            stream: BufReader::new(rustls::StreamOwned::new(conn, tcp)),
            tag: 0,
            literal: Regex::new(r"\{(\d+)\}\r?\n$")?,
        };

        let _greeting = session.read_line()?;
        session.command(&format!(
            "LOGIN {} {}",
            quote_imap(&config.username),
            quote_imap(config.password.expose_secret())
        ))?;
        session.command("SELECT \"INBOX\"")?;
        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, ImapError> {
        let mut buf = Vec::new();
        if self.stream.read_until(b'\n', &mut buf)? == 0 {
            return Err("IMAP connection closed".into());
        }
        Ok(String::from_utf8_lossy(&buf).to_string())
    }

    /// Send a tagged command and collect everything up to its completion.
    fn command(&mut self, cmd: &str) -> Result<ImapResponse, ImapError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        let stream = self.stream.get_mut();
        stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        stream.flush()?;

        let mut response = ImapResponse::default();
        loop {
            let line = self.read_line()?;

            if let Some(status) = line.strip_prefix(&format!("{tag} ")) {
                if status.starts_with("OK") {
                    return Ok(response);
                }
                let verb = cmd.split_whitespace().next().unwrap_or(cmd);
                return Err(format!("IMAP {verb} failed: {}", status.trim()).into());
            }

            let literal_len = self
                .literal
                .captures(&line)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<usize>().ok());
            if let Some(len) = literal_len {
                let mut payload = vec![0u8; len];
                self.stream.read_exact(&mut payload)?;
                response.literals.push(payload);
            }
            response.lines.push(line);
        }
    }

    fn logout(mut self) {
        if let Err(e) = self.command("LOGOUT") {
            tracing::debug!("IMAP logout failed: {e}");
        }
    }
}

/// Fetch unseen messages without changing their flags.
fn fetch_unseen_imap(config: &EmailConfig) -> Result<Vec<SourceItem>, ImapError> {
    let mut session = ImapSession::connect(config)?;

    let search = session.command("UID SEARCH UNSEEN")?;
    let uids = parse_search_response(&search.lines);

    let mut items = Vec::new();
    for uid in &uids {
        let fetched = session.command(&format!("UID FETCH {uid} BODY.PEEK[]"))?;
        let Some(raw) = fetched.literals.first() else {
            tracing::warn!(uid = %uid, "IMAP fetch returned no message body");
            continue;
        };
        match parse_message(uid, raw) {
            Some(item) => items.push(item),
            None => tracing::warn!(uid = %uid, "Failed to parse email"),
        }
    }

    session.logout();
    Ok(items)
}

fn mark_seen_imap(config: &EmailConfig, uid: &str) -> Result<(), ImapError> {
    let mut session = ImapSession::connect(config)?;
    session.command(&format!("UID STORE {uid} +FLAGS (\\Seen)"))?;
    session.logout();
    Ok(())
}
