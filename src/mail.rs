use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use regex::Regex;
use serde::Serialize;

use crate::error::EmailDeliveryError;
use crate::model::EmailDeliveryEntry;
use crate::pipeline::{ARCHIVE_CONTENT_TYPE, Archive};
use crate::util::{sha256_hex, utc_compact_string, write_bytes_atomic};

pub const DEFAULT_SUBJECT: &str = "Your UPS Shipment Split Files";
pub const DEFAULT_BODY: &str = "Attached is your ZIP file containing split shipment data.";

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    pub attachment_bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: bool,
    pub diagnostic: String,
}

/// Transport for prepared messages. Implementations own their timeouts and
/// must not retry; the caller only inspects the report.
pub trait EmailSender {
    fn send(&self, message: &OutgoingEmail) -> DeliveryReport;
}

static ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("address pattern is valid")
});

pub fn validate_address(address: &str) -> Result<String, EmailDeliveryError> {
    let trimmed = address.trim();
    if ADDRESS_PATTERN.is_match(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(EmailDeliveryError::InvalidAddress(trimmed.to_string()))
    }
}

/// One message per archive. Per-group archives get the archive stem in the
/// subject so the recipient can tell them apart.
pub fn prepare_messages(
    archives: &[Archive],
    from: &str,
    to: &str,
    per_group: bool,
) -> Result<Vec<OutgoingEmail>, EmailDeliveryError> {
    let from = validate_address(from)?;
    let to = validate_address(to)?;

    Ok(archives
        .iter()
        .map(|archive| {
            let subject = if per_group {
                let stem = archive.name.strip_suffix(".zip").unwrap_or(&archive.name);
                format!("{DEFAULT_SUBJECT} - {stem}")
            } else {
                DEFAULT_SUBJECT.to_string()
            };
            OutgoingEmail {
                from: from.clone(),
                to: to.clone(),
                subject,
                body: DEFAULT_BODY.to_string(),
                attachment_name: archive.name.clone(),
                attachment_bytes: archive.bytes.clone(),
                content_type: ARCHIVE_CONTENT_TYPE.to_string(),
            }
        })
        .collect())
}

/// Sends every message and reports each result. Failures are collected, not
/// propagated, so they never touch the archives already produced.
pub fn deliver_all(
    sender: &dyn EmailSender,
    messages: &[OutgoingEmail],
) -> (Vec<EmailDeliveryEntry>, Vec<EmailDeliveryError>) {
    let mut entries = Vec::with_capacity(messages.len());
    let mut failures = Vec::new();

    for message in messages {
        let report = sender.send(message);
        if !report.delivered {
            failures.push(EmailDeliveryError::Rejected {
                to: message.to.clone(),
                attachment: message.attachment_name.clone(),
                diagnostic: report.diagnostic.clone(),
            });
        }
        entries.push(EmailDeliveryEntry {
            to: message.to.clone(),
            subject: message.subject.clone(),
            attachment_name: message.attachment_name.clone(),
            delivered: report.delivered,
            diagnostic: report.diagnostic,
        });
    }

    (entries, failures)
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
    attachments: Vec<Attachment<'a>>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct Attachment<'a> {
    content: String,
    filename: &'a str,
    #[serde(rename = "type")]
    content_type: &'a str,
    disposition: &'a str,
}

/// Drops each message as a JSON send request into a directory that a relay
/// process drains.
pub struct OutboxSender {
    dir: PathBuf,
}

impl OutboxSender {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn enqueue(&self, message: &OutgoingEmail) -> Result<PathBuf> {
        let request = SendRequest {
            personalizations: vec![Personalization {
                to: vec![Address { email: &message.to }],
            }],
            from: Address {
                email: &message.from,
            },
            subject: &message.subject,
            content: vec![Content {
                content_type: "text/plain",
                value: &message.body,
            }],
            attachments: vec![Attachment {
                content: STANDARD.encode(&message.attachment_bytes),
                filename: &message.attachment_name,
                content_type: &message.content_type,
                disposition: "attachment",
            }],
        };

        let mut payload =
            serde_json::to_vec_pretty(&request).context("failed to serialize send request")?;
        payload.push(b'\n');

        let digest = sha256_hex(&payload);
        let path = self.dir.join(format!(
            "outbox_{}_{}.json",
            utc_compact_string(Utc::now()),
            digest.get(..12).unwrap_or(digest.as_str())
        ));
        write_bytes_atomic(&path, &payload)?;
        Ok(path)
    }
}

impl EmailSender for OutboxSender {
    fn send(&self, message: &OutgoingEmail) -> DeliveryReport {
        match self.enqueue(message) {
            Ok(path) => DeliveryReport {
                delivered: true,
                diagnostic: format!("queued {}", path.display()),
            },
            Err(err) => DeliveryReport {
                delivered: false,
                diagnostic: format!("{err:#}"),
            },
        }
    }
}
