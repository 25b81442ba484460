//! Human-readable lines recorded in the caches.

use chrono::{DateTime, Local};

/// Timestamp layout used in notices.
pub const NOTICE_TIME_FORMAT: &str = "%Y-%m-%d:%H:%M:%S";

/// Which side of the conversation a notice describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Written by the local user.
    Outgoing,
    /// Written by the peer.
    Incoming,
}

fn stamp(at: DateTime<Local>) -> String {
    at.format(NOTICE_TIME_FORMAT).to_string()
}

fn speaker(contact: &str, side: Side) -> &str {
    match side {
        Side::Outgoing => "You",
        Side::Incoming => contact,
    }
}

/// `[ts](private - contact) who said: text`
#[must_use]
pub fn private_text(text: &str, contact: &str, side: Side) -> String {
    private_text_at(Local::now(), text, contact, side)
}

/// `[ts](private - contact): who secure sent file 'name'`
#[must_use]
pub fn private_file(file_name: &str, contact: &str, side: Side) -> String {
    private_file_at(Local::now(), file_name, contact, side)
}

/// `[ts](global) text` on receive, `[ts](global) You said: text` on send.
#[must_use]
pub fn global(text: &str, side: Side) -> String {
    global_at(Local::now(), text, side)
}

pub(crate) fn private_text_at(
    at: DateTime<Local>,
    text: &str,
    contact: &str,
    side: Side,
) -> String {
    format!(
        "[{}](private - {contact}) {} said: {text}",
        stamp(at),
        speaker(contact, side)
    )
}

pub(crate) fn private_file_at(
    at: DateTime<Local>,
    file_name: &str,
    contact: &str,
    side: Side,
) -> String {
    format!(
        "[{}](private - {contact}): {} secure sent file '{file_name}'",
        stamp(at),
        speaker(contact, side)
    )
}

pub(crate) fn global_at(at: DateTime<Local>, text: &str, side: Side) -> String {
    match side {
        Side::Outgoing => format!("[{}](global) You said: {text}", stamp(at)),
        Side::Incoming => format!("[{}](global) {text}", stamp(at)),
    }
}
