//! Console input classification.
//!
//! The first character of a trimmed line selects the command kind:
//!
//! | marker | meaning                          |
//! |--------|----------------------------------|
//! | `@`    | private text: `@bob hello`       |
//! | `#`    | private file: `#bob notes.txt`   |
//! | `&`    | control: `&quit`, `&help`, `&stats` |
//! | `$`    | history: `$` (shared) or `$bob`  |
//! | other  | global broadcast text            |

/// Lines printed by `&help`.
pub const HELP_LINES: &[&str] = &[
    "?? HELP ??",
    "-----",
    "You can enter commands as &command, private text messages as @target content, private files as #target filename",
    "Commands:",
    "\thelp: this help dialog",
    "\tstats: message counters for this session",
    "\tquit: quit the application",
    "Private messages are 1-1, end-to-end encrypted, and delivered as binary frames",
    "Global messages are to everyone, unencrypted, and delivered as JSON",
    "You can view past message history by using $contact, where contact is either blank (for shared messages) or the contact to print the history of",
    "-----",
];

/// Control commands introduced by `&`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// End the session.
    Quit,
    /// Print [`HELP_LINES`].
    Help,
    /// Print the counter snapshot.
    Stats,
    /// Anything else, lowercased.
    Unknown(String),
}

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Encrypted text for one contact.
    PrivateText {
        /// Recipient.
        target: String,
        /// Message body.
        text: String,
    },
    /// Encrypted file for one contact.
    PrivateFile {
        /// Recipient.
        target: String,
        /// Path relative to the working directory.
        path: String,
    },
    /// Session control.
    Control(Control),
    /// Print history: `None` for the shared log, otherwise a contact.
    History(Option<String>),
    /// Unencrypted broadcast.
    Global(String),
}

/// User-facing rejection of a console line. `Display` is the exact line
/// printed to the console.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// `@` with no recipient.
    #[error("Syntax: @recipient 'message to send'")]
    PrivateTextSyntax,

    /// `#` with no recipient.
    #[error("Syntax: #target <file_name>")]
    PrivateFileSyntax,

    /// `@target` with nothing after it.
    #[error("You cannot send an empty message")]
    EmptyMessage,

    /// `#target` with nothing after it.
    #[error("You cannot send an empty file private message")]
    EmptyFile,

    /// `@self ...`
    #[error("Error: cannot secure send messages to yourself")]
    SelfMessage,

    /// `#self path`
    #[error("Error: cannot secure send file {0} to yourself")]
    SelfFile(String),

    /// `#target path` where `path` is not a readable file.
    #[error("Error: cannot find file '{0}'")]
    FileNotFound(String),
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split `body` (the text after the marker) into a target token and the
/// payload, skipping exactly one separator character after the target.
///
/// Returns `None` when no target token is present and `Some((target, None))`
/// when nothing follows it.
fn split_target(body: &str, in_target: fn(char) -> bool) -> Option<(&str, Option<&str>)> {
    let end = body
        .char_indices()
        .find(|&(_, c)| !in_target(c))
        .map_or(body.len(), |(i, _)| i);
    if end == 0 {
        return None;
    }
    let (target, rest) = body.split_at(end);
    let mut chars = rest.chars();
    let payload = chars.next().map(|_| chars.as_str());
    Some((target, payload.filter(|p| !p.is_empty())))
}

/// Classify one console line.
///
/// Returns `Ok(None)` for blank input.
///
/// # Errors
///
/// [`CommandError`] for malformed private commands.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let input = line.trim();
    let mut chars = input.chars();
    let Some(marker) = chars.next() else {
        return Ok(None);
    };
    let body = chars.as_str();

    let command = match marker {
        '@' => {
            let (target, text) =
                split_target(body, is_word_char).ok_or(CommandError::PrivateTextSyntax)?;
            let text = text.ok_or(CommandError::EmptyMessage)?;
            Command::PrivateText {
                target: target.to_string(),
                text: text.to_string(),
            }
        }
        '#' => {
            let (target, path) = split_target(body, |c| !c.is_whitespace())
                .ok_or(CommandError::PrivateFileSyntax)?;
            let path = path.ok_or(CommandError::EmptyFile)?;
            Command::PrivateFile {
                target: target.to_string(),
                path: path.to_string(),
            }
        }
        '&' => Command::Control(match body.trim().to_lowercase().as_str() {
            "quit" => Control::Quit,
            "help" => Control::Help,
            "stats" => Control::Stats,
            other => Control::Unknown(other.to_string()),
        }),
        '$' => {
            let contact = body.trim();
            Command::History((!contact.is_empty()).then(|| contact.to_string()))
        }
        _ => Command::Global(input.to_string()),
    };
    Ok(Some(command))
}
