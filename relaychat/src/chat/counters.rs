//! Lock-free per-category message counters.
//!
//! Every message that enters the pipeline bumps exactly one "initiated"
//! cell for its category and later at most one of "succeeded" or "failed".
//! The sent-packets initiated cell doubles as the outbound message id
//! sequence, and the received-packets initiated cell as the inbound blob id
//! sequence.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which way a message travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Outbound.
    Sent,
    /// Inbound.
    Received,
}

/// What kind of message a counter tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Every frame, regardless of kind.
    Packets,
    /// Private text messages.
    PrivateText,
    /// Private file messages.
    PrivateFile,
    /// Broadcast chat.
    Global,
}

/// Lifecycle stage of a counted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Accepted into the pipeline (sent) or arrived (received).
    Initiated,
    /// Dispatched (sent) or fully processed (received).
    Succeeded,
    /// Dropped because of an error.
    Failed,
}

const DIRECTIONS: [Direction; 2] = [Direction::Sent, Direction::Received];
const CATEGORIES: [Category; 4] = [
    Category::Packets,
    Category::PrivateText,
    Category::PrivateFile,
    Category::Global,
];
const STAGES: [Stage; 3] = [Stage::Initiated, Stage::Succeeded, Stage::Failed];
const CELLS: usize = DIRECTIONS.len() * CATEGORIES.len() * STAGES.len();

impl Direction {
    const fn index(self) -> usize {
        match self {
            Self::Sent => 0,
            Self::Received => 1,
        }
    }
}

impl Category {
    const fn index(self) -> usize {
        match self {
            Self::Packets => 0,
            Self::PrivateText => 1,
            Self::PrivateFile => 2,
            Self::Global => 3,
        }
    }

    /// Private category for a text or file message.
    #[must_use]
    pub const fn private(is_file: bool) -> Self {
        if is_file {
            Self::PrivateFile
        } else {
            Self::PrivateText
        }
    }
}

impl Stage {
    const fn index(self) -> usize {
        match self {
            Self::Initiated => 0,
            Self::Succeeded => 1,
            Self::Failed => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Packets => write!(f, "packets"),
            Self::PrivateText => write!(f, "private messages"),
            Self::PrivateFile => write!(f, "private files"),
            Self::Global => write!(f, "global messages"),
        }
    }
}

const fn cell(direction: Direction, category: Category, stage: Stage) -> usize {
    (direction.index() * CATEGORIES.len() + category.index()) * STAGES.len() + stage.index()
}

/// The full counter table.
#[derive(Debug)]
pub struct Counters {
    cells: [AtomicU64; CELLS],
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    /// All counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cells: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Increment one counter and return its new value.
    pub fn increment(&self, direction: Direction, category: Category, stage: Stage) -> u64 {
        self.cells[cell(direction, category, stage)].fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current value of one counter.
    #[must_use]
    pub fn get(&self, direction: Direction, category: Category, stage: Stage) -> u64 {
        self.cells[cell(direction, category, stage)].load(Ordering::Relaxed)
    }

    /// Allocate the next outbound message id.
    pub fn next_message_id(&self) -> u64 {
        self.increment(Direction::Sent, Category::Packets, Stage::Initiated)
    }

    /// Allocate the next inbound blob id.
    pub fn next_blob_id(&self) -> u64 {
        self.increment(Direction::Received, Category::Packets, Stage::Initiated)
    }

    /// Record the outcome of one message in both its own category and the
    /// packet totals.
    pub fn record_outcome(&self, direction: Direction, category: Category, succeeded: bool) {
        let stage = if succeeded {
            Stage::Succeeded
        } else {
            Stage::Failed
        };
        self.increment(direction, category, stage);
        if category != Category::Packets {
            self.increment(direction, Category::Packets, stage);
        }
    }

    /// Point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        let mut rows = Vec::with_capacity(DIRECTIONS.len() * CATEGORIES.len());
        for direction in DIRECTIONS {
            for category in CATEGORIES {
                rows.push(CounterRow {
                    direction,
                    category,
                    initiated: self.get(direction, category, Stage::Initiated),
                    succeeded: self.get(direction, category, Stage::Succeeded),
                    failed: self.get(direction, category, Stage::Failed),
                });
            }
        }
        CounterSnapshot { rows }
    }
}

/// One line of a [`CounterSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRow {
    /// Direction of the row.
    pub direction: Direction,
    /// Category of the row.
    pub category: Category,
    /// Initiated (sent) or arrived (received).
    pub initiated: u64,
    /// Dispatched or processed.
    pub succeeded: u64,
    /// Failed.
    pub failed: u64,
}

/// Copy of the counter table, printable with `&stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    rows: Vec<CounterRow>,
}

impl CounterSnapshot {
    /// Look up one row.
    #[must_use]
    pub fn row(&self, direction: Direction, category: Category) -> Option<&CounterRow> {
        self.rows
            .iter()
            .find(|r| r.direction == direction && r.category == category)
    }

    /// Render as console lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| match r.direction {
                Direction::Sent => format!(
                    "sent {}: {} initiated, {} dispatched, {} failed",
                    r.category, r.initiated, r.succeeded, r.failed
                ),
                Direction::Received => format!(
                    "received {}: {} received, {} processed, {} failed",
                    r.category, r.initiated, r.succeeded, r.failed
                ),
            })
            .collect()
    }
}
