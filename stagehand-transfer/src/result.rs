//! Pull-based stream of per-file terminal outcomes.

/// Status of one finished file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferStatus {
    Succeed,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Succeed => "SUCCEED",
            TransferStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One terminal per-file entry.
#[derive(Clone, Debug)]
pub struct TransferEntry {
    /// Source file name as staged.
    pub src: String,
    /// Remote path (uploads) or local destination (downloads).
    pub target: String,
    /// Logical file size in bytes.
    pub size: u64,
    pub status: TransferStatus,
    /// Failure reason; empty on success.
    pub detail: String,
}

#[derive(Clone, Copy, Debug)]
enum Cursor {
    NotStarted,
    At(usize),
    Ended,
}

/// Ordered, non-restartable result stream.
///
/// Entries appear in input-file order and only ever in a terminal state —
/// mid-retry states are never observable. Once `advance` returns false the
/// stream has ended for good.
#[derive(Debug)]
pub struct TransferResult {
    entries: Vec<TransferEntry>,
    cursor: Cursor,
}

impl TransferResult {
    pub(crate) fn new(entries: Vec<TransferEntry>) -> Self {
        Self {
            entries,
            cursor: Cursor::NotStarted,
        }
    }

    /// Moves to the next entry; false signals end of stream.
    pub fn advance(&mut self) -> bool {
        self.cursor = match self.cursor {
            Cursor::NotStarted if !self.entries.is_empty() => Cursor::At(0),
            Cursor::At(i) if i + 1 < self.entries.len() => Cursor::At(i + 1),
            _ => Cursor::Ended,
        };
        matches!(self.cursor, Cursor::At(_))
    }

    /// The entry the cursor is positioned on.
    pub fn current(&self) -> Option<&TransferEntry> {
        match self.cursor {
            Cursor::At(i) => self.entries.get(i),
            _ => None,
        }
    }

    /// Status string of the current entry: "SUCCEED" or "FAILED".
    pub fn status(&self) -> &str {
        self.current().map(|e| e.status.as_str()).unwrap_or("")
    }

    /// Failure detail of the current entry; empty on success.
    pub fn detail(&self) -> &str {
        self.current().map(|e| e.detail.as_str()).unwrap_or("")
    }

    pub fn src(&self) -> &str {
        self.current().map(|e| e.src.as_str()).unwrap_or("")
    }

    pub fn target(&self) -> &str {
        self.current().map(|e| e.target.as_str()).unwrap_or("")
    }

    pub fn size(&self) -> u64 {
        self.current().map(|e| e.size).unwrap_or(0)
    }

    /// Total number of entries in the stream.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
