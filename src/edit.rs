use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental edit primitive: byte-span replacement with verification.
///
/// Every injection the engine performs compiles down to a list of these.
/// Offsets are always relative to the *original* text; [`apply_edits`]
/// applies them bottom-to-top so earlier splices never shift later ones.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until passed to apply_edits()"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// New text to insert at [byte_start, byte_end)
    pub new_text: String,
    /// Verification of what we expect to find before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("before-text verification failed at byte {byte_start}: found {found:?}")]
    BeforeTextMismatch {
        byte_start: usize,
        byte_end: usize,
        found: String,
    },

    #[error("invalid byte range: [{byte_start}, {byte_end}) in text of length {text_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        text_len: usize,
    },

    #[error("overlapping edits at [{first_start}, {first_end}) and [{second_start}, {second_end})")]
    Overlap {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },

    #[error("edit boundary at byte {offset} splits a UTF-8 character")]
    NotCharBoundary { offset: usize },
}

impl Edit {
    /// Create a replacement edit, verifying `expected_before` at apply time.
    pub fn new(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl AsRef<str>,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before.as_ref()),
        }
    }

    /// Pure insertion at `offset`; deletes nothing.
    pub fn insert(offset: usize, new_text: impl Into<String>) -> Self {
        Self::new(offset, offset, new_text, "")
    }

    /// Offset the edit starts at.
    pub fn offset(&self) -> usize {
        self.byte_start
    }

    /// Number of original bytes this edit removes.
    pub fn deletion_len(&self) -> usize {
        self.byte_end - self.byte_start
    }

    /// Validate the edit against the text it will be applied to.
    fn validate(&self, text: &str) -> Result<(), EditError> {
        if self.byte_start > self.byte_end || self.byte_end > text.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                text_len: text.len(),
            });
        }

        for offset in [self.byte_start, self.byte_end] {
            if !text.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary { offset });
            }
        }

        let current = &text[self.byte_start..self.byte_end];
        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                found: current.to_string(),
            });
        }

        Ok(())
    }
}

/// Apply a set of edits to `original`, returning the spliced text.
///
/// All edits are validated against the original before any splice happens,
/// so either every edit lands or the caller gets an error and no text.
/// Regions between edits are copied byte-for-byte; with no edits the input
/// comes back unchanged.
pub fn apply_edits(original: &str, edits: &[Edit]) -> Result<String, EditError> {
    if edits.is_empty() {
        return Ok(original.to_string());
    }

    // Descending by byte_start. Ties are applied last-first so that several
    // insertions at one offset end up in source order.
    let mut indexed: Vec<(usize, &Edit)> = edits.iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| b.byte_start.cmp(&a.byte_start).then(ib.cmp(ia)));
    let ordered: Vec<&Edit> = indexed.into_iter().map(|(_, edit)| edit).collect();

    for edit in &ordered {
        edit.validate(original)?;
    }

    // Sorted descending: the later edit comes first in each window.
    for window in ordered.windows(2) {
        let (later, earlier) = (window[0], window[1]);
        if earlier.byte_end > later.byte_start
            || (earlier.byte_start == later.byte_start && earlier.byte_end > earlier.byte_start)
        {
            return Err(EditError::Overlap {
                first_start: earlier.byte_start,
                first_end: earlier.byte_end,
                second_start: later.byte_start,
                second_end: later.byte_end,
            });
        }
    }

    let mut output = original.to_string();
    for edit in ordered {
        output.replace_range(edit.byte_start..edit.byte_end, &edit.new_text);
    }

    Ok(output)
}
