//! Occurrence-count merge: folds a repeated alert into the task's name and
//! notes without losing the original description.
//!
//! The notes carry a single machine-parseable block at their head:
//!
//! ```text
//! Alert occurred 3x.
//! Last at 01/03/2024 14:07:31.
//! -----
//! <original description, unmodified>
//! ```
//!
//! Timestamps are formatted day/month/year, 24-hour clock, in the
//! provider's configured operating timezone. The format is fixed for
//! compatibility with blocks already stored in task notes.

use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;

/// Separates the occurrence block from the original description.
pub const BLOCK_DELIMITER: &str = "-----";

const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Leading `[<N>x]` occurrence tag, plus any whitespace that follows it.
static NAME_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\[\d+x\])?\s*").expect("valid regex"));

/// Rewrite the leading occurrence tag of a task name. Inserts one when
/// absent; never double-tags.
pub fn tag_name(name: &str, count: u32) -> String {
    NAME_TAG.replace(name, format!("[{count}x] ")).into_owned()
}

fn occurrence_block(count: u32, last_seen: DateTime<FixedOffset>) -> String {
    format!(
        "Alert occurred {count}x.\nLast at {}.\n{BLOCK_DELIMITER}\n",
        last_seen.format(TIMESTAMP_FORMAT)
    )
}

/// Fold a new occurrence into the notes. An existing block (anything up to
/// and including the first delimiter) is replaced wholesale; everything
/// after the delimiter is preserved unchanged. Without a block, one is
/// prepended to the notes as they are.
pub fn merge_notes(notes: &str, count: u32, last_seen: DateTime<FixedOffset>) -> String {
    let block = occurrence_block(count, last_seen);
    match notes.find(BLOCK_DELIMITER) {
        Some(at) => {
            let rest = &notes[at + BLOCK_DELIMITER.len()..];
            let rest = rest.strip_prefix('\n').unwrap_or(rest);
            format!("{block}{rest}")
        }
        None => format!("{block}{notes}"),
    }
}
