//! Entry ordering.
//!
//! Every key produces a total order: the primary key is always followed by
//! a case-insensitive name comparison, then exact name bytes, then the path.
//! Descending order reverses the whole comparison, tie-breaks included.

use std::cmp::Ordering;
use std::fmt;
use std::iter::Peekable;
use std::str::{Chars, FromStr};

use serde::{Deserialize, Serialize};

use crate::entry::Entry;

/// Key to order entries by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Case-insensitive name.
    #[default]
    Name,
    /// Creation time; entries without one sort as oldest.
    Date,
    /// Folders first, then files by lowercased extension, then files
    /// without one.
    Type,
}

impl SortKey {
    pub const ALL: [SortKey; 3] = [SortKey::Name, SortKey::Date, SortKey::Type];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Date => "date",
            SortKey::Type => "type",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "date" => Ok(SortKey::Date),
            "type" | "kind" => Ok(SortKey::Type),
            other => Err(format!("unknown sort key: {other} (expected name, date or type)")),
        }
    }
}

/// Compare two names the way a file browser shows them.
///
/// Case-insensitive, with runs of digits compared by numeric value so that
/// `file2` sorts before `file10`. Names equal under that rule fall back to
/// exact byte order, so `A.txt` sorts before `a.txt`.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    natural_cmp(a, b).then_with(|| a.cmp(b))
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();

    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let run_a = take_digits(&mut a);
                let run_b = take_digits(&mut b);
                let ord = compare_digit_runs(&run_a, &run_b);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                a.next();
                b.next();
                let ord = x.to_lowercase().cmp(y.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
        run.push(c);
    }
    run
}

/// Numeric comparison of two digit strings of any length.
fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a_trimmed = a.trim_start_matches('0');
    let b_trimmed = b.trim_start_matches('0');
    a_trimmed
        .len()
        .cmp(&b_trimmed.len())
        .then_with(|| a_trimmed.cmp(b_trimmed))
        .then_with(|| a.len().cmp(&b.len()))
}

/// Ascending comparison of two entries under `key`.
pub fn compare(a: &Entry, b: &Entry, key: SortKey) -> Ordering {
    let primary = match key {
        SortKey::Name => Ordering::Equal,
        // None < Some, so missing timestamps sort as oldest.
        SortKey::Date => a.created_at.cmp(&b.created_at),
        SortKey::Type => type_rank(a).cmp(&type_rank(b)),
    };

    primary
        .then_with(|| compare_names(&a.name, &b.name))
        .then_with(|| a.path.cmp(&b.path))
}

/// Primary key of the type sort: folders, then extensions, then files
/// without one. `x.folder` is an extension, not a folder.
fn type_rank(entry: &Entry) -> (u8, Option<String>) {
    if entry.is_directory {
        return (0, None);
    }
    match entry.extension() {
        Some(ext) => (1, Some(ext)),
        None => (2, None),
    }
}

/// Sort `entries` in place.
pub fn sort_entries(entries: &mut [Entry], key: SortKey, ascending: bool) {
    entries.sort_by(|a, b| {
        let ord = compare(a, b, key);
        if ascending {
            ord
        } else {
            ord.reverse()
        }
    });
}

/// Sorted copy of `entries`.
pub fn sorted(mut entries: Vec<Entry>, key: SortKey, ascending: bool) -> Vec<Entry> {
    sort_entries(&mut entries, key, ascending);
    entries
}
