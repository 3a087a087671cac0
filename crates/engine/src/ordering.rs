//! Fractional order keys for stages.
//!
//! Keys are non-empty strings over `a..=z` compared lexicographically. A key
//! strictly between any two neighbours can always be generated, so inserting
//! or moving a stage never renumbers the others.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderKeyError {
    #[error("invalid order key '{0}': expected lowercase ASCII letters")]
    Invalid(String),

    #[error("order key '{before}' does not sort before '{after}'")]
    NotOrdered { before: String, after: String },

    #[error("no key fits between '{before}' and '{after}'")]
    NoRoom { before: String, after: String },
}

const MIN: u8 = b'a';
const RADIX: u8 = 26;

/// A key strictly between `before` and `after`. `None` means "no neighbour
/// on that side".
pub fn order_between(before: Option<&str>, after: Option<&str>) -> Result<String, OrderKeyError> {
    for key in before.iter().chain(after.iter()) {
        if key.is_empty() || !key.bytes().all(|c| c.is_ascii_lowercase()) {
            return Err(OrderKeyError::Invalid((*key).to_owned()));
        }
    }

    let lo = before.unwrap_or("");
    if let Some(hi) = after {
        if lo >= hi {
            return Err(OrderKeyError::NotOrdered { before: lo.to_owned(), after: hi.to_owned() });
        }
    }

    midpoint(lo.as_bytes(), after.map(str::as_bytes)).ok_or_else(|| OrderKeyError::NoRoom {
        before: lo.to_owned(),
        after: after.unwrap_or("").to_owned(),
    })
}

fn digit(c: u8) -> u8 {
    c - MIN
}

fn letter(d: u8) -> char {
    char::from(MIN + d)
}

/// `lo < hi` is assumed; a missing `lo` digit counts as `a`.
fn midpoint(lo: &[u8], hi: Option<&[u8]>) -> Option<String> {
    if let Some(hi) = hi {
        let shared = hi
            .iter()
            .enumerate()
            .take_while(|&(i, &c)| lo.get(i).copied().unwrap_or(MIN) == c)
            .count();
        if shared > 0 {
            let rest = midpoint(lo.get(shared..).unwrap_or(&[]), Some(&hi[shared..]))?;
            return Some(format!("{}{rest}", String::from_utf8_lossy(&hi[..shared])));
        }
        if hi.is_empty() {
            return None;
        }
    }

    let d_lo = lo.first().map(|&c| digit(c)).unwrap_or(0);
    let d_hi = hi.map(|h| digit(h[0])).unwrap_or(RADIX);

    if d_hi - d_lo > 1 {
        return Some(letter(d_lo + (d_hi - d_lo) / 2).to_string());
    }
    if let Some(hi) = hi.filter(|h| h.len() > 1) {
        return Some(letter(digit(hi[0])).to_string());
    }
    let rest = midpoint(lo.get(1..).unwrap_or(&[]), None)?;
    Some(format!("{}{rest}", letter(d_lo)))
}
