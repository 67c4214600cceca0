//! Fractional-indexing rank generation.
//!
//! A rank is an opaque string whose byte order encodes display position.
//! New ranks are generated strictly between two neighbours, so inserting or
//! moving a record never requires renumbering its siblings, and the resulting
//! order survives a round trip through any store that keeps the string.
//!
//! Comparison is always plain byte order (`str::cmp`), never locale-aware.

/// Lower boundary of the rank universe. Never assigned to a record.
pub const MIN_RANK: &str = "000000";
/// Upper boundary of the rank universe. Never assigned to a record.
pub const MAX_RANK: &str = "zzzzzz";

pub(crate) const MIN_CHAR: u8 = b'0';
pub(crate) const MAX_CHAR: u8 = b'z';

/// Generates a rank that sorts strictly between `lower` and `upper`.
///
/// `None` stands for the start (for `lower`) or the end (for `upper`) of the
/// universe and is replaced by [`MIN_RANK`] / [`MAX_RANK`].
///
/// # Panics
///
/// Panics if the bounds are not strictly ordered, or if no string over the
/// rank alphabet fits between them (for example `"a"` and `"a0"`). Both are
/// caller bugs: ranks produced by this function never end in `'0'`.
pub fn generate_rank(lower: Option<&str>, upper: Option<&str>) -> String {
    let lower = lower.unwrap_or(MIN_RANK);
    let upper = upper.unwrap_or(MAX_RANK);

    assert!(
        lower < upper,
        "rank bounds out of order: {:?} is not below {:?}",
        lower,
        upper
    );

    let rank = midpoint(lower.as_bytes(), upper.as_bytes());
    debug_assert!(lower < rank.as_str() && rank.as_str() < upper);
    rank
}

/// Walks both bounds until the first position with room for a character
/// strictly between them.
///
/// Once a lower character has been copied because the midpoint collapsed onto
/// it, the candidate already sorts below `upper`, so deeper positions are
/// bounded only by the alphabet maximum.
fn midpoint(lower: &[u8], upper: &[u8]) -> String {
    let mut out = Vec::with_capacity(lower.len().max(upper.len()) + 1);
    let mut upper_open = false;
    let mut i = 0;

    loop {
        let lo = lower.get(i).copied().unwrap_or(MIN_CHAR);
        let hi = if upper_open {
            MAX_CHAR
        } else {
            match upper.get(i) {
                Some(&c) => c,
                None => panic!(
                    "no rank fits between {:?} and {:?}",
                    String::from_utf8_lossy(lower),
                    String::from_utf8_lossy(upper)
                ),
            }
        };

        assert!(
            lo <= hi,
            "rank character {:?} outside the bound {:?}",
            lo as char,
            hi as char
        );

        if lo == hi {
            out.push(lo);
            i += 1;
            continue;
        }

        let mid = ((lo as u16 + hi as u16) / 2) as u8;
        if mid == lo {
            out.push(lo);
            upper_open = true;
            i += 1;
            continue;
        }

        out.push(mid);
        return out.into_iter().map(char::from).collect();
    }
}
