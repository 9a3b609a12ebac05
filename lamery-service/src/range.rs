//! `Range: bytes=...` parsing against a known entity size.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// Inclusive
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// Not a byte-range header at all (400)
    Malformed,
    /// No satisfiable range, or more than one after merging (416)
    Unsatisfiable,
}

/// Parse a `Range` header for an entity of `size` bytes.
///
/// End offsets past the entity are clamped, suffix ranges larger than the
/// entity select all of it, and overlapping or adjacent ranges are merged.
/// Only a single resulting range is served.
pub fn parse_range(header: &str, size: u64) -> Result<ByteRange, RangeError> {
    let (unit, set) = header.split_once('=').ok_or(RangeError::Malformed)?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(RangeError::Malformed);
    }

    let mut ranges: Vec<ByteRange> = Vec::new();
    let mut seen_any = false;

    for part in set.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        seen_any = true;
        let (start, end) = part.split_once('-').ok_or(RangeError::Malformed)?;
        let (start, end) = (start.trim(), end.trim());

        let range = match (start.is_empty(), end.is_empty()) {
            (true, true) => return Err(RangeError::Malformed),
            (true, false) => {
                let suffix = parse_offset(end)?;
                (size > 0 && suffix > 0).then(|| ByteRange {
                    start: size.saturating_sub(suffix),
                    end: size - 1,
                })
            }
            (false, open_end) => {
                let start = parse_offset(start)?;
                let end = if open_end {
                    size.checked_sub(1)
                } else {
                    let end = parse_offset(end)?;
                    size.checked_sub(1).map(|last| end.min(last))
                };
                end.filter(|end| start <= *end)
                    .map(|end| ByteRange { start, end })
            }
        };
        ranges.extend(range);
    }

    if !seen_any {
        return Err(RangeError::Malformed);
    }

    let merged = combine(ranges);
    match merged.as_slice() {
        [single] => Ok(*single),
        _ => Err(RangeError::Unsatisfiable),
    }
}

fn parse_offset(s: &str) -> Result<u64, RangeError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Malformed);
    }
    s.parse().map_err(|_| RangeError::Malformed)
}

fn combine(mut ranges: Vec<ByteRange>) -> Vec<ByteRange> {
    ranges.sort_by_key(|r| r.start);
    let mut merged: Vec<ByteRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end.saturating_add(1) => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_range() {
        let range = parse_range("bytes=10-19", 100).unwrap();
        assert_eq!(range, ByteRange { start: 10, end: 19 });
        assert_eq!(range.len(), 10);
        assert_eq!(range.content_range(100), "bytes 10-19/100");
    }

    #[test]
    fn open_and_suffix_ranges() {
        assert_eq!(
            parse_range("bytes=90-", 100).unwrap(),
            ByteRange { start: 90, end: 99 }
        );
        assert_eq!(
            parse_range("bytes=-5", 100).unwrap(),
            ByteRange { start: 95, end: 99 }
        );
        assert_eq!(
            parse_range("bytes=-500", 100).unwrap(),
            ByteRange { start: 0, end: 99 }
        );
    }

    #[test]
    fn end_is_clamped() {
        assert_eq!(
            parse_range("bytes=50-1000", 100).unwrap(),
            ByteRange { start: 50, end: 99 }
        );
    }

    #[test]
    fn start_past_end_is_unsatisfiable() {
        assert_eq!(parse_range("bytes=150-200", 100), Err(RangeError::Unsatisfiable));
        assert_eq!(parse_range("bytes=20-10", 100), Err(RangeError::Unsatisfiable));
        assert_eq!(parse_range("bytes=0-", 0), Err(RangeError::Unsatisfiable));
        assert_eq!(parse_range("bytes=-0", 100), Err(RangeError::Unsatisfiable));
    }

    #[test]
    fn malformed_headers() {
        assert_eq!(parse_range("10-19", 100), Err(RangeError::Malformed));
        assert_eq!(parse_range("items=0-1", 100), Err(RangeError::Malformed));
        assert_eq!(parse_range("bytes=a-b", 100), Err(RangeError::Malformed));
        assert_eq!(parse_range("bytes=-", 100), Err(RangeError::Malformed));
        assert_eq!(parse_range("bytes=", 100), Err(RangeError::Malformed));
        assert_eq!(parse_range("bytes=+1-2", 100), Err(RangeError::Malformed));
    }

    #[test]
    fn overlapping_ranges_merge() {
        assert_eq!(
            parse_range("bytes=0-10, 5-20, 21-30", 100).unwrap(),
            ByteRange { start: 0, end: 30 }
        );
    }

    #[test]
    fn disjoint_multi_range_is_rejected() {
        assert_eq!(
            parse_range("bytes=0-10, 50-60", 100),
            Err(RangeError::Unsatisfiable)
        );
    }
}
