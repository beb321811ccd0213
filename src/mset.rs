//! MSet: compact message-number range encoding (spec §3, §4.4).
//!
//! Encoded as a comma-separated list of `start[:end]` ranges where `end`
//! may be the sentinel `*` meaning "through highest present". Used for
//! batch operations and seen-pointer compression.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum RangeEnd {
    Number(i64),
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Range {
    start: i64,
    end: RangeEnd,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MSet {
    ranges: Vec<Range>,
}

impl MSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the minimal (sorted, merged) MSet containing exactly the
    /// given numbers. `open_above` marks the set as also containing every
    /// number greater than its maximum member (an "open range").
    pub fn from_numbers(mut numbers: Vec<i64>, open_above: bool) -> Self {
        numbers.sort_unstable();
        numbers.dedup();
        let mut ranges: Vec<Range> = Vec::new();
        for n in numbers {
            if let Some(last) = ranges.last_mut()
                && let Range { end: RangeEnd::Number(e), .. } = last
                && *e + 1 == n
            {
                *e = n;
                continue;
            }
            ranges.push(Range {
                start: n,
                end: RangeEnd::Number(n),
            });
        }
        if open_above
            && let Some(last) = ranges.last_mut()
        {
            last.end = RangeEnd::Open;
        }
        MSet { ranges }
    }

    pub fn parse(s: &str) -> Self {
        let mut ranges = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some((start_s, end_s)) = part.split_once(':') {
                let Ok(start) = start_s.trim().parse::<i64>() else {
                    continue;
                };
                let end = if end_s.trim() == "*" {
                    RangeEnd::Open
                } else if let Ok(e) = end_s.trim().parse::<i64>() {
                    RangeEnd::Number(e)
                } else {
                    continue;
                };
                ranges.push(Range { start, end });
            } else if let Ok(n) = part.parse::<i64>() {
                ranges.push(Range {
                    start: n,
                    end: RangeEnd::Number(n),
                });
            }
        }
        MSet { ranges }
    }

    pub fn is_in(&self, n: i64) -> bool {
        self.ranges.iter().any(|r| match r.end {
            RangeEnd::Number(e) => n >= r.start && n <= e,
            RangeEnd::Open => n >= r.start,
        })
    }

    /// Materialize the set as a sorted, deduplicated vector of numbers,
    /// bounded by `highest` for any open-ended range.
    pub fn to_numbers(&self, highest: i64) -> Vec<i64> {
        let mut out = Vec::new();
        for r in &self.ranges {
            let end = match r.end {
                RangeEnd::Number(e) => e,
                RangeEnd::Open => highest,
            };
            if r.start <= end {
                out.extend(r.start..=end);
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl fmt::Display for MSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .ranges
            .iter()
            .map(|r| match r.end {
                RangeEnd::Number(e) if e == r.start => format!("{}", r.start),
                RangeEnd::Number(e) => format!("{}:{}", r.start, e),
                RangeEnd::Open => format!("{}:*", r.start),
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_contiguous_ranges() {
        let set = MSet::from_numbers(vec![1, 2, 3, 5, 7, 8, 9], false);
        let encoded = set.to_string();
        let parsed = MSet::parse(&encoded);
        assert_eq!(parsed, set);
    }

    #[test]
    fn membership_matches_source_set() {
        let numbers = vec![2, 3, 4, 10];
        let set = MSet::from_numbers(numbers.clone(), false);
        for n in 0..15 {
            assert_eq!(set.is_in(n), numbers.contains(&n), "n={n}");
        }
    }

    #[test]
    fn open_range_covers_everything_above_min() {
        let set = MSet::from_numbers(vec![5], true);
        assert!(set.is_in(5));
        assert!(set.is_in(1_000_000));
        assert!(!set.is_in(4));
        assert_eq!(set.to_string(), "5:*");
    }

    #[test]
    fn parse_handles_star_sentinel() {
        let set = MSet::parse("1:5,10:*");
        assert!(set.is_in(3));
        assert!(set.is_in(999));
        assert!(!set.is_in(7));
    }
}
