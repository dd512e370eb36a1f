use std::str::FromStr;

use crate::{error::CountsError, Result};

use super::CountSource;

/// In-memory transitions, parsed from `"(length,count)(length,count)..."`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunsReader {
    runs: Vec<(u64, i64)>,
    next: usize,
    position: u64,
    length: u64,
    count: i64,
}
impl RunsReader {
    /// Creates a reader over `(length, count)` runs starting at position 0
    pub fn new(runs: Vec<(u64, i64)>) -> Result<Self> {
        if let Some(idx) = runs.iter().position(|&(length, _)| length == 0) {
            return Err(CountsError::MalformedRuns(format!("run {idx} has zero length")).into());
        }
        Ok(Self {
            runs,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn runs(&self) -> &[(u64, i64)] {
        &self.runs
    }
}

impl FromStr for RunsReader {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = |piece: &str| CountsError::MalformedRuns(piece.to_string());
        let mut pieces: Vec<&str> = s.split(')').collect();
        if let Some(tail) = pieces.pop().map(str::trim) {
            if !tail.is_empty() {
                return Err(malformed(tail).into());
            }
        }

        let mut runs = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let piece = piece.trim();
            let body = piece.strip_prefix('(').ok_or_else(|| malformed(piece))?;
            let (length, count) = body.split_once(',').ok_or_else(|| malformed(piece))?;
            let length = length.trim().parse().map_err(|_| malformed(piece))?;
            let count = count.trim().parse().map_err(|_| malformed(piece))?;
            runs.push((length, count));
        }
        Self::new(runs)
    }
}

impl CountSource for RunsReader {
    fn has_next_transition(&mut self) -> Result<bool> {
        Ok(self.next < self.runs.len())
    }

    fn next_transition(&mut self) -> Result<()> {
        let &(length, count) = self
            .runs
            .get(self.next)
            .ok_or(CountsError::NoMoreTransitions)?;
        if self.next > 0 {
            self.position += self.length;
        }
        self.next += 1;
        self.length = length;
        self.count = count;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn count(&self) -> i64 {
        self.count
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::counts::testing::transitions;

    #[test]
    fn test_parse_runs() {
        let reader: RunsReader = " (1,0) (3, 3)(2,-2) ".parse().unwrap();
        assert_eq!(reader.runs(), &[(1, 0), (3, 3), (2, -2)]);
        assert_eq!(transitions(reader), vec![(0, 1, 0), (1, 3, 3), (4, 2, -2)]);
    }

    #[test]
    fn test_parse_empty() {
        let mut reader: RunsReader = "".parse().unwrap();
        assert!(!reader.has_next_transition().unwrap());
        assert!(reader.next_transition().is_err());
    }

    #[test]
    fn test_parse_errors() {
        for text in ["(1,0", "1,0)", "(a,0)", "(1;0)", "(0,4)", "(-1,2)"] {
            let err = text.parse::<RunsReader>().unwrap_err();
            assert!(
                err.to_string().contains("Malformed runs description"),
                "{text}: {err}"
            );
        }
    }

    #[test]
    fn test_skip_to() {
        let mut reader: RunsReader = "(5,0)(1,1)(20,0)(30,20)(1000,0)".parse().unwrap();
        assert!(reader.skip_to(35).unwrap());
        assert_eq!((reader.position(), reader.count()), (56, 0));
        assert!(!reader.skip_to(57).unwrap());
    }
}
