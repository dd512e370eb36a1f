use crate::{counts::CountSource, error::CountsError, Result};

type Combinator = Box<dyn Fn(&[i64]) -> i64 + Send>;

#[derive(Debug, Clone, Copy)]
struct Transition {
    position: u64,
    length: u64,
    count: i64,
}

/// Merges several count sources into one.
///
/// A transition occurs at every position where any input changes run. The
/// combined count is the sum of the inputs' counts unless another combinator is
/// supplied. Inputs that have ended contribute a zero count.
pub struct UnionReader<S: CountSource> {
    readers: Vec<S>,
    combinator: Combinator,
    exhausted: Vec<bool>,

    /// Per-reader counts at the current position
    values: Vec<i64>,

    /// Per-reader counts at the lookahead position
    next_values: Vec<i64>,

    /// Start of the next combined run
    boundary: u64,
    lookahead: Option<Transition>,
    finished: bool,

    current: Option<Transition>,
}
impl<S: CountSource> UnionReader<S> {
    /// Sums the counts of `readers`
    pub fn new(readers: Vec<S>) -> Self {
        Self::with_combinator(readers, |counts| counts.iter().sum())
    }

    /// Combines the counts of `readers` with `combinator`
    pub fn with_combinator<F>(readers: Vec<S>, combinator: F) -> Self
    where
        F: Fn(&[i64]) -> i64 + Send + 'static,
    {
        let num_readers = readers.len();
        Self {
            readers,
            combinator: Box::new(combinator),
            exhausted: vec![false; num_readers],
            values: vec![0; num_readers],
            next_values: vec![0; num_readers],
            boundary: 0,
            lookahead: None,
            finished: false,
            current: None,
        }
    }

    #[must_use]
    pub fn num_readers(&self) -> usize {
        self.readers.len()
    }

    /// Count of one input at the current position (0 past its end)
    #[must_use]
    pub fn count_of(&self, reader_index: usize) -> i64 {
        self.values.get(reader_index).copied().unwrap_or(0)
    }

    /// Releases the inputs
    pub fn into_inner(self) -> Vec<S> {
        self.readers
    }

    fn compute_next(&mut self) -> Result<Option<Transition>> {
        if self.finished {
            return Ok(None);
        }
        let p = self.boundary;
        let mut next_boundary: Option<u64> = None;
        for (idx, reader) in self.readers.iter_mut().enumerate() {
            if !self.exhausted[idx] {
                while reader.position() + reader.length() <= p {
                    if reader.has_next_transition()? {
                        reader.next_transition()?;
                    } else {
                        self.exhausted[idx] = true;
                        break;
                    }
                }
            }
            if self.exhausted[idx] {
                self.next_values[idx] = 0;
                continue;
            }
            let end = reader.position() + reader.length();
            self.next_values[idx] = if reader.position() <= p && p < end {
                reader.count()
            } else {
                0
            };
            next_boundary = Some(next_boundary.map_or(end, |nb| nb.min(end)));
        }

        let count = (self.combinator)(&self.next_values);
        if let Some(nb) = next_boundary {
            self.boundary = nb;
            return Ok(Some(Transition {
                position: p,
                length: nb - p,
                count,
            }));
        }

        // every input has ended; return to the combined value of all zeros
        self.finished = true;
        match self.current {
            Some(last) if last.count != count => Ok(Some(Transition {
                position: p,
                length: 0,
                count,
            })),
            _ => Ok(None),
        }
    }
}

impl<S: CountSource> CountSource for UnionReader<S> {
    fn has_next_transition(&mut self) -> Result<bool> {
        if self.lookahead.is_none() {
            self.lookahead = self.compute_next()?;
        }
        Ok(self.lookahead.is_some())
    }

    fn next_transition(&mut self) -> Result<()> {
        if !self.has_next_transition()? {
            return Err(CountsError::NoMoreTransitions.into());
        }
        self.current = self.lookahead.take();
        std::mem::swap(&mut self.values, &mut self.next_values);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.current.map_or(0, |t| t.position)
    }

    fn length(&self) -> u64 {
        self.current.map_or(0, |t| t.length)
    }

    fn count(&self) -> i64 {
        self.current.map_or(0, |t| t.count)
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::counts::{
        testing::{encode_runs, transitions},
        CountsReader, RunsReader,
    };

    fn runs(text: &str) -> RunsReader {
        text.parse().unwrap()
    }

    #[test]
    fn test_union_of_two() {
        let union = UnionReader::new(vec![runs("(1,0)(3,3)(2,0)"), runs("(6,1)")]);
        assert_eq!(
            transitions(union),
            vec![(0, 1, 1), (1, 3, 4), (4, 2, 1), (6, 0, 0)]
        );
    }

    #[test]
    fn test_count_of() {
        let mut union = UnionReader::new(vec![runs("(1,0)(3,3)(2,0)"), runs("(6,1)")]);
        union.next_transition().unwrap();
        union.next_transition().unwrap();
        assert_eq!(union.position(), 1);
        assert_eq!(union.count_of(0), 3);
        assert_eq!(union.count_of(1), 1);
        assert_eq!(union.count_of(2), 0);
        union.next_transition().unwrap();
        union.next_transition().unwrap();
        assert_eq!(union.count(), 0);
        assert_eq!(union.count_of(0), 0);
        assert_eq!(union.count_of(1), 0);
        assert!(!union.has_next_transition().unwrap());
        assert!(union.next_transition().is_err());
    }

    #[test]
    fn test_inputs_of_different_lengths() {
        let union = UnionReader::new(vec![runs("(2,1)(2,2)"), runs("(1,0)(9,5)"), runs("")]);
        assert_eq!(
            transitions(union),
            vec![(0, 1, 1), (1, 1, 6), (2, 2, 7), (4, 6, 5), (10, 0, 0)]
        );
    }

    #[test]
    fn test_no_closing_transition_when_already_zero() {
        let union = UnionReader::new(vec![runs("(2,1)(3,0)"), runs("(4,0)")]);
        assert_eq!(transitions(union), vec![(0, 2, 1), (2, 2, 0), (4, 1, 0)]);
    }

    #[test]
    fn test_empty_union() {
        let union: UnionReader<RunsReader> = UnionReader::new(Vec::new());
        assert!(transitions(union).is_empty());
        let union = UnionReader::new(vec![runs(""), runs("")]);
        assert!(transitions(union).is_empty());
    }

    #[test]
    fn test_custom_combinator() {
        let union = UnionReader::with_combinator(vec![runs("(2,1)(2,3)"), runs("(3,2)")], |counts| {
            counts.iter().copied().max().unwrap_or(0) + 1
        });
        // all-zero inputs combine to 1, so the closing transition returns to it
        assert_eq!(
            transitions(union),
            vec![(0, 2, 3), (2, 1, 4), (3, 1, 4), (4, 0, 1)]
        );
    }

    #[test]
    fn test_union_of_stream_readers() {
        let a = encode_runs(0, &[(5, 0), (1, 1), (20, 0), (30, 20), (1000, 0)]);
        let b = encode_runs(0, &[(30, 2)]);
        let readers = vec![CountsReader::new(&a).unwrap(), CountsReader::new(&b).unwrap()];
        let mut union = UnionReader::new(readers);
        assert!(union.skip_to(35).unwrap());
        assert_eq!((union.position(), union.count()), (56, 0));
        assert_eq!(union.length(), 1000);
        assert_eq!(union.into_inner().len(), 2);
    }
}
