use crate::{counts::CountSource, Result};

/// A maximal stretch of positions whose count exceeds a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Peak {
    pub start: u64,
    pub length: u64,

    /// Sum of the counts over every position of the peak, saturating at the
    /// `i64` bounds
    pub count: i64,
    pub max: i64,
}
impl Peak {
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start + self.length
    }
}

/// Iterates over the peaks of a count source
pub struct PeakFinder<S: CountSource> {
    source: S,
    threshold: i64,
    done: bool,
}
impl<S: CountSource> PeakFinder<S> {
    pub fn new(source: S, threshold: i64) -> Self {
        Self {
            source,
            threshold,
            done: false,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    fn next_peak(&mut self) -> Result<Option<Peak>> {
        let mut peak: Option<Peak> = None;
        while self.source.has_next_transition()? {
            self.source.next_transition()?;
            let count = self.source.count();
            if count <= self.threshold {
                if peak.is_some() {
                    break;
                }
                continue;
            }
            let length = self.source.length();
            let current = peak.get_or_insert(Peak {
                start: self.source.position(),
                ..Peak::default()
            });
            current.length = current.length.saturating_add(length);
            let weight = i64::try_from(length).unwrap_or(i64::MAX);
            current.count = current.count.saturating_add(count.saturating_mul(weight));
            current.max = current.max.max(count);
        }
        Ok(peak)
    }
}

impl<S: CountSource> Iterator for PeakFinder<S> {
    type Item = Result<Peak>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_peak() {
            Ok(Some(peak)) => Some(Ok(peak)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::{
        aggregate::UnionReader,
        counts::{testing::encode_runs, CountsReader, RunsReader},
    };

    fn peaks<S: CountSource>(finder: PeakFinder<S>) -> Vec<Peak> {
        finder.collect::<Result<Vec<_>>>().unwrap()
    }

    fn peak(start: u64, length: u64, count: i64, max: i64) -> Peak {
        Peak {
            start,
            length,
            count,
            max,
        }
    }

    #[test]
    fn test_peaks_above_zero() {
        let source: RunsReader = "(10,0)(2,2)(1,3)(4,1)(10,0)(4,6)".parse().unwrap();
        assert_eq!(
            peaks(PeakFinder::new(source, 0)),
            vec![peak(10, 7, 11, 3), peak(27, 4, 24, 6)]
        );
    }

    #[test]
    fn test_peaks_above_threshold() {
        let source: RunsReader = "(10,0)(2,2)(1,3)(4,1)(10,0)(4,6)".parse().unwrap();
        let finder = PeakFinder::new(source, 2);
        assert_eq!(finder.threshold(), 2);
        assert_eq!(peaks(finder), vec![peak(12, 1, 3, 3), peak(27, 4, 24, 6)]);
    }

    #[test]
    fn test_peak_at_end_of_stream() {
        let bytes = encode_runs(0, &[(3, 0), (2, 5)]);
        let finder = PeakFinder::new(CountsReader::new(&bytes).unwrap(), 0);
        let found = peaks(finder);
        assert_eq!(found, vec![peak(3, 2, 10, 5)]);
        assert_eq!(found[0].end(), 5);
    }

    #[test]
    fn test_peak_sum_saturates() {
        let source: RunsReader = format!("(1,0)(4,{})(2,{})(1,0)", i64::MAX / 2, i64::MAX)
            .parse()
            .unwrap();
        assert_eq!(
            peaks(PeakFinder::new(source, 0)),
            vec![peak(1, 6, i64::MAX, i64::MAX)]
        );
    }

    #[test]
    fn test_no_peaks() {
        let source: RunsReader = "(10,1)(3,0)".parse().unwrap();
        assert!(peaks(PeakFinder::new(source, 5)).is_empty());
        let empty: RunsReader = "".parse().unwrap();
        let mut finder = PeakFinder::new(empty, 0);
        assert!(finder.next().is_none());
        assert!(finder.next().is_none());
    }

    #[test]
    fn test_peaks_over_union() {
        let union = UnionReader::new(vec![
            "(5,0)(5,2)".parse::<RunsReader>().unwrap(),
            "(7,0)(6,1)".parse::<RunsReader>().unwrap(),
        ]);
        // the union's closing transition ends the last peak
        assert_eq!(peaks(PeakFinder::new(union, 0)), vec![peak(5, 8, 16, 3)]);
    }
}
