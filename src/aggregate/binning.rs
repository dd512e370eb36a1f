use crate::{counts::CountSource, error::CountsError, Result};

/// Summary of a stretch of runs
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bin {
    pub position: u64,
    pub length: u64,

    /// Mean count over the sites that contribute to the bin
    pub average: f64,
    pub max: i64,
}

#[derive(Debug, Clone, Copy)]
struct Run {
    position: u64,
    length: u64,
    count: i64,
}
impl Run {
    fn current<S: CountSource>(source: &S) -> Self {
        Self {
            position: source.position(),
            length: source.length(),
            count: source.count(),
        }
    }
}

/// Reports bins through the [`CountSource`] interface, with the truncated
/// average as the count.
macro_rules! impl_bin_source {
    ($name:ident) => {
        impl<S: CountSource> $name<S> {
            /// The bin produced by the last call to `next_transition`
            #[must_use]
            pub fn bin(&self) -> Bin {
                self.current
            }

            #[must_use]
            pub fn average(&self) -> f64 {
                self.current.average
            }

            #[must_use]
            pub fn max(&self) -> i64 {
                self.current.max
            }

            pub fn into_inner(self) -> S {
                self.source
            }
        }

        impl<S: CountSource> CountSource for $name<S> {
            fn has_next_transition(&mut self) -> Result<bool> {
                if self.loaded.is_none() {
                    self.loaded = self.load_bin()?;
                }
                Ok(self.loaded.is_some())
            }

            fn next_transition(&mut self) -> Result<()> {
                if !self.has_next_transition()? {
                    return Err(CountsError::NoMoreTransitions.into());
                }
                if let Some(bin) = self.loaded.take() {
                    self.current = bin;
                }
                Ok(())
            }

            fn position(&self) -> u64 {
                self.current.position
            }

            fn length(&self) -> u64 {
                self.current.length
            }

            fn count(&self) -> i64 {
                self.current.average as i64
            }
        }
    };
}

/// Groups runs into bins holding at least `bin_size` sites with a non-zero count.
///
/// A bin starts at its first non-zero site and extends to the end of its last
/// run. The average is taken over the non-zero sites only. The last bin may
/// hold fewer sites.
pub struct FixedBinning<S: CountSource> {
    source: S,
    bin_size: u64,
    loaded: Option<Bin>,
    current: Bin,
}
impl<S: CountSource> FixedBinning<S> {
    pub fn new(source: S, bin_size: u64) -> Self {
        Self {
            source,
            bin_size,
            loaded: None,
            current: Bin::default(),
        }
    }

    fn load_bin(&mut self) -> Result<Option<Bin>> {
        if !self.source.has_next_transition()? {
            return Ok(None);
        }
        let mut first_nonzero: Option<u64> = None;
        let mut last = None;
        let mut length = 0;
        let mut sites = 0u64;
        let mut sum = 0i128;
        let mut max = 0;
        while sites < self.bin_size && self.source.has_next_transition()? {
            self.source.next_transition()?;
            let run = Run::current(&self.source);
            length = match first_nonzero {
                None => run.length,
                Some(start) => run.length.max(run.position - start + run.length),
            };
            if run.count != 0 {
                sites += run.length;
                first_nonzero.get_or_insert(run.position);
            }
            sum += i128::from(run.count) * i128::from(run.length);
            max = max.max(run.count);
            last = Some(run);
        }

        let average = if sites == 0 {
            0.0
        } else {
            sum as f64 / sites as f64
        };
        // an all-zero bin is reported at its last run
        let position = first_nonzero.or(last.map(|r| r.position)).unwrap_or(0);
        Ok(Some(Bin {
            position,
            length,
            average,
            max,
        }))
    }
}
impl_bin_source!(FixedBinning);

/// Groups runs into alternating bins of zero and non-zero counts.
///
/// Each bin is a maximal stretch of consecutive runs that are either all zero
/// or all non-zero. The average is weighted by run length.
pub struct AdaptiveBinning<S: CountSource> {
    source: S,

    /// First run of the next bin, read while closing the previous one
    cached: Option<Run>,
    loaded: Option<Bin>,
    current: Bin,
}
impl<S: CountSource> AdaptiveBinning<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cached: None,
            loaded: None,
            current: Bin::default(),
        }
    }

    fn next_run(&mut self) -> Result<Option<Run>> {
        if let Some(run) = self.cached.take() {
            return Ok(Some(run));
        }
        if self.source.has_next_transition()? {
            self.source.next_transition()?;
            Ok(Some(Run::current(&self.source)))
        } else {
            Ok(None)
        }
    }

    fn load_bin(&mut self) -> Result<Option<Bin>> {
        let Some(first) = self.next_run()? else {
            return Ok(None);
        };
        let zero_bin = first.count == 0;
        let mut length = first.length;
        let mut sum = i128::from(first.count) * i128::from(first.length);
        let mut max = first.count.max(0);

        while let Some(run) = self.next_run()? {
            if (run.count == 0) != zero_bin {
                self.cached = Some(run);
                break;
            }
            length += run.length;
            sum += i128::from(run.count) * i128::from(run.length);
            max = max.max(run.count);
        }

        let average = if length == 0 {
            0.0
        } else {
            sum as f64 / length as f64
        };
        Ok(Some(Bin {
            position: first.position,
            length,
            average,
            max,
        }))
    }
}
impl_bin_source!(AdaptiveBinning);
