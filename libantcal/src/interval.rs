use std::fmt::Display;
use std::str::FromStr;

use super::error::IntervalError;

/// A closed interval [start, stop] over an ordered key.
///
/// Both ends are contained, so a degenerate interval [a, a] covers exactly a.
/// An interval with start > stop is insane and cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval<T> {
    start: T,
    stop: T,
}

impl<T: PartialOrd + Copy + Display> Interval<T> {
    pub fn new(start: T, stop: T) -> Result<Self, IntervalError> {
        if start > stop {
            return Err(IntervalError::Insane(start.to_string(), stop.to_string()));
        }
        Ok(Self { start, stop })
    }

    pub fn start(&self) -> T {
        self.start
    }

    pub fn stop(&self) -> T {
        self.stop
    }

    pub fn contains(&self, point: &T) -> bool {
        self.start <= *point && *point <= self.stop
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.stop && other.start <= self.stop
    }

    /// True if other lies completely inside self
    pub fn encloses(&self, other: &Self) -> bool {
        self.start <= other.start && other.stop <= self.stop
    }
}

impl<T: Display> Display for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}]", self.start, self.stop)
    }
}

/// Parse channel ranges like "400-412" or a single channel "7"
impl FromStr for Interval<u32> {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('-') {
            Some((start, stop)) => Self::new(start.trim().parse()?, stop.trim().parse()?),
            None => {
                let value: u32 = s.parse()?;
                Self::new(value, value)
            }
        }
    }
}

/// Check if any of the intervals contains the value. An empty list contains everything.
pub fn any_contains<T: PartialOrd + Copy + Display>(intervals: &[Interval<T>], value: &T) -> bool {
    intervals.is_empty() || intervals.iter().any(|i| i.contains(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insane() {
        for _ in 0..10 {
            assert!(Interval::new(5u32, 4).is_err());
        }
        let degenerate = Interval::new(4u32, 4).unwrap();
        assert!(degenerate.contains(&4));
        assert!(!degenerate.contains(&5));
    }

    #[test]
    fn test_overlaps() {
        let a = Interval::new(0u32, 16).unwrap();
        let b = Interval::new(13u32, 20).unwrap();
        let c = Interval::new(17u32, 20).unwrap();
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.encloses(&Interval::new(2, 8).unwrap()));
        assert!(!a.encloses(&b));
    }

    #[test]
    fn test_parse() {
        assert_eq!("400-412".parse::<Interval<u32>>().unwrap(), Interval::new(400, 412).unwrap());
        assert_eq!("7".parse::<Interval<u32>>().unwrap(), Interval::new(7, 7).unwrap());
        assert!("412-400".parse::<Interval<u32>>().is_err());
        assert!("a-b".parse::<Interval<u32>>().is_err());
    }
}
