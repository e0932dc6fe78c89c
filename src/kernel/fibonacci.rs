use crate::{
    kernel::{Kernel, KernelError},
    types::Value,
};

/// N-th term of the Fibonacci sequence `0, 1, 1, 2, 3, 5, 8, 13, ...`.
///
/// Terms are 1-based: term 1 is 0, term 7 is 8 and term 8 is 13. Only terms
/// `MIN_TERM..=MAX_TERM` are served. The first argument is the term; an
/// argument that does not parse as an integer counts as term 0 and is
/// therefore rejected as out of range.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fibonacci;

impl Fibonacci {
    /// Smallest supported term.
    pub const MIN_TERM: u32 = 1;
    /// Largest supported term.
    pub const MAX_TERM: u32 = 50;

    /// Computes term `n`, or `None` outside the supported range.
    #[must_use]
    pub fn nth(n: u32) -> Option<u64> {
        if !(Self::MIN_TERM..=Self::MAX_TERM).contains(&n) {
            return None;
        }
        let (mut previous, mut current) = (0u64, 1u64);
        for _ in 1..n {
            (previous, current) = (current, previous + current);
        }
        Some(previous)
    }
}

impl Kernel for Fibonacci {
    fn name(&self) -> &str {
        "Fibonacci"
    }

    fn call(&self, args: &[String]) -> Result<Value, KernelError> {
        let n = args
            .first()
            .and_then(|arg| arg.trim().parse::<u32>().ok())
            .unwrap_or(0);
        let term = Self::nth(n).ok_or(KernelError::TermOutOfRange {
            min: Self::MIN_TERM,
            max: Self::MAX_TERM,
        })?;
        // MAX_TERM keeps every term far below i64::MAX.
        Ok(Value::Integer(i64::try_from(term).unwrap_or(i64::MAX)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(arg: &str) -> Result<Value, KernelError> {
        Fibonacci.call(&[arg.to_owned()])
    }

    #[test]
    fn first_terms() {
        let terms: Vec<_> = (1..=8).map(|n| Fibonacci::nth(n).unwrap()).collect();
        assert_eq!(terms, [0, 1, 1, 2, 3, 5, 8, 13]);
    }

    #[test]
    fn last_supported_term_does_not_overflow() {
        assert_eq!(Fibonacci::nth(50), Some(7_778_742_049));
    }

    #[test]
    fn out_of_range_terms_are_rejected() {
        let expected = Err(KernelError::TermOutOfRange { min: 1, max: 50 });
        assert_eq!(call("0"), expected);
        assert_eq!(call("51"), expected);
        assert_eq!(call("-3"), expected);
        assert_eq!(call("seven"), expected);
        assert_eq!(Fibonacci.call(&[]), expected);
    }

    #[test]
    fn parses_first_argument_only() {
        assert_eq!(call("7"), Ok(Value::Integer(8)));
        assert_eq!(call(" 8 "), Ok(Value::Integer(13)));
        let args = ["10".to_owned(), "ignored".to_owned()];
        assert_eq!(Fibonacci.call(&args), Ok(Value::Integer(34)));
    }
}
