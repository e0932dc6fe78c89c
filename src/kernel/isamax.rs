use crate::{
    kernel::{Kernel, KernelError},
    types::Value,
};

/// BLAS `isamax`: the 1-based index of the first element with the largest
/// absolute value.
///
/// Every argument is parsed as an `f32` element of the input vector.
#[derive(Debug, Default, Clone, Copy)]
pub struct Isamax;

impl Isamax {
    /// Runs `isamax` over `x`, or `None` when it has no comparable element.
    ///
    /// `NaN` elements are skipped.
    #[must_use]
    pub fn index_of_max_magnitude(x: &[f32]) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (idx, magnitude) in x.iter().map(|v| v.abs()).enumerate() {
            if magnitude.is_nan() {
                continue;
            }
            match best {
                Some((_, max)) if magnitude <= max => {}
                _ => best = Some((idx, magnitude)),
            }
        }
        best.map(|(idx, _)| idx + 1)
    }
}

impl Kernel for Isamax {
    fn name(&self) -> &str {
        "Isamax"
    }

    fn call(&self, args: &[String]) -> Result<Value, KernelError> {
        let x = args
            .iter()
            .map(|arg| match arg.trim().parse::<f32>() {
                Ok(value) if !value.is_nan() => Ok(value),
                _ => Err(KernelError::NotANumber { arg: arg.clone() }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let idx = Self::index_of_max_magnitude(&x).ok_or(KernelError::EmptyVector { kernel: "Isamax" })?;
        Ok(Value::Integer(i64::try_from(idx).unwrap_or(i64::MAX)))
    }
}
