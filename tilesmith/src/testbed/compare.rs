use serde::{Deserialize, Serialize};

use crate::DataType;

/// Acceptance band for one output element: `|kernel - reference| <= absolute + relative * |reference|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub absolute: f64,
    pub relative: f64,
}

impl Tolerance {
    pub const EXACT: Tolerance = Tolerance {
        absolute: 0.0,
        relative: 0.0,
    };

    pub fn new(
        absolute: f64,
        relative: f64,
    ) -> Self {
        Self {
            absolute,
            relative,
        }
    }

    /// Default band for outputs of `data_type`.
    pub fn for_element(data_type: DataType) -> Self {
        match data_type {
            DataType::F64 => Tolerance::new(0.0, 1e-12),
            DataType::F32 => Tolerance::new(1e-6, 1e-5),
            DataType::F16 => Tolerance::new(1e-3, 2.0 * DataType::F16.epsilon()),
            DataType::BF16 => Tolerance::new(1e-2, 2.0 * DataType::BF16.epsilon()),
            _ => Tolerance::EXACT,
        }
    }

    pub fn accepts(
        &self,
        kernel: f64,
        reference: f64,
    ) -> bool {
        if kernel == reference || (kernel.is_nan() && reference.is_nan()) {
            return true;
        }
        (kernel - reference).abs() <= self.absolute + self.relative * reference.abs()
    }
}

/// Relative deviation, floored at unit magnitude so values near zero do not blow up.
pub fn relative_deviation(
    kernel: f64,
    reference: f64,
) -> f64 {
    (kernel - reference).abs() / reference.abs().max(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Flat element index into D.
    pub index: usize,
    pub kernel: f64,
    pub reference: f64,
    pub absolute: f64,
    pub relative: f64,
}

/// Element-wise comparison summary of one output tensor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Deviation {
    pub compared: usize,
    pub mismatches: usize,
    pub max_absolute: f64,
    pub max_relative: f64,
    pub first_mismatch: Option<Mismatch>,
    pub worst_mismatch: Option<Mismatch>,
}

impl Deviation {
    pub fn is_match(&self) -> bool {
        self.mismatches == 0
    }
}

pub fn compare(
    kernel: &[f64],
    reference: &[f64],
    tolerance: Tolerance,
) -> Deviation {
    let mut deviation = Deviation {
        compared: kernel.len().min(reference.len()),
        ..Deviation::default()
    };

    for (index, (&kernel, &reference)) in kernel.iter().zip(reference).enumerate() {
        let absolute = if kernel == reference {
            0.0
        } else {
            (kernel - reference).abs()
        };
        let relative = if absolute == 0.0 {
            0.0
        } else {
            relative_deviation(kernel, reference)
        };
        deviation.max_absolute = deviation.max_absolute.max(absolute);
        deviation.max_relative = deviation.max_relative.max(relative);

        if tolerance.accepts(kernel, reference) {
            continue;
        }
        let mismatch = Mismatch {
            index,
            kernel,
            reference,
            absolute,
            relative,
        };
        deviation.mismatches += 1;
        deviation.first_mismatch.get_or_insert(mismatch);
        // NaN deviations always count as the worst.
        let worse = match &deviation.worst_mismatch {
            Some(worst) => absolute.is_nan() || absolute > worst.absolute,
            None => true,
        };
        if worse {
            deviation.worst_mismatch = Some(mismatch);
        }
    }

    if kernel.len() != reference.len() {
        deviation.mismatches += kernel.len().abs_diff(reference.len());
    }
    deviation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_outputs_compare_exactly() {
        let tolerance = Tolerance::for_element(DataType::I32);
        assert!(tolerance.accepts(12.0, 12.0));
        assert!(!tolerance.accepts(12.0, 13.0));
    }

    #[test]
    fn half_precision_band_scales_with_magnitude() {
        let tolerance = Tolerance::for_element(DataType::F16);
        assert!(is_close!(tolerance.relative, 2.0_f64.powi(-10)));
        assert!(tolerance.accepts(1000.5, 1000.0));
        assert!(!tolerance.accepts(1.5, 1.0));
    }

    #[test]
    fn comparison_tracks_first_and_worst_mismatch() {
        let kernel = [1.0, 2.5, 3.0, 10.0];
        let reference = [1.0, 2.0, 3.0, 4.0];
        let deviation = compare(&kernel, &reference, Tolerance::EXACT);

        assert_eq!(deviation.compared, 4);
        assert_eq!(deviation.mismatches, 2);
        assert_eq!(deviation.first_mismatch.map(|mismatch| mismatch.index), Some(1));
        assert_eq!(deviation.worst_mismatch.map(|mismatch| mismatch.index), Some(3));
        assert_eq!(deviation.max_absolute, 6.0);
        assert_eq!(deviation.max_relative, 1.5);
        assert!(!deviation.is_match());
    }

    #[test]
    fn relative_deviation_is_floored_at_one() {
        assert_eq!(relative_deviation(0.25, 0.0), 0.25);
        assert_eq!(relative_deviation(12.0, 8.0), 0.5);
    }
}
