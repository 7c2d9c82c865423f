//! Feature standardization fitted on the training window only.

use serde::{Deserialize, Serialize};

/// Per-column zero-mean / unit-variance scaler.
///
/// Fitted once at training time and persisted with the model; inference must
/// transform new rows with the stored parameters, never refit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    /// Fit column means and population standard deviations.
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let n_cols = rows.first().map(Vec::len).unwrap_or(0);
        let n = rows.len() as f64;
        let mut means = vec![0.0; n_cols];
        let mut stds = vec![1.0; n_cols];
        if rows.is_empty() {
            return Self { means, stds };
        }

        for row in rows {
            for (col, value) in row.iter().enumerate() {
                means[col] += value;
            }
        }
        for mean in &mut means {
            *mean /= n;
        }

        for (col, std) in stds.iter_mut().enumerate() {
            let variance = rows
                .iter()
                .map(|row| (row[col] - means[col]).powi(2))
                .sum::<f64>()
                / n;
            let sigma = variance.sqrt();
            // Constant columns pass through unscaled.
            *std = if sigma > 0.0 { sigma } else { 1.0 };
        }

        Self { means, stds }
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    /// Standardize one row with the stored parameters.
    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(self.stds.iter()))
            .map(|(value, (mean, std))| (value - mean) / std)
            .collect()
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|row| self.transform(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_produces_zero_mean_unit_variance() {
        let rows = vec![
            vec![1.0, 10.0],
            vec![2.0, 20.0],
            vec![3.0, 30.0],
            vec![4.0, 40.0],
        ];
        let scaler = StandardScaler::fit(&rows);
        let scaled = scaler.transform_all(&rows);

        for col in 0..2 {
            let mean: f64 = scaled.iter().map(|r| r[col]).sum::<f64>() / 4.0;
            let var: f64 = scaled.iter().map(|r| r[col].powi(2)).sum::<f64>() / 4.0;
            assert!(mean.abs() < 1e-9);
            assert!((var - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn constant_column_does_not_divide_by_zero() {
        let rows = vec![vec![5.0, 1.0], vec![5.0, 2.0], vec![5.0, 3.0]];
        let scaler = StandardScaler::fit(&rows);
        let scaled = scaler.transform(&[5.0, 2.0]);
        assert_eq!(scaled[0], 0.0);
        assert!(scaled[1].abs() < 1e-9);
    }

    #[test]
    fn transform_uses_stored_parameters_for_new_batches() {
        let train = vec![vec![0.0], vec![10.0]];
        let scaler = StandardScaler::fit(&train);
        // A batch with a very different distribution is still scaled with the
        // training-window parameters (mean 5, std 5).
        assert!((scaler.transform(&[5.0])[0]).abs() < 1e-9);
        assert!((scaler.transform(&[105.0])[0] - 20.0).abs() < 1e-9);
    }
}
