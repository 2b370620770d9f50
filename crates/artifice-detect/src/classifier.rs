#![forbid(unsafe_code)]

//! Detector capability and a one-feature logistic regression.
//!
//! # Model
//!
//! ```text
//! P(artifice | x) = sigma(w * x + b),   sigma(z) = 1 / (1 + exp(-z))
//! ```
//!
//! Fitted by Newton's method on the L2-regularized negative log-likelihood
//! with an unpenalized intercept:
//!
//! ```text
//! J(w, b) = w^2 / 2 + C * sum_i [ -y_i ln p_i - (1 - y_i) ln(1 - p_i) ]
//! ```
//!
//! `J` is strictly convex in `w`, so the 2x2 Newton step with backtracking
//! converges from `(0, 0)` in a handful of iterations.

use serde::Serialize;
use tracing::debug;

use crate::dataset::Label;
use crate::{DetectError, DetectResult};

/// A binary classifier over scalar features.
pub trait Detector {
    /// Fit to `features` with parallel ground-truth `labels`.
    fn fit(&mut self, features: &[f64], labels: &[Label]) -> DetectResult<()>;

    /// Predict a label per feature.
    fn predict(&self, features: &[f64]) -> DetectResult<Vec<Label>>;
}

/// Configuration for [`LogisticRegression`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticConfig {
    /// Inverse regularization strength. Default: 1.0.
    pub c: f64,
    /// Newton iteration cap. Default: 100.
    pub max_iter: usize,
    /// Stop when the gradient norm drops below this. Default: 1e-8.
    pub tol: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 100,
            tol: 1e-8,
        }
    }
}

impl LogisticConfig {
    #[must_use]
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }
}

/// Fitted coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LogisticFit {
    pub weight: f64,
    pub intercept: f64,
    pub iterations: usize,
}

/// Binary logistic regression on a single feature.
#[derive(Debug, Clone, Default)]
pub struct LogisticRegression {
    config: LogisticConfig,
    fit: Option<LogisticFit>,
}

impl LogisticRegression {
    #[must_use]
    pub fn new(config: LogisticConfig) -> Self {
        Self { config, fit: None }
    }

    /// Coefficients, once fitted.
    #[must_use]
    pub fn coefficients(&self) -> Option<LogisticFit> {
        self.fit
    }

    /// `P(artifice | x)` per feature.
    pub fn predict_proba(&self, features: &[f64]) -> DetectResult<Vec<f64>> {
        let fit = self.fit.ok_or(DetectError::NotFitted)?;
        Ok(features
            .iter()
            .map(|&x| sigmoid(fit.weight * x + fit.intercept))
            .collect())
    }

    fn objective(&self, xs: &[f64], ys: &[f64], w: f64, b: f64) -> f64 {
        let loss: f64 = xs
            .iter()
            .zip(ys)
            .map(|(&x, &y)| {
                let z = w * x + b;
                // ln(1 + e^z) - y z, stable for large |z|
                softplus(z) - y * z
            })
            .sum();
        0.5 * w * w + self.config.c * loss
    }
}

impl Detector for LogisticRegression {
    fn fit(&mut self, features: &[f64], labels: &[Label]) -> DetectResult<()> {
        if features.len() != labels.len() {
            return Err(DetectError::LengthMismatch {
                left: features.len(),
                right: labels.len(),
            });
        }
        if features.is_empty() {
            return Err(DetectError::EmptyTrainingSet);
        }
        let ys: Vec<f64> = labels.iter().map(|l| l.as_f64()).collect();
        let positives = labels.iter().filter(|&&l| l == Label::Artifice).count();
        if positives == 0 || positives == labels.len() {
            return Err(DetectError::SingleClass);
        }

        let c = self.config.c;
        let (mut w, mut b) = (0.0_f64, 0.0_f64);
        let mut iterations = 0;
        for iter in 0..self.config.max_iter {
            iterations = iter + 1;
            let (mut gw, mut gb) = (w, 0.0);
            let (mut hww, mut hwb, mut hbb) = (1.0, 0.0, 0.0);
            for (&x, &y) in features.iter().zip(&ys) {
                let p = sigmoid(w * x + b);
                let r = p - y;
                let s = p * (1.0 - p);
                gw += c * r * x;
                gb += c * r;
                hww += c * s * x * x;
                hwb += c * s * x;
                hbb += c * s;
            }
            if gw.hypot(gb) < self.config.tol {
                break;
            }
            let det = hww * hbb - hwb * hwb;
            let (dw, db) = if det > f64::EPSILON * hww * hbb.max(1.0) {
                ((hbb * gw - hwb * gb) / det, (hww * gb - hwb * gw) / det)
            } else {
                // Hessian is near singular in b; fall back to gradient descent.
                (gw / hww, gb / hbb.max(1.0))
            };

            let current = self.objective(features, &ys, w, b);
            let mut step = 1.0;
            while step > 1e-10 && self.objective(features, &ys, w - step * dw, b - step * db) > current
            {
                step *= 0.5;
            }
            w -= step * dw;
            b -= step * db;
        }

        debug!(weight = w, intercept = b, iterations, "logistic regression fit");
        self.fit = Some(LogisticFit {
            weight: w,
            intercept: b,
            iterations,
        });
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> DetectResult<Vec<Label>> {
        Ok(self
            .predict_proba(features)?
            .into_iter()
            .map(|p| if p > 0.5 { Label::Artifice } else { Label::Clean })
            .collect())
    }
}

#[inline]
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[inline]
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(bits: &[u8]) -> Vec<Label> {
        bits.iter()
            .map(|&b| if b == 1 { Label::Artifice } else { Label::Clean })
            .collect()
    }

    #[test]
    fn sigmoid_is_stable() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-15);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!((softplus(0.0) - 2f64.ln()).abs() < 1e-15);
        assert!((softplus(50.0) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn separates_shifted_features() {
        let features: Vec<f64> = (0..40)
            .map(|i| if i < 20 { 0.2 + 0.005 * i as f64 } else { 0.7 + 0.005 * i as f64 })
            .collect();
        let truth: Vec<Label> = (0..40)
            .map(|i| if i < 20 { Label::Clean } else { Label::Artifice })
            .collect();
        let mut model = LogisticRegression::new(LogisticConfig::default().with_c(100.0));
        model.fit(&features, &truth).unwrap();
        assert_eq!(model.predict(&features).unwrap(), truth);
        let fit = model.coefficients().unwrap();
        assert!(fit.weight > 0.0);
    }

    #[test]
    fn regularization_shrinks_weight() {
        let features = [0.1, 0.2, 0.3, 0.6, 0.7, 0.8];
        let truth = labels(&[0, 0, 0, 1, 1, 1]);
        let mut strong = LogisticRegression::new(LogisticConfig::default().with_c(0.01));
        let mut weak = LogisticRegression::new(LogisticConfig::default().with_c(10.0));
        strong.fit(&features, &truth).unwrap();
        weak.fit(&features, &truth).unwrap();
        let ws = strong.coefficients().unwrap().weight;
        let ww = weak.coefficients().unwrap().weight;
        assert!(ws.abs() < ww.abs(), "strong={ws} weak={ww}");
    }

    #[test]
    fn fit_reaches_stationary_point() {
        let features = [0.1, 0.4, 0.35, 0.8, 0.5, 0.9, 0.2, 0.65];
        let truth = labels(&[0, 0, 1, 1, 0, 1, 0, 1]);
        let mut model = LogisticRegression::default();
        model.fit(&features, &truth).unwrap();
        let fit = model.coefficients().unwrap();
        let (mut gw, mut gb) = (fit.weight, 0.0);
        for (&x, l) in features.iter().zip(&truth) {
            let r = sigmoid(fit.weight * x + fit.intercept) - l.as_f64();
            gw += r * x;
            gb += r;
        }
        assert!(gw.abs() < 1e-6 && gb.abs() < 1e-6, "gw={gw} gb={gb}");
    }

    #[test]
    fn fit_rejects_bad_training_sets() {
        let mut model = LogisticRegression::default();
        assert_eq!(model.fit(&[], &[]), Err(DetectError::EmptyTrainingSet));
        assert_eq!(
            model.fit(&[0.1, 0.2], &labels(&[0])),
            Err(DetectError::LengthMismatch { left: 2, right: 1 })
        );
        assert_eq!(
            model.fit(&[0.1, 0.2], &labels(&[1, 1])),
            Err(DetectError::SingleClass)
        );
    }

    #[test]
    fn predict_requires_fit() {
        let model = LogisticRegression::default();
        assert_eq!(model.predict(&[0.5]), Err(DetectError::NotFitted));
    }
}
