#[inline(always)]
pub fn logistic(t: f32) -> f32 {
    (1.0 + (-t).exp()).recip()
}

/// Log loss `ln(1 + exp(-y*t))` of decision value `t` for label `y` in {-1, +1}, and its
/// derivative by `t`, `kappa = -y * exp(-y*t) / (1 + exp(-y*t))`.
/// Both are evaluated in a form that does not overflow for large |t|.
#[inline(always)]
pub fn logloss_and_gradient(y: f32, t: f32, example_number: u64) -> (f64, f32) {
    if t.is_nan() {
        log::warn!("NAN prediction in example {}, skipping its update", example_number);
        return (std::f64::consts::LN_2, 0.0);
    }
    let z = -(y as f64) * (t as f64);
    let loss = if z > 0.0 { z + (-z).exp().ln_1p() } else { z.exp().ln_1p() };
    // exp(z) / (1 + exp(z)) == 1 / (1 + exp(-z))
    let kappa = -(y as f64) / (1.0 + (-z).exp());
    (loss, kappa as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_epsilon;

    #[test]
    fn test_logistic() {
        assert_eq!(logistic(0.0), 0.5);
        assert_epsilon!(logistic(2.0), 0.880797);
        assert_epsilon!(logistic(-2.0), 0.119203);
        assert_eq!(logistic(-200.0), 0.0);
        assert_eq!(logistic(200.0), 1.0);
    }

    #[test]
    fn test_logloss_and_gradient() {
        let (loss, kappa) = logloss_and_gradient(1.0, 0.0, 0);
        assert_epsilon!(loss as f32, 0.693147);
        assert_eq!(kappa, -0.5);

        // closed form: expnyt = exp(-y*t), kappa = -y * expnyt / (1 + expnyt)
        for (y, t) in [(1.0f32, 0.7f32), (-1.0, 0.7), (1.0, -3.0), (-1.0, -0.2)].iter() {
            let expnyt = (-y * t).exp();
            let (loss, kappa) = logloss_and_gradient(*y, *t, 0);
            assert_epsilon!(loss as f32, (1.0 + expnyt).ln());
            assert_epsilon!(kappa, -y * expnyt / (1.0 + expnyt));
        }
    }

    #[test]
    fn test_logloss_extremes() {
        // exp(-y*t) would overflow f32 here
        let (loss, kappa) = logloss_and_gradient(1.0, -1000.0, 0);
        assert_epsilon!(loss as f32, 1000.0);
        assert_eq!(kappa, -1.0);
        let (loss, kappa) = logloss_and_gradient(-1.0, -1000.0, 0);
        assert!(loss >= 0.0 && loss < 1e-10);
        assert!(kappa.abs() < 1e-10);

        let (loss, kappa) = logloss_and_gradient(1.0, std::f32::NAN, 3);
        assert!(loss.is_finite());
        assert_eq!(kappa, 0.0);
    }
}
