//! Sharpe ratio and its probabilistic/deflated variants.
//!
//! Inputs are integer bps returns; floats appear only here, at the very
//! end of the pipeline, and never feed back into state. The PSR
//! denominator uses the raw kurtosis `m4/m2²` combined as `(kurt−1)/4`,
//! matching the reference outputs bit-for-bit (the published PSR
//! formula would use excess kurtosis instead).

use crate::core::error::BacktestError;
use crate::core::types::Bps;
use statrs::function::erf::erf;

const BPS_SCALE: f64 = 10_000.0;

fn prepare_returns(returns: &[Bps]) -> Result<Vec<f64>, BacktestError> {
    if returns.is_empty() {
        return Err(BacktestError::schema("returns must be non-empty"));
    }
    Ok(returns.iter().map(|&r| r as f64 / BPS_SCALE).collect())
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n − 1 denominator).
fn variance(values: &[f64], mean: f64) -> f64 {
    let acc: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    acc / (values.len() - 1) as f64
}

/// Biased population moment `Σ(x−x̄)^k / n`.
fn moment(values: &[f64], mean: f64, power: i32) -> f64 {
    let acc: f64 = values.iter().map(|v| (v - mean).powi(power)).sum();
    acc / values.len() as f64
}

/// `mean / σ_sample` of the return series; 0 when the variance is zero.
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] for fewer than two returns.
pub fn sharpe_ratio(returns: &[Bps]) -> Result<f64, BacktestError> {
    if returns.len() < 2 {
        return Err(BacktestError::schema("insufficient returns for Sharpe"));
    }
    let values = prepare_returns(returns)?;
    let mean = mean(&values);
    let var = variance(&values, mean);
    if var <= 0.0 {
        return Ok(0.0);
    }
    Ok(mean / var.sqrt())
}

fn skew_kurtosis(returns: &[Bps]) -> Result<(f64, f64), BacktestError> {
    if returns.len() < 3 {
        return Err(BacktestError::schema(
            "insufficient returns for skew/kurtosis",
        ));
    }
    let values = prepare_returns(returns)?;
    let mean = mean(&values);
    let m2 = moment(&values, mean, 2);
    if m2 <= 0.0 {
        return Err(BacktestError::schema("zero variance returns"));
    }
    let m3 = moment(&values, mean, 3);
    let m4 = moment(&values, mean, 4);
    Ok((m3 / m2.powf(1.5), m4 / (m2 * m2)))
}

/// Standard normal CDF via the error function.
fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal quantile, Acklam's rational approximation.
///
/// Split at p = 0.02425 / 1 − 0.02425 with the published coefficients.
fn norm_ppf(p: f64) -> Result<f64, BacktestError> {
    if p <= 0.0 || p >= 1.0 {
        return Err(BacktestError::schema("p must be in (0,1)"));
    }
    const A: [f64; 6] = [
        -3.969683028665376e1,
        2.209460984245205e2,
        -2.759285104469687e2,
        1.383577518672690e2,
        -3.066479806614716e1,
        2.506628277459239e0,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e1,
        1.615858368580409e2,
        -1.556989798598866e2,
        6.680131188771972e1,
        -1.328068155288572e1,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-3,
        -3.223964580411365e-1,
        -2.400758277161838e0,
        -2.549732539343734e0,
        4.374664141464968e0,
        2.938163982698783e0,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-3,
        3.224671290700398e-1,
        2.445134137142996e0,
        3.754408661907416e0,
    ];
    const P_LOW: f64 = 0.02425;
    const P_HIGH: f64 = 1.0 - P_LOW;

    let tail = |q: f64| -> f64 {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        return Ok(tail(q));
    }
    if p > P_HIGH {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        return Ok(-tail(q));
    }
    let q = p - 0.5;
    let r = q * q;
    Ok(
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0),
    )
}

fn psr_denominator(sr_hat: f64, skew: f64, kurtosis: f64) -> Result<f64, BacktestError> {
    let denom = 1.0 - skew * sr_hat + ((kurtosis - 1.0) / 4.0) * sr_hat * sr_hat;
    if denom <= 0.0 {
        return Err(BacktestError::schema("invalid PSR denominator"));
    }
    Ok(denom.sqrt())
}

/// Probability that the true Sharpe exceeds `sr_benchmark`.
///
/// # Errors
///
/// Returns [`BacktestError::Schema`] for a non-finite benchmark, fewer
/// than three returns, zero variance, or a non-positive PSR denominator.
pub fn probabilistic_sharpe_ratio(
    returns: &[Bps],
    sr_benchmark: f64,
) -> Result<f64, BacktestError> {
    if !sr_benchmark.is_finite() {
        return Err(BacktestError::schema("sr_benchmark must be finite"));
    }
    if returns.len() < 3 {
        return Err(BacktestError::schema("insufficient returns for PSR"));
    }
    let sr_hat = sharpe_ratio(returns)?;
    let (skew, kurtosis) = skew_kurtosis(returns)?;
    let denom = psr_denominator(sr_hat, skew, kurtosis)?;
    let z = (sr_hat - sr_benchmark) * ((returns.len() - 1) as f64).sqrt() / denom;
    Ok(norm_cdf(z))
}

/// PSR deflated for multiple trials: the benchmark is lifted by the
/// `1 − 1/n_trials` quantile of the Sharpe estimator's dispersion.
///
/// # Errors
///
/// As [`probabilistic_sharpe_ratio`], plus `n_trials` must be at least 1.
pub fn deflated_sharpe_ratio(
    returns: &[Bps],
    sr_benchmark: f64,
    n_trials: u32,
) -> Result<f64, BacktestError> {
    if n_trials < 1 {
        return Err(BacktestError::schema("n_trials must be >= 1"));
    }
    if !sr_benchmark.is_finite() {
        return Err(BacktestError::schema("sr_benchmark must be finite"));
    }
    if returns.len() < 3 {
        return Err(BacktestError::schema("insufficient returns for DSR"));
    }
    let sr_hat = sharpe_ratio(returns)?;
    let (skew, kurtosis) = skew_kurtosis(returns)?;
    let denom = psr_denominator(sr_hat, skew, kurtosis)?;
    let sqrt_n = ((returns.len() - 1) as f64).sqrt();
    let sr_star = if n_trials == 1 {
        sr_benchmark
    } else {
        sr_benchmark + norm_ppf(1.0 - 1.0 / f64::from(n_trials))? * (denom / sqrt_n)
    };
    let z = (sr_hat - sr_star) * sqrt_n / denom;
    Ok(norm_cdf(z))
}
