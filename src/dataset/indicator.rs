//! Array indicator primitives for feature engineering.
//!
//! Every function maps an input series to an output vector of the same
//! length, with `f64::NAN` for rows where the indicator's lookback window
//! is not yet filled. Computation never crosses a symbol boundary: callers
//! pass one symbol's arrays at a time.

/// Momentum: `x[t] - x[t-n]`, NaN for the first n rows.
pub fn mom(xs: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; xs.len()];
    for i in n..xs.len() {
        out[i] = xs[i] - xs[i - n];
    }
    out
}

/// Trailing rolling maximum over a window of n observations.
pub fn rolling_max(xs: &[f64], n: usize) -> Vec<f64> {
    rolling_apply(xs, n, |window| {
        window.iter().cloned().fold(f64::MIN, f64::max)
    })
}

/// Trailing rolling minimum over a window of n observations.
pub fn rolling_min(xs: &[f64], n: usize) -> Vec<f64> {
    rolling_apply(xs, n, |window| {
        window.iter().cloned().fold(f64::MAX, f64::min)
    })
}

/// Trailing rolling mean over a window of n observations.
pub fn rolling_mean(xs: &[f64], n: usize) -> Vec<f64> {
    rolling_apply(xs, n, |window| {
        window.iter().sum::<f64>() / n as f64
    })
}

/// Trailing rolling sample standard deviation (ddof = 1).
///
/// A window of 1 has no sample deviation, so n = 1 yields all NaN.
pub fn rolling_std(xs: &[f64], n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![f64::NAN; xs.len()];
    }
    rolling_apply(xs, n, |window| {
        let mean = window.iter().sum::<f64>() / n as f64;
        let var = window
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / (n - 1) as f64;
        var.sqrt()
    })
}

/// Ratio of trailing rolling max to rolling min of the close series.
/// A window of 1 degenerates to 1.0.
pub fn highlow(close: &[f64], n: usize) -> Vec<f64> {
    let max = rolling_max(close, n);
    let min = rolling_min(close, n);
    max.iter().zip(min.iter()).map(|(h, l)| h / l).collect()
}

/// Cumulative on-balance volume, seeded with the first volume.
///
/// Adds volume when close rises against the prior close, subtracts when it
/// falls, carries the running value when unchanged.
pub fn obv(close: &[f64], volume: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(close.len());
    let mut running = 0.0;
    for i in 0..close.len() {
        if i == 0 {
            running = volume[0];
        } else if close[i] > close[i - 1] {
            running += volume[i];
        } else if close[i] < close[i - 1] {
            running -= volume[i];
        }
        out.push(running);
    }
    out
}

/// Wilder-smoothed relative strength index, NaN for the first n rows.
pub fn rsi(close: &[f64], n: usize) -> Vec<f64> {
    let len = close.len();
    let mut out = vec![f64::NAN; len];
    if len < n + 1 || n == 0 {
        return out;
    }

    let mut gains = vec![0.0; len];
    let mut losses = vec![0.0; len];
    for i in 1..len {
        let change = close[i] - close[i - 1];
        if change > 0.0 {
            gains[i] = change;
        } else {
            losses[i] = -change;
        }
    }

    let mut avg_gain = gains[1..=n].iter().sum::<f64>() / n as f64;
    let mut avg_loss = losses[1..=n].iter().sum::<f64>() / n as f64;
    for i in n..len {
        if i > n {
            avg_gain = (avg_gain * (n - 1) as f64 + gains[i]) / n as f64;
            avg_loss = (avg_loss * (n - 1) as f64 + losses[i]) / n as f64;
        }
        out[i] = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        };
    }
    out
}

/// Exponential moving average seeded with the simple average of the first
/// n valid observations. Tolerates a NaN warmup head in the input.
pub fn ema(xs: &[f64], n: usize) -> Vec<f64> {
    let len = xs.len();
    let mut out = vec![f64::NAN; len];
    if n == 0 {
        return out;
    }
    let first_valid = match xs.iter().position(|v| !v.is_nan()) {
        Some(i) => i,
        None => return out,
    };
    let seed_at = first_valid + n - 1;
    if seed_at >= len {
        return out;
    }

    let multiplier = 2.0 / (n as f64 + 1.0);
    out[seed_at] = xs[first_valid..=seed_at].iter().sum::<f64>() / n as f64;
    for i in (seed_at + 1)..len {
        out[i] = (xs[i] - out[i - 1]) * multiplier + out[i - 1];
    }
    out
}

/// MACD: fast/slow EMA difference (dif), its signal EMA (dea), and the
/// histogram `2 * (dif - dea)`. All NaN until the slow EMA has history;
/// dea and the histogram further wait for the signal window.
pub fn macd(close: &[f64], fast: usize, slow: usize, signal: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let ema_fast = ema(close, fast);
    let ema_slow = ema(close, slow);
    let dif: Vec<f64> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();
    let dea = ema(&dif, signal);
    let hist: Vec<f64> = dif
        .iter()
        .zip(dea.iter())
        .map(|(d, e)| 2.0 * (d - e))
        .collect();
    (dif, dea, hist)
}

/// Stochastic %K/%D/%J with a raw %K window of `fastk` rows and simple
/// moving-average smoothing of `slowk` and `slowd` periods.
///
/// `%J = 3*%K - 2*%D`. A flat high/low window yields NaN for that row.
pub fn stoch_kdj(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    fastk: usize,
    slowk: usize,
    slowd: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let len = close.len();
    let mut rsv = vec![f64::NAN; len];
    for i in (fastk.saturating_sub(1))..len {
        let window = (i + 1 - fastk)..=i;
        let hh = high[window.clone()].iter().cloned().fold(f64::MIN, f64::max);
        let ll = low[window].iter().cloned().fold(f64::MAX, f64::min);
        if hh > ll {
            rsv[i] = 100.0 * (close[i] - ll) / (hh - ll);
        }
    }

    let k = rolling_mean(&rsv, slowk);
    let d = rolling_mean(&k, slowd);
    let j: Vec<f64> = k
        .iter()
        .zip(d.iter())
        .map(|(k, d)| 3.0 * k - 2.0 * d)
        .collect();
    (k, d, j)
}

/// Forward return label: `close[t+2] / close[t+1] - 1`, NaN where t+2
/// falls past the end of the series.
pub fn forward_return(close: &[f64]) -> Vec<f64> {
    let len = close.len();
    let mut out = vec![f64::NAN; len];
    for i in 0..len.saturating_sub(2) {
        out[i] = close[i + 2] / close[i + 1] - 1.0;
    }
    out
}

fn rolling_apply<F>(xs: &[f64], n: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut out = vec![f64::NAN; xs.len()];
    if n == 0 {
        return out;
    }
    for i in (n - 1)..xs.len() {
        let window = &xs[i + 1 - n..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = f(window);
    }
    out
}
