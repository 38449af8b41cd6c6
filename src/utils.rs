//! Formatting helpers for terminal output.

/// Four decimal places, or "-" for a missing or non-finite value.
pub fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{x:.4}"),
        _ => "-".to_owned(),
    }
}

/// A score in `[0, 1]` as a percentage with one decimal.
pub fn fmt_ratio(ratio: f64) -> String {
    if ratio.is_finite() {
        format!("{:.1}%", ratio * 100.0)
    } else {
        "-".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_opt() {
        assert_eq!(fmt_opt(Some(1.581_138_830_084_189_8)), "1.5811");
        assert_eq!(fmt_opt(None), "-");
        assert_eq!(fmt_opt(Some(f64::NAN)), "-");
    }

    #[test]
    fn test_fmt_ratio() {
        assert_eq!(fmt_ratio(1.0), "100.0%");
        assert_eq!(fmt_ratio(0.625), "62.5%");
        assert_eq!(fmt_ratio(f64::INFINITY), "-");
    }
}
