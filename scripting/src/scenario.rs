use adkit::scalar::Scalar;

/// Per-date market sample supplied by an external simulator.
#[derive(Debug, Clone, Copy)]
pub struct Sample<T> {
    pub spot: T,
    pub numeraire: T,
}

/// One path: a sample per event date, in event order.
pub type Scenario<T> = Vec<Sample<T>>;

/// Scenario with the same spot and numeraire on every date. Used as the mock
/// path in tests and as the default the product facade hands out.
pub fn uniform_scenario<T: Scalar>(n_dates: usize, spot: f64, numeraire: f64) -> Scenario<T> {
    (0..n_dates)
        .map(|_| Sample {
            spot: T::from(spot),
            numeraire: T::from(numeraire),
        })
        .collect()
}
