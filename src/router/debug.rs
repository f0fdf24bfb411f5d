use std::hint::black_box;

/// Deliberately divides by zero so error reporting can be checked end to end.
/// The panic is left for the panic layer and sentry to pick up.
#[tracing::instrument]
pub async fn trigger_error() {
    let divisor: u32 = black_box(0);
    let _division_by_zero = 1 / divisor;
}
