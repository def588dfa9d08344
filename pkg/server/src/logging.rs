use tracing_subscriber::EnvFilter;

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Single-line JSON records on stdout, filtered by `RUST_LOG`.
pub fn init() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter())
        .with_current_span(false)
        .init();
}

/// Human-readable output for local development.
pub fn init_pretty() {
    tracing_subscriber::fmt().with_env_filter(filter()).init();
}
