use tracing_subscriber::EnvFilter;

/// Installs the global `fmt` subscriber.
///
/// Respects `RUST_LOG`, falling back to `info,tower_http=debug`. Safe to call
/// more than once (later calls are no-ops), which integration tests rely on.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
