use tracing_subscriber::EnvFilter;

/// Installs a stderr subscriber filtered by `OPFLOW_LOG`, then `RUST_LOG`,
/// defaulting to `warn`. Stdout is left to command output.
pub fn init() {
    let env_filter = EnvFilter::try_from_env("OPFLOW_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
