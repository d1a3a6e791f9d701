use tracing_subscriber::EnvFilter;

/// Chooses the log filter: `--quiet` wins over `--verbose`, and both win over
/// `RUST_LOG`. Without any of them only warnings and errors are shown.
pub fn filter_directive(quiet: bool, verbose: bool) -> Option<&'static str> {
    if quiet {
        Some("error")
    } else if verbose {
        Some("media_ingest=debug,info")
    } else {
        None
    }
}

/// Installs the global subscriber for the binary. Logs go to stderr so they
/// never mix with command output.
pub fn init(quiet: bool, verbose: bool) {
    let filter = match filter_directive(quiet, verbose) {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
