//! Subscriber setup shared by the binaries.

/// Variable holding an `EnvFilter` directive, e.g. `ERPBATCH_LOG=erpbatch=debug`.
pub const LOG_ENV: &str = "ERPBATCH_LOG";

/// Install a `fmt` subscriber on stderr.
///
/// `ERPBATCH_LOG` wins when set; otherwise `-q` → error, `-v` → debug,
/// default info.
pub fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
