//! Command line runner for the `picore` library.

#[cfg(not(feature = "for-testing"))]
#[quit::main]
fn main() {
    #[cfg(feature = "cli")]
    picore::cli::run::run();
}

#[cfg(feature = "for-testing")]
fn main() {
    #[cfg(feature = "cli")]
    {
        eprintln!(
            "Warning: The `for-testing` feature is enabled, which makes errors panic instead of exiting\n\
             Tip: Use cargo flag --features=all-non-testing to include all features except `for-testing`"
        );
        picore::cli::run::run();
    }
}
