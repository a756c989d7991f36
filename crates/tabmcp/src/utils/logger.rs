use log::LevelFilter;

/// CLI output goes through the logger, so the filter doubles as the
/// verbosity switch. `RUST_LOG` still wins when set.
pub fn init_logger(quiet: bool, verbose: u8) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .format_target(verbose > 0)
        .init();
}
