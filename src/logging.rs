//! Tracing subscriber setup.
//!
//! `RUST_LOG` is honoured; `-v` flags raise the base level
//! (none → info, `-v` → debug, `-vv` → trace). Logs go to stderr so command
//! output on stdout stays pipeable.

use tracing_subscriber::filter::{EnvFilter, LevelFilter};

pub fn create_filter(verbose: u8) -> anyhow::Result<EnvFilter> {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=info".parse()?)
        .add_directive("h2=info".parse()?)
        .add_directive("tokio_util::codec=info".parse()?);

    Ok(filter)
}

pub fn init(verbose: u8) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(create_filter(verbose)?)
        .with_writer(std::io::stderr)
        .with_target(verbose > 0)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_build_for_every_level() {
        for verbose in 0..4 {
            assert!(create_filter(verbose).is_ok());
        }
    }
}
