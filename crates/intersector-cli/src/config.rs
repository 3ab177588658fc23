use clap::Parser;
use intersector::{Config, DEFAULT_BUFFER_CAPACITY, DEFAULT_POOL_LIMIT, FailurePolicy};
use std::path::PathBuf;
use std::time::Duration;

/// Command line arguments for the `intersect` binary.
///
/// Every tunable can also be set from the environment (or a `.env` file in
/// the working directory). Flags take precedence over the environment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "intersect",
    version,
    about = "Print the lines that appear in every input file"
)]
pub struct CliArgs {
    /// Files to intersect. Each one is read lazily on its own thread.
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Lines each reader may buffer ahead of the intersection.
    ///
    /// Environment variable: `INTERSECT_BUFFER_CAPACITY`
    #[arg(long, env = "INTERSECT_BUFFER_CAPACITY", default_value_t = DEFAULT_BUFFER_CAPACITY)]
    pub buffer_capacity: usize,

    /// Maximum number of concurrently running readers. Further files are
    /// opened for reading as earlier ones finish.
    ///
    /// Environment variable: `INTERSECT_POOL_LIMIT`
    #[arg(long, env = "INTERSECT_POOL_LIMIT", default_value_t = DEFAULT_POOL_LIMIT)]
    pub pool_limit: usize,

    /// How long to wait on one reader before moving on to the next.
    ///
    /// Environment variable: `INTERSECT_POLL_TIMEOUT_MS`
    #[arg(long, env = "INTERSECT_POLL_TIMEOUT_MS", default_value_t = 100)]
    pub poll_timeout_ms: u64,

    /// Print a line again each time every file repeats it.
    #[arg(long, default_value_t = false)]
    pub keep_repeats: bool,

    /// Stop at the first read error instead of finishing with the other files.
    #[arg(long, default_value_t = false)]
    pub fail_fast: bool,

    /// Print run statistics as JSON to stderr once done.
    #[arg(long, default_value_t = false)]
    pub stats: bool,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub files: Vec<PathBuf>,
    pub engine: Config,
    pub stats: bool,
}

impl TryFrom<CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let engine = Config::default()
            .with_buffer_capacity(args.buffer_capacity)
            .with_pool_limit(args.pool_limit)
            .with_poll_timeout(Duration::from_millis(args.poll_timeout_ms))
            .with_dedup_emitted(!args.keep_repeats)
            .with_failure_policy(if args.fail_fast {
                FailurePolicy::Abort
            } else {
                FailurePolicy::Continue
            });
        engine.validate()?;

        Ok(Self {
            files: args.files,
            engine,
            stats: args.stats,
        })
    }
}
