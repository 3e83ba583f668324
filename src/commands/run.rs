use anyhow::{Context, Result};
use tracing::debug;

use memoflow::config::MemoflowConfig;
use memoflow::{JobDescription, JobRunner, TaskRegistry};

use crate::cli::RunArgs;

pub fn run(args: &RunArgs, config: MemoflowConfig, registry: TaskRegistry) -> Result<()> {
    let description = JobDescription::from_file(&args.job_filepath)
        .with_context(|| format!("Failed to load job: {}", args.job_filepath))?;

    // CLI values win over the config file
    let mut envs = config.env;
    envs.extend(args.envs.iter().cloned());
    let cache_url = args.cache_url.clone().or(config.cache.url);
    let seed = args.seed.unwrap_or(config.runtime.seed);
    debug!(
        "Environment: {:?}, caching: {}, seed: {}",
        envs.keys().collect::<Vec<_>>(),
        cache_url.is_some(),
        seed
    );

    let mut runner = JobRunner::new(&description, registry)
        .context("Invalid job description")?
        .with_envs(envs)
        .with_cache_url(cache_url)
        .with_seed(seed);

    runner.run(args.dry_run)?;
    Ok(())
}
