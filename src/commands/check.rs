use anyhow::{Context, Result};

use memoflow::{Job, JobDescription, TaskRegistry};

use crate::cli::CheckArgs;

pub fn run(args: &CheckArgs, registry: &TaskRegistry) -> Result<()> {
    let description = JobDescription::from_file(&args.job_filepath)
        .with_context(|| format!("Failed to load job: {}", args.job_filepath))?;
    let mut job = Job::new(&description).context("Invalid job description")?;
    println!("{}", job);

    println!("Loading task modules...");
    job.load_modules(registry)?;

    println!("Success!");
    Ok(())
}
