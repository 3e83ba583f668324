/// Runs a whole job: load modules, set up the cache, execute tasks in order
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::cache::CacheManager;
use crate::context::Context;
use crate::description::JobDescription;
use crate::error::Result;
use crate::hash::HashGenerator;
use crate::job::Job;
use crate::module::TaskRegistry;

pub struct JobRunner {
    job: Job,
    registry: TaskRegistry,
    envs: BTreeMap<String, String>,
    cache_url: Option<String>,
    seed: u64,
    hasher: Arc<HashGenerator>,
}

impl JobRunner {
    pub fn new(description: &JobDescription, registry: TaskRegistry) -> Result<Self> {
        Ok(Self {
            job: Job::new(description)?,
            registry,
            envs: BTreeMap::new(),
            cache_url: None,
            seed: Context::DEFAULT_SEED,
            hasher: Arc::new(HashGenerator::new()),
        })
    }

    pub fn with_envs(mut self, envs: BTreeMap<String, String>) -> Self {
        self.envs = envs;
        self
    }

    /// Cache address; `None` disables caching
    pub fn with_cache_url(mut self, cache_url: Option<String>) -> Self {
        self.cache_url = cache_url;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_hash_generator(mut self, hasher: Arc<HashGenerator>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Run every task in order and return the final context.
    ///
    /// All modules are loaded first, so a broken description fails before any
    /// task runs. The first failing task aborts the run.
    pub fn run(&mut self, dry_run: bool) -> Result<Context> {
        info!("Loading task modules.");
        self.job.load_modules(&self.registry)?;

        info!("Running a job.");
        let mut context = Context::new(self.envs.clone())
            .with_seed(self.seed)
            .with_hash_generator(self.hasher.clone());

        if let Some(url) = &self.cache_url {
            let cache_manager = CacheManager::from_url(url, self.hasher.clone())?;
            info!("Cache is enabled");
            context = context.with_cache_manager(Arc::new(cache_manager));
        }

        for task in self.job.tasks() {
            debug!("Running a task: {}", task);
            if let Err(e) = task.execute(&mut context, dry_run) {
                error!("Failed to run a task {}: {}", task, e);
                return Err(e);
            }
        }

        info!("Completed.");
        Ok(context)
    }
}
