/// Ordered set of tasks with unique display names
use std::collections::HashSet;
use std::fmt;

use crate::description::JobDescription;
use crate::error::Result;
use crate::module::TaskRegistry;
use crate::task::Task;

pub struct Job {
    tasks: Vec<Task>,
}

impl Job {
    pub fn new(description: &JobDescription) -> Result<Self> {
        let mut tasks = description
            .tasks
            .iter()
            .map(Task::from_description)
            .collect::<Result<Vec<_>>>()?;

        let mut used_names = HashSet::new();
        for task in &mut tasks {
            let name = unique_name(task.name(), &used_names);
            if name != task.name() {
                task.set_name(name.clone());
            }
            used_names.insert(name);
        }

        Ok(Self { tasks })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Resolve and validate every module before anything runs
    pub fn load_modules(&mut self, registry: &TaskRegistry) -> Result<()> {
        for task in &mut self.tasks {
            task.load_module(registry)
                .map_err(|e| e.in_task(task.task_id(), task.name()))?;
        }
        Ok(())
    }
}

/// First free `base@N`, counting up from any numeric suffix `name` already has
fn unique_name(name: &str, used: &HashSet<String>) -> String {
    if !used.contains(name) {
        return name.to_string();
    }

    let (base, mut count) = match name.rsplit_once('@') {
        Some((base, suffix)) => match suffix.parse::<u64>() {
            Ok(n) => (base, n),
            Err(_) => (name, 1),
        },
        None => (name, 1),
    };

    loop {
        count += 1;
        let candidate = format!("{}@{}", base, count);
        if !used.contains(&candidate) {
            return candidate;
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Job {{")?;
        for task in &self.tasks {
            writeln!(f, "  {}", task)?;
        }
        write!(f, "}}")
    }
}
