use clap::{Parser, Subcommand};

/// Memoflow - Declarative task pipelines with result caching
///
/// Memoflow runs a JSON job description task by task, wiring outputs into
/// later inputs and reusing cached outputs when a task's inputs are unchanged.
#[derive(Parser, Debug)]
#[command(name = "memoflow")]
#[command(author = "Memoflow Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Declarative task pipelines with result caching", long_about = None)]
pub struct Cli {
    /// Config file path (default: discover memoflow.toml)
    #[arg(short = 'c', long, global = true, env = "MEMOFLOW_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a job file and load every task module without running anything
    Check(CheckArgs),

    /// Run a job
    Run(RunArgs),

    /// Describe a task module, or list all of them
    Show(ShowArgs),
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Job description (JSON)
    pub job_filepath: String,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Job description (JSON)
    pub job_filepath: String,

    /// Environment variable visible as $env.KEY (repeatable)
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub envs: Vec<(String, String)>,

    /// Build the outputs' shape without executing any task
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Cache location: existing directory or http(s) container URL
    #[arg(long, env = "MEMOFLOW_CACHE_URL")]
    pub cache_url: Option<String>,

    /// Seed the task RNG is reset to before every task
    #[arg(long)]
    pub seed: Option<u64>,

    /// Debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Task identifier
    pub task_name: Option<String>,
}

/// Split `KEY=VALUE` on the first `=`
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", s)),
    }
}

impl Cli {
    pub fn verbose(&self) -> bool {
        matches!(&self.command, Commands::Run(args) if args.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("URL=http://x?a=b").unwrap(),
            ("URL".to_string(), "http://x?a=b".to_string())
        );
        assert_eq!(
            parse_key_value("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
        assert!(parse_key_value("NOVALUE").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::parse_from([
            "memoflow", "run", "job.json", "-e", "A=1", "--env", "B=2", "-n", "--seed", "3", "-v",
        ]);
        assert!(cli.verbose());
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.job_filepath, "job.json");
                assert_eq!(args.envs.len(), 2);
                assert!(args.dry_run);
                assert_eq!(args.seed, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_show_without_task() {
        let cli = Cli::parse_from(["memoflow", "show"]);
        assert!(matches!(cli.command, Commands::Show(ShowArgs { task_name: None })));
    }
}
