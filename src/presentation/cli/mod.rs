pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gridload")]
#[command(author = "GridLoad Team")]
#[command(version = "0.1.0")]
#[command(about = "Distributed load-generation framework with adaptive thread-count optimization", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Run one job on in-process workers and print its statistics")]
    Run {
        #[arg(short, long, value_name = "CLASS", help = "Workload class to run")]
        workload: String,

        #[arg(short, long, default_value_t = 1, help = "Number of workers")]
        clients: u32,

        #[arg(short, long, default_value_t = 1, help = "Threads per worker")]
        threads: u32,

        #[arg(short, long, default_value_t = 10, help = "Maximum duration in seconds")]
        duration: u64,

        #[arg(short, long, default_value_t = 1, help = "Statistics collection interval in seconds")]
        interval: u32,

        #[arg(short, long, value_name = "NAME=VALUE", help = "Workload parameter")]
        param: Vec<String>,
    },

    #[command(about = "Run an optimizing job searching over thread counts")]
    Optimize {
        #[arg(short, long, value_name = "CLASS", help = "Workload class to run")]
        workload: String,

        #[arg(short, long, value_name = "NAME", help = "Statistic to optimize")]
        statistic: String,

        #[arg(short = 'o', long, value_enum, default_value = "maximize", help = "Optimization direction")]
        optimize_type: OptimizeDirection,

        #[arg(long, default_value_t = 1, help = "Thread count of the first iteration")]
        min_threads: u32,

        #[arg(
            long,
            default_value_t = -1,
            allow_hyphen_values = true,
            help = "Thread-count cap; negative means uncapped"
        )]
        max_threads: i64,

        #[arg(long, default_value_t = 1, help = "Thread-count step between iterations")]
        increment: u32,

        #[arg(long, default_value_t = 2, help = "Consecutive non-improving iterations tolerated")]
        max_non_improving: u32,

        #[arg(long, default_value_t = 0.0, help = "Minimum fractional improvement over the best")]
        min_pct_improvement: f64,

        #[arg(short, long, default_value_t = 5, help = "Per-iteration duration in seconds")]
        duration: u64,

        #[arg(short, long, default_value_t = 1, help = "Number of workers per iteration")]
        clients: u32,

        #[arg(long, help = "Re-run the best iteration for validation")]
        rerun_best: bool,

        #[arg(long, value_name = "SECONDS", help = "Duration of the validation re-run")]
        rerun_duration: Option<u64>,

        #[arg(short, long, default_value_t = 1, help = "Statistics collection interval in seconds")]
        interval: u32,

        #[arg(short, long, value_name = "NAME=VALUE", help = "Workload parameter")]
        param: Vec<String>,
    },

    #[command(about = "List the registered workload classes")]
    Workloads,

    #[command(about = "List the registered optimization algorithms")]
    Algorithms,

    #[command(about = "Show persisted job records from a job store database")]
    Show {
        #[arg(short, long, value_name = "FILE", default_value = "gridload.db", help = "Job store database file")]
        database: PathBuf,

        #[arg(short, long, value_name = "ID", help = "Show one job in detail")]
        job_id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OptimizeDirection {
    Maximize,
    Minimize,
}

impl OptimizeDirection {
    /// The algorithm parameter value for this direction
    pub fn as_parameter(&self) -> &'static str {
        match self {
            OptimizeDirection::Maximize => "maximize",
            OptimizeDirection::Minimize => "minimize",
        }
    }
}
