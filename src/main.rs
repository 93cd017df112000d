use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use gridload::presentation::cli::commands::{
    ListAlgorithmsCommand, ListWorkloadsCommand, OptimizeCommand, RunCommand, ShowCommand,
};
use gridload::presentation::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("gridload=debug,info")
    } else {
        EnvFilter::new("gridload=info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            workload,
            clients,
            threads,
            duration,
            interval,
            param,
        } => RunCommand::execute(&workload, clients, threads, duration, interval, &param)?,
        Commands::Optimize {
            workload,
            statistic,
            optimize_type,
            min_threads,
            max_threads,
            increment,
            max_non_improving,
            min_pct_improvement,
            duration,
            clients,
            rerun_best,
            rerun_duration,
            interval,
            param,
        } => OptimizeCommand::execute(
            &workload,
            &statistic,
            optimize_type,
            min_threads,
            max_threads,
            increment,
            max_non_improving,
            min_pct_improvement,
            duration,
            clients,
            rerun_best,
            rerun_duration,
            interval,
            &param,
        )?,
        Commands::Workloads => ListWorkloadsCommand::execute()?,
        Commands::Algorithms => ListAlgorithmsCommand::execute()?,
        Commands::Show { database, job_id } => {
            ShowCommand::execute(&database, job_id.as_deref())?
        }
    }

    Ok(())
}
