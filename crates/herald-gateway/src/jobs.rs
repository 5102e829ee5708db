//! `herald jobs ...` catalog commands.

use anyhow::Context;

use herald_core::config::HeraldConfig;
use herald_core::{Job, JobOption};
use herald_scheduler::schedule::parse_cron;
use herald_scheduler::types::options_from;
use herald_scheduler::SqliteJobStore;

use crate::JobsAction;

pub(crate) fn run(config: &HeraldConfig, action: JobsAction) -> anyhow::Result<()> {
    let store = SqliteJobStore::new(crate::open_db(&config.database.path)?)?;

    match action {
        JobsAction::List => {
            let jobs = store.list()?;
            if jobs.is_empty() {
                println!("No jobs.");
            }
            for job in jobs {
                println!("{}", describe(&job));
            }
        }
        JobsAction::Add {
            name,
            cron,
            payload,
            options,
            disabled,
        } => {
            let job = build_job(&name, &cron, payload.as_deref(), &options, !disabled)?;
            store.save(&job)?;
            println!("Created job {}", job.id);
        }
        JobsAction::Enable { id } => {
            store.set_enabled(&id, true)?;
            println!("Enabled job {id}");
        }
        JobsAction::Disable { id } => {
            store.set_enabled(&id, false)?;
            println!("Disabled job {id}");
        }
        JobsAction::Remove { id } => {
            store.remove(&id)?;
            println!("Removed job {id}");
        }
    }
    Ok(())
}

/// Validate CLI input up front so a bad job never reaches the catalog.
fn build_job(
    name: &str,
    cron: &str,
    payload: Option<&str>,
    options: &[String],
    enabled: bool,
) -> anyhow::Result<Job> {
    parse_cron(cron)?;

    let mut job = Job::new(name, cron);
    job.enabled = enabled;
    if let Some(raw) = payload {
        let value: serde_json::Value =
            serde_json::from_str(raw).context("--payload must be valid JSON")?;
        job = job.with_payload(value);
    }
    for raw in options {
        job = job.with_option(JobOption::parse(raw)?);
    }
    options_from(&job.options)?;
    Ok(job)
}

fn describe(job: &Job) -> String {
    let state = if job.enabled { "on " } else { "off" };
    let mut line = format!(
        "{}  [{}]  {:<20}  {:<16}  updated {}",
        job.id,
        state,
        job.name,
        job.cron_expr,
        job.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    if !job.options.is_empty() {
        let opts: Vec<String> = job
            .options
            .iter()
            .map(|o| format!("{}={}", o.kind, o.value))
            .collect();
        line.push_str(&format!("  options: {}", opts.join(",")));
    }
    line
}
