use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{NaiveDateTime, Utc};
use clap::Args;
use talent_pipeline::config::AppConfig;
use talent_pipeline::error::AppError;
use talent_pipeline::workflows::sourcing::{
    write_groups_csv, CurationError, JobGroup, JobId, JobSnapshot, PollOutcome, ResumeUpload,
    SearchPrompts, SourcingJob, StructuredJd,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::infra::build_facade;

#[derive(Args, Debug)]
pub(crate) struct SearchArgs {
    /// Prompt for the LinkedIn search
    #[arg(long)]
    pub(crate) linkedin: Option<String>,
    /// Prompt for the GitHub search
    #[arg(long)]
    pub(crate) github: Option<String>,
    /// Job title to file saved candidates under
    #[arg(long)]
    pub(crate) title: Option<String>,
    /// Follow the job and print progress until it finishes
    #[arg(long)]
    pub(crate) watch: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ListArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ExportArgs {
    /// Destination file; stdout when omitted
    #[arg(long, short)]
    pub(crate) output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct AttachResumeArgs {
    #[arg(long)]
    pub(crate) job_id: String,
    #[arg(long)]
    pub(crate) candidate_link: String,
    /// Resume file to upload
    pub(crate) path: PathBuf,
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))
}

pub(crate) async fn run_search(config: &AppConfig, args: SearchArgs) -> Result<(), AppError> {
    let facade = build_facade(&config.sourcing)?;
    let prompts = SearchPrompts {
        linkedin_prompt: args.linkedin,
        github_prompt: args.github,
    };
    let structured_jd = args.title.map(|title| StructuredJd {
        job_title: Some(title),
        ..StructuredJd::default()
    });

    let mut snapshots = facade.store().subscribe();
    let search = facade.create_search(prompts, structured_jd).await?;
    println!("created sourcing job {}", search.job_id);
    if !args.watch {
        facade.cancel_poll(search.job_id.as_str())?;
        return Ok(());
    }

    let completion = search.completion.wait();
    tokio::pin!(completion);
    let outcome = loop {
        tokio::select! {
            outcome = &mut completion => break outcome,
            event = snapshots.recv() => match event {
                Ok(snapshot) if snapshot.job_id == search.job_id => print_progress(&snapshot),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "progress display fell behind"),
                Err(RecvError::Closed) => {}
            },
        }
    };

    match outcome {
        PollOutcome::Completed(snapshot) => {
            println!(
                "job {} {} with {} candidates",
                snapshot.job_id, snapshot.status, snapshot.candidate_count
            );
            for candidate in &snapshot.candidates {
                println!(
                    "  {:>3}  {:<28} {}",
                    candidate.match_score, candidate.name, candidate.link
                );
            }
            Ok(())
        }
        PollOutcome::Failed { job_id, detail } => Err(CurationError::ExternalService {
            status: None,
            detail: format!(
                "job {job_id} failed: {}",
                detail.as_deref().unwrap_or("no detail provided")
            ),
        }
        .into()),
        PollOutcome::JobNotFound { job_id } => Err(CurationError::JobNotFound { job_id }.into()),
        PollOutcome::Cancelled => {
            info!(job_id = %search.job_id, "stopped following sourcing job");
            Ok(())
        }
    }
}

fn print_progress(snapshot: &JobSnapshot) {
    println!(
        "[{}] {} candidates so far (observed {})",
        snapshot.status,
        snapshot.candidate_count,
        snapshot.observed_at.format("%H:%M:%S")
    );
}

fn age(created_at: Option<NaiveDateTime>) -> String {
    let Some(created_at) = created_at else {
        return "-".to_string();
    };
    let elapsed = Utc::now().naive_utc() - created_at;
    if elapsed.num_days() > 0 {
        format!("{}d ago", elapsed.num_days())
    } else if elapsed.num_hours() > 0 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}m ago", elapsed.num_minutes().max(0))
    }
}

fn job_line(job: &SourcingJob) -> String {
    format!(
        "{:<26} {:<10} {:>4}  {:<8} {}",
        job.job_id.as_str(),
        job.status.label(),
        job.candidate_count,
        age(job.created_at),
        job.display_title()
    )
}

pub(crate) async fn run_jobs(config: &AppConfig, args: ListArgs) -> Result<(), AppError> {
    let facade = build_facade(&config.sourcing)?;
    let jobs = facade.list_jobs().await?;
    if args.json {
        println!("{}", to_json(&jobs)?);
        return Ok(());
    }
    for job in &jobs {
        println!("{}", job_line(job));
    }
    Ok(())
}

fn group_lines(groups: &[JobGroup]) -> Vec<String> {
    let mut lines = Vec::new();
    for group in groups {
        lines.push(format!("{} ({})", group.title, group.candidates.len()));
        for record in &group.candidates {
            let rank = record
                .rank
                .map_or_else(|| "-".to_string(), |rank| rank.to_string());
            let marker = if record.hired { " [hired]" } else { "" };
            lines.push(format!(
                "  {rank:>3}. {}{marker}  {}",
                record.name.as_deref().unwrap_or("(unnamed)"),
                record.candidate_link
            ));
        }
    }
    lines
}

pub(crate) async fn run_groups(config: &AppConfig, args: ListArgs) -> Result<(), AppError> {
    let facade = build_facade(&config.sourcing)?;
    let groups = facade.load_groups().await?;
    if args.json {
        println!("{}", to_json(&groups)?);
        return Ok(());
    }
    for line in group_lines(&groups) {
        println!("{line}");
    }
    Ok(())
}

pub(crate) async fn run_export(config: &AppConfig, args: ExportArgs) -> Result<(), AppError> {
    let facade = build_facade(&config.sourcing)?;
    let groups = facade.load_groups().await?;
    match args.output {
        Some(path) => {
            write_groups_csv(&groups, File::create(&path)?)?;
            info!(path = %path.display(), groups = groups.len(), "exported saved candidates");
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            write_groups_csv(&groups, &mut handle)?;
            handle.flush()?;
        }
    }
    Ok(())
}

pub(crate) async fn run_attach_resume(
    config: &AppConfig,
    args: AttachResumeArgs,
) -> Result<(), AppError> {
    let facade = build_facade(&config.sourcing)?;
    let bytes = tokio::fs::read(&args.path).await?;
    let file_name = args
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "resume".to_string());
    let content_type = mime_guess::from_path(&args.path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    let upload = ResumeUpload {
        job_id: JobId(args.job_id),
        candidate_link: args.candidate_link,
        file_name,
        content_type,
        bytes,
    };
    let task = facade.attach_resume(upload)?;
    task.await
        .map_err(|err| AppError::Io(io::Error::new(io::ErrorKind::Other, err)))?;
    println!("resume submitted for upload");
    Ok(())
}
