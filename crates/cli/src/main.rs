use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gen_pipeline::candidate::{self, UploadCandidate};
use gen_pipeline::dashboard::{filter_groups, SearchField};
use gen_pipeline::{ApiClient, ApiEnv, Orchestrator, PipelineConfig, SubmitOptions};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "genconsole")]
#[command(about = "Admin console for the image-generation service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Target environment (dev, staging, prod)
    #[arg(short, long, global = true, default_value = "dev")]
    env: String,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit images for processing and wait for the results
    Process {
        /// Image files to upload
        files: Vec<PathBuf>,

        /// Upload every image directly inside a directory
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Prefill image URLs to fetch and upload (repeatable)
        #[arg(long)]
        url: Vec<String>,

        /// Generation prompt
        #[arg(short, long)]
        prompt: String,

        /// Raw height input per image (repeatable)
        #[arg(long)]
        height: Vec<f64>,
    },

    /// List recent job groups
    Groups {
        /// Maximum number of groups to fetch
        #[arg(short, long, default_value = "50")]
        limit: u32,

        /// Filter query applied client-side
        #[arg(short, long)]
        search: Option<String>,

        /// Field to search (prompt, group_id, user_email)
        #[arg(long, default_value = "user_email")]
        search_field: String,

        /// Print raw JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Show collected user feedback
    Feedback,

    /// Re-run generation for an existing group
    Reprocess {
        /// Group id
        group_id: String,
    },

    /// Delete a group
    Delete {
        /// Group id
        group_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    let env: ApiEnv = cli.env.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let config = PipelineConfig::from_env(env).context("incomplete environment configuration")?;

    match cli.command {
        Commands::Process {
            files,
            dir,
            url,
            prompt,
            height,
        } => process_command(config, files, dir, url, prompt, height).await,
        Commands::Groups {
            limit,
            search,
            search_field,
            json,
        } => groups_command(config, limit, search, search_field, json).await,
        Commands::Feedback => feedback_command(config).await,
        Commands::Reprocess { group_id } => reprocess_command(config, group_id).await,
        Commands::Delete { group_id } => delete_command(config, group_id).await,
    }
}

async fn process_command(
    config: PipelineConfig,
    files: Vec<PathBuf>,
    dir: Option<PathBuf>,
    urls: Vec<String>,
    prompt: String,
    heights: Vec<f64>,
) -> Result<()> {
    let client = ApiClient::new(&config);

    let mut candidates: Vec<UploadCandidate> = candidate::from_paths(&files)?;
    if let Some(dir) = dir {
        candidates.extend(candidate::from_directory(&dir)?);
    }
    if !urls.is_empty() {
        let prefill = candidate::from_prefill_urls(client.http(), &urls).await;
        if prefill.skipped > 0 {
            warn!(
                "{} of {} prefill images could not be fetched and were skipped",
                prefill.skipped,
                urls.len()
            );
        }
        candidates.extend(prefill.candidates);
    }

    if candidates.is_empty() {
        bail!("no images to upload; pass files, --dir or --url");
    }
    info!("Submitting {} image(s) to {}", candidates.len(), config.env);

    let orchestrator = Orchestrator::new(client, config);
    let outcome = orchestrator
        .submit(candidates, SubmitOptions { prompt, heights })
        .await?;

    println!("Group {} finished", outcome.group_id);
    for url in &outcome.output_urls {
        println!("{url}");
    }
    println!();
    for timing in &outcome.timings {
        println!("{:<22} {:>8.2}s", timing.step, timing.elapsed_secs);
    }
    Ok(())
}

async fn groups_command(
    config: PipelineConfig,
    limit: u32,
    search: Option<String>,
    search_field: String,
    json: bool,
) -> Result<()> {
    let client = ApiClient::new(&config);
    let mut groups = client.list_groups(limit).await?;

    if let Some(query) = search {
        let field: SearchField = search_field.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        groups = filter_groups(groups, &query, field);
    }

    if json {
        let rows: Vec<serde_json::Value> = groups
            .iter()
            .map(|group| {
                serde_json::json!({
                    "group_id": group.group_id.to_string(),
                    "created_at": group.created_at,
                    "user_email": group.user_email,
                    "inputs": group.input_count,
                    "outputs": group.output_count,
                    "prompt": group.prompt(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if groups.is_empty() {
        println!("No groups found");
        return Ok(());
    }
    for group in &groups {
        println!(
            "#{:<8} {:<28} in:{:<3} out:{:<3} {}",
            group.group_id.to_string(),
            group.user_email.as_deref().unwrap_or("-"),
            group.input_count,
            group.output_count,
            group.prompt().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn feedback_command(config: PipelineConfig) -> Result<()> {
    let client = ApiClient::new(&config);
    let feedback = client.list_feedback().await?;

    if feedback.is_empty() {
        println!("No feedback available");
        return Ok(());
    }
    for (group_id, generations) in &feedback {
        for (generation_id, entries) in generations {
            for entry in entries {
                println!(
                    "group {group_id} gen {generation_id}: {} {} ({}) {}",
                    entry.user_email.as_deref().unwrap_or("-"),
                    entry.rating.as_deref().unwrap_or("-"),
                    entry.stars.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
                    entry.text_feedback.as_deref().unwrap_or(""),
                );
            }
        }
    }
    Ok(())
}

async fn reprocess_command(config: PipelineConfig, group_id: String) -> Result<()> {
    let client = ApiClient::new(&config);
    client.reprocess_group(&group_id).await?;
    info!("Reprocessing requested for group {}", group_id);
    Ok(())
}

async fn delete_command(config: PipelineConfig, group_id: String) -> Result<()> {
    let client = ApiClient::new(&config);
    client.delete_group(&group_id).await?;
    info!("Deleted group {}", group_id);
    Ok(())
}
