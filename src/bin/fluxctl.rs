use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};

use runpod_flux::output::{decode, save_images, truncate_for_display};
use runpod_flux::runpod::client::{DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL};
use runpod_flux::workflow::params::DEFAULT_NEGATIVE;
use runpod_flux::workflow::prepare;
use runpod_flux::{Config, GenerationMode, GenerationParams, JobResult, RunPodClient};

#[derive(Parser, Debug)]
#[command(name = "fluxctl", about = "CLI for FLUX generation on RunPod", version)]
struct Cli {
    /// Override RUNPOD_ENDPOINT_ID
    #[arg(global = true, long)]
    endpoint_id: Option<String>,

    /// Override RUNPOD_API_BASE
    #[arg(global = true, long)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an image from a text prompt
    Generate {
        /// The text prompt for image generation
        prompt: String,
        /// Negative prompt
        #[arg(long, short = 'n', default_value = DEFAULT_NEGATIVE)]
        negative: String,
        /// Number of sampling steps
        #[arg(long, short = 's', default_value_t = 28)]
        steps: u32,
        /// CFG scale (FLUX works best with 1.0)
        #[arg(long, short = 'c', default_value_t = 1.0)]
        cfg: f64,
        /// Image width
        #[arg(long, short = 'w', default_value_t = 1280)]
        width: u32,
        /// Image height
        #[arg(long, default_value_t = 1280)]
        height: u32,
        /// Random seed (defaults to time-based)
        #[arg(long)]
        seed: Option<i64>,
        /// Submit asynchronously and poll for completion
        #[arg(long)]
        run_async: bool,
        /// Output directory (defaults to OUTPUT_DIR)
        #[arg(long, value_name = "PATH")]
        out_dir: Option<PathBuf>,
        /// Verbose: print the constructed workflow before sending
        #[arg(short, long)]
        verbose: bool,
    },
    /// Generate an image from a source image plus a text prompt
    Img2img {
        /// The text prompt for image generation
        prompt: String,
        /// Path to the source image
        #[arg(long, short = 'i', value_name = "PATH")]
        image: PathBuf,
        /// Negative prompt
        #[arg(long, short = 'n', default_value = "blurry, low quality, distorted")]
        negative: String,
        /// Denoising strength 0.0-1.0
        #[arg(long, default_value_t = 0.75)]
        strength: f64,
        /// Number of sampling steps
        #[arg(long, short = 's', default_value_t = 28)]
        steps: u32,
        /// CFG scale
        #[arg(long, short = 'c', default_value_t = 1.0)]
        cfg: f64,
        /// Random seed (defaults to time-based)
        #[arg(long)]
        seed: Option<i64>,
        /// Output directory (defaults to OUTPUT_DIR)
        #[arg(long, value_name = "PATH")]
        out_dir: Option<PathBuf>,
        /// Verbose: print the constructed workflow before sending
        #[arg(short, long)]
        verbose: bool,
    },
    /// Generate images for every prompt in a file (one per line)
    Batch {
        /// File with one prompt per line; blank lines and #-comments skipped
        #[arg(long, value_name = "PATH")]
        prompts_file: PathBuf,
        /// Negative prompt applied to all images
        #[arg(long, short = 'n', default_value = "blurry, low quality, distorted, ugly, bad anatomy")]
        negative: String,
        /// Number of sampling steps
        #[arg(long, short = 's', default_value_t = 20)]
        steps: u32,
        /// CFG scale
        #[arg(long, short = 'c', default_value_t = 3.5)]
        cfg: f64,
        /// Image width
        #[arg(long, short = 'w', default_value_t = 1024)]
        width: u32,
        /// Image height
        #[arg(long, default_value_t = 1024)]
        height: u32,
        /// Fan out async submissions before collecting results
        #[arg(long)]
        run_async: bool,
        /// Output directory (defaults to OUTPUT_DIR)
        #[arg(long, value_name = "PATH")]
        out_dir: Option<PathBuf>,
    },
    /// Check the status of an async job
    Status {
        /// Job ID returned by an async submission
        job_id: String,
    },
    /// Probe endpoint liveness
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    Config::dotenv_load();
    let cli = Cli::parse();

    let mut conf = match Config::new() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };
    if let Some(id) = cli.endpoint_id {
        conf.endpoint_id = id;
    }
    if let Some(base) = cli.api_base {
        conf.api_base = base;
    }

    let client = RunPodClient::with_base(&conf.api_base, conf.api_key.clone(), conf.endpoint_id.clone());

    match cli.command {
        Commands::Generate {
            prompt,
            negative,
            steps,
            cfg,
            width,
            height,
            seed,
            run_async,
            out_dir,
            verbose,
        } => {
            let params = GenerationParams {
                positive: prompt,
                negative,
                steps,
                cfg,
                width,
                height,
                seed,
                ..GenerationParams::default()
            };
            let (workflow, attachments) =
                prepare(GenerationMode::TextToImage, &params, Path::new(&conf.template_path)).await;
            if verbose {
                eprintln!("[verbose] Workflow:\n{}", serde_json::to_string_pretty(&workflow)?);
            }
            let response = if run_async {
                let handle = client.submit_async(&workflow, &attachments).await?;
                println!("Submitted job {}", handle.job_id);
                client
                    .wait_for_completion(&handle, DEFAULT_POLL_INTERVAL, DEFAULT_MAX_WAIT)
                    .await?
            } else {
                client.submit_sync(&workflow, &attachments).await?
            };
            let out = out_dir.unwrap_or_else(|| PathBuf::from(&conf.output_dir));
            finish(&response, &out, "flux_output").await
        }
        Commands::Img2img {
            prompt,
            image,
            negative,
            strength,
            steps,
            cfg,
            seed,
            out_dir,
            verbose,
        } => {
            let source = tokio::fs::read(&image).await.map_err(|e| {
                eprintln!("Error: cannot read source image {}: {e}", image.display());
                e
            })?;
            let params = GenerationParams {
                positive: prompt,
                negative,
                steps,
                cfg,
                seed,
                denoise: strength,
                source_image: Some(source),
                ..GenerationParams::default()
            };
            let (workflow, attachments) =
                prepare(GenerationMode::ImageToImage, &params, Path::new(&conf.template_path)).await;
            if verbose {
                eprintln!("[verbose] Workflow:\n{}", serde_json::to_string_pretty(&workflow)?);
            }
            let response = client.submit_sync(&workflow, &attachments).await?;
            let out = out_dir.unwrap_or_else(|| PathBuf::from(&conf.output_dir));
            finish(&response, &out, "flux_img2img").await
        }
        Commands::Batch {
            prompts_file,
            negative,
            steps,
            cfg,
            width,
            height,
            run_async,
            out_dir,
        } => {
            let prompts = read_prompts(&prompts_file).await?;
            if prompts.is_empty() {
                eprintln!("No prompts found in {}", prompts_file.display());
                std::process::exit(2);
            }
            println!("Generating {} images...", prompts.len());
            let out = out_dir.unwrap_or_else(|| PathBuf::from(&conf.output_dir));
            let template_path = conf.template_path.clone();
            let mut saved_total = 0usize;

            if run_async {
                // Fan out all submissions, then fan in on sequential poll loops.
                let mut handles = Vec::new();
                for prompt in &prompts {
                    let params = batch_params(prompt, &negative, steps, cfg, width, height);
                    let (workflow, attachments) =
                        prepare(GenerationMode::TextToImage, &params, Path::new(&template_path)).await;
                    match client.submit_async(&workflow, &attachments).await {
                        Ok(handle) => {
                            println!("Submitted job {} for prompt: {}", handle.job_id, preview(prompt));
                            handles.push(handle);
                        }
                        Err(e) => eprintln!("Error submitting '{}': {e}", preview(prompt)),
                    }
                }
                for handle in handles {
                    match client
                        .wait_for_completion(&handle, DEFAULT_POLL_INTERVAL, DEFAULT_MAX_WAIT)
                        .await
                    {
                        Ok(response) => {
                            let prefix = format!("batch_{}", handle.job_id);
                            saved_total += report(&response, &out, &prefix).await;
                        }
                        Err(e) => eprintln!("Error waiting for job {}: {e}", handle.job_id),
                    }
                }
            } else {
                for (idx, prompt) in prompts.iter().enumerate() {
                    println!("Processing prompt {}/{}: {}", idx + 1, prompts.len(), preview(prompt));
                    let params = batch_params(prompt, &negative, steps, cfg, width, height);
                    let (workflow, attachments) =
                        prepare(GenerationMode::TextToImage, &params, Path::new(&template_path)).await;
                    match client.submit_sync(&workflow, &attachments).await {
                        Ok(response) => {
                            let prefix = format!("batch_{idx:03}");
                            saved_total += report(&response, &out, &prefix).await;
                        }
                        Err(e) => eprintln!("Error generating '{}': {e}", preview(prompt)),
                    }
                }
            }

            println!("Batch complete: {} image(s) saved", saved_total);
            if saved_total == 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Status { job_id } => {
            let handle = runpod_flux::JobHandle {
                job_id,
                submitted_at: chrono::Utc::now(),
            };
            let status = client.check_status(&handle).await.map_err(|e| {
                eprintln!("Error: {e}");
                e
            })?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Commands::Health => {
            conf.print_summary();
            let health = client.health().await.map_err(|e| {
                eprintln!("Error: {e}");
                e
            })?;
            println!("{}", serde_json::to_string_pretty(&health)?);
            Ok(())
        }
    }
}

fn batch_params(
    prompt: &str,
    negative: &str,
    steps: u32,
    cfg: f64,
    width: u32,
    height: u32,
) -> GenerationParams {
    GenerationParams {
        positive: prompt.to_string(),
        negative: negative.to_string(),
        steps,
        cfg,
        width,
        height,
        ..GenerationParams::default()
    }
}

fn preview(prompt: &str) -> String {
    truncate_for_display(prompt, 50)
}

async fn read_prompts(path: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let data = tokio::fs::read_to_string(path).await?;
    Ok(data
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Decode a terminal response, persist any images, and report; exits
/// non-zero on failure outcomes.
async fn finish(response: &Value, out_dir: &Path, prefix: &str) -> Result<(), Box<dyn std::error::Error>> {
    match decode(response) {
        JobResult::Completed(images) if images.is_empty() => {
            eprintln!("No images generated");
            std::process::exit(1);
        }
        JobResult::Completed(images) => {
            let saved = save_images(&images, out_dir, prefix).await?;
            println!("Generated {} image(s):", saved.len());
            for path in saved {
                println!("  {}", path.display());
            }
            Ok(())
        }
        JobResult::Failed(message) => {
            eprintln!("Job failed: {}", truncate_for_display(&message, 200));
            std::process::exit(1);
        }
        JobResult::Unknown(payload) => {
            eprintln!("Unexpected status: {}", payload.get("status").unwrap_or(&Value::Null));
            eprintln!("{}", serde_json::to_string_pretty(&payload)?);
            std::process::exit(1);
        }
    }
}

/// Batch variant of [`finish`]: never exits, returns the number of images
/// saved so the driver can keep going.
async fn report(response: &Value, out_dir: &Path, prefix: &str) -> usize {
    match decode(response) {
        JobResult::Completed(images) => {
            if images.is_empty() {
                eprintln!("No images generated for {prefix}");
                return 0;
            }
            match save_images(&images, out_dir, prefix).await {
                Ok(saved) => {
                    for path in &saved {
                        println!("  Saved: {}", path.display());
                    }
                    saved.len()
                }
                Err(e) => {
                    eprintln!("Error saving images for {prefix}: {e}");
                    0
                }
            }
        }
        JobResult::Failed(message) => {
            eprintln!("Job failed for {prefix}: {}", truncate_for_display(&message, 200));
            0
        }
        JobResult::Unknown(payload) => {
            eprintln!(
                "Unexpected status for {prefix}: {}",
                payload.get("status").unwrap_or(&Value::Null)
            );
            0
        }
    }
}
