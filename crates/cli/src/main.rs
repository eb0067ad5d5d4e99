//! CLI tool for generating PowerPoint decks from a topic.

mod pipeline;

use anyhow::{Context, Result};
use clap::Parser;
use pipeline::{default_output_path, load_replay_script, Pipeline};
use smartppt_core::{Outline, PipelineConfig};
use smartppt_planner::{CancellationToken, ModelClient, OpenAiClient, ScriptedModel};
use smartppt_pptx::read_presentation;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Generate a PowerPoint deck on a topic with a language model.
#[derive(Parser, Debug)]
#[command(name = "smartppt")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Presentation topic
    #[arg(required_unless_present_any = ["from_outline", "check_connection"])]
    topic: Option<String>,

    /// Number of slides to generate
    #[arg(short = 'n', long, default_value = "5", allow_negative_numbers = true)]
    slides: i64,

    /// Output file (default: <topic>.pptx in the current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pipeline configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// API key for the model service
    #[arg(long, env = "SMARTPPT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of an OpenAI-compatible service
    #[arg(long)]
    base_url: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Generation attempts before giving up
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Answer prompts from a file instead of calling the service
    #[arg(long, value_name = "FILE", conflicts_with = "from_outline")]
    replay: Option<PathBuf>,

    /// Render a previously saved outline without calling the model
    #[arg(long, value_name = "FILE")]
    from_outline: Option<PathBuf>,

    /// Save the validated outline as JSON
    #[arg(long, value_name = "FILE")]
    save_outline: Option<PathBuf>,

    /// Print a text preview of the outline
    #[arg(long)]
    preview: bool,

    /// Check that the model service answers, then exit
    #[arg(long)]
    check_connection: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling...");
            on_interrupt.cancel();
        }
    });

    match run(&args, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            match e.downcast_ref::<smartppt_core::Error>() {
                Some(domain) => eprintln!("{}", domain.user_message()),
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args, cancel: &CancellationToken) -> Result<()> {
    let config = load_config(args)?;

    if args.check_connection {
        return check_connection(args, &config).await;
    }

    let model = build_model(args, &config)?;
    let pipeline = Pipeline::new(model, &config);

    let (outline, document) = match &args.from_outline {
        Some(path) => {
            let outline = read_outline(path)?;
            let document = pipeline.render(&outline)?;
            (outline, document)
        }
        None => {
            let topic = args.topic.as_deref().unwrap_or_default();
            let generated = pipeline.generate(topic, args.slides, cancel).await?;
            (generated.outline, generated.document)
        }
    };

    if let Some(path) = &args.save_outline {
        let json = serde_json::to_string_pretty(&outline).context("Failed to serialize outline")?;
        write_output(path, json.as_bytes())?;
        if args.verbose {
            eprintln!("Outline saved to: {}", path.display());
        }
    }

    if args.preview {
        print!("{}", outline.to_preview());
    }

    for warning in document.warnings() {
        eprintln!("Warning: {}", warning);
    }

    let output_path = get_output_path(args, &outline);
    write_output(&output_path, document.as_bytes())?;
    eprintln!(
        "Wrote {} slides to {}",
        document.slide_count(),
        output_path.display()
    );

    if args.verbose {
        let slides = read_presentation(document.as_bytes())
            .map_err(|e| anyhow::anyhow!("{}", e))
            .context("Failed to read back the written deck")?;
        for slide in slides {
            eprintln!(
                "  {:>2}. {} ({} paragraphs)",
                slide.number,
                slide.title,
                slide.paragraphs.len()
            );
        }
    }

    Ok(())
}

/// Load the config file, if any, and apply command line overrides.
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path).map_err(smartppt_core::Error::from)?,
        None => PipelineConfig::default(),
    };
    apply_overrides(&mut config, args);
    Ok(config)
}

fn apply_overrides(config: &mut PipelineConfig, args: &Args) {
    if let Some(base_url) = &args.base_url {
        config.model.base_url = base_url.clone();
    }
    if let Some(model) = &args.model {
        config.model.model = model.clone();
    }
    if let Some(attempts) = args.max_attempts {
        config.planner = config.planner.with_max_attempts(attempts);
    }
}

fn build_model(args: &Args, config: &PipelineConfig) -> Result<Arc<dyn ModelClient>> {
    if let Some(path) = &args.replay {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let script = load_replay_script(&text);
        log::debug!("Replaying {} canned response(s) from {}", script.len(), path.display());
        return Ok(Arc::new(ScriptedModel::new(script.into_iter().map(Ok))));
    }

    let client = OpenAiClient::new(config.model.clone(), args.api_key.clone())
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(Arc::new(client))
}

async fn check_connection(args: &Args, config: &PipelineConfig) -> Result<()> {
    let client = OpenAiClient::new(config.model.clone(), args.api_key.clone())
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    eprintln!("Checking {} ...", client.endpoint());

    let reply = client
        .check_connection()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Connection check failed")?;
    println!("Connected to {} (model replied: {})", config.model.base_url, reply);
    Ok(())
}

/// Read an outline saved with `--save-outline`.
fn read_outline(path: &Path) -> Result<Outline> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read outline {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid outline file {}", path.display()))
}

/// Determine where to write the deck.
fn get_output_path(args: &Args, outline: &Outline) -> PathBuf {
    if let Some(path) = &args.output {
        return path.clone();
    }
    let stem_source = args
        .topic
        .as_deref()
        .or_else(|| outline.slides().first().map(|s| s.text.as_str()))
        .unwrap_or_default();
    default_output_path(stem_source)
}

/// Write output to a file.
fn write_output(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;

    file.write_all(content)
        .with_context(|| format!("Failed to write to {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_and_override_config() {
        let args = Args::try_parse_from([
            "smartppt",
            "Ocean Conservation",
            "-n",
            "7",
            "--model",
            "qwen-plus",
            "--max-attempts",
            "0",
        ])
        .unwrap();
        assert_eq!(args.slides, 7);

        let mut config = PipelineConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.model.model, "qwen-plus");
        assert_eq!(config.planner.max_attempts, 1);
        assert_eq!(config.model.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_topic_required_unless_rendering_saved_outline() {
        assert!(Args::try_parse_from(["smartppt"]).is_err());
        assert!(Args::try_parse_from(["smartppt", "--from-outline", "deck.json"]).is_ok());
        assert!(Args::try_parse_from(["smartppt", "--check-connection"]).is_ok());
    }

    #[test]
    fn test_negative_slide_count_reaches_validation() {
        let args = Args::try_parse_from(["smartppt", "Ocean", "-n", "-3"]).unwrap();
        assert_eq!(args.slides, -3);
    }

    #[test]
    fn test_output_path_prefers_flag_then_topic() {
        let outline: Outline =
            serde_json::from_str(r#"[{"kind": "title", "text": "Saved Deck"}]"#).unwrap();

        let args = Args::try_parse_from(["smartppt", "Ocean", "-o", "out/deck.pptx"]).unwrap();
        assert_eq!(get_output_path(&args, &outline), PathBuf::from("out/deck.pptx"));

        let args = Args::try_parse_from(["smartppt", "Ocean"]).unwrap();
        assert_eq!(get_output_path(&args, &outline), PathBuf::from("Ocean.pptx"));

        let args = Args::try_parse_from(["smartppt", "--from-outline", "x.json"]).unwrap();
        assert_eq!(get_output_path(&args, &outline), PathBuf::from("Saved Deck.pptx"));
    }
}
