//! StoryReel CLI
//!
//! Headless front end for planning script-to-clip runs: segment a script,
//! price the resulting plan, and manage settings.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

use storyreel_lib::core::{
    ai::LlmCapability,
    cost::{CostBreakdown, CreditGate, FeatureSet},
    segmentation::{SegmentationEngine, SegmentationMode, SegmentationResult},
    segments::SegmentCollection,
    settings::{AppSettings, SettingsManager},
};

#[derive(Parser, Debug)]
#[command(name = "storyreel", version, about = "Plan and price script-to-clip generation runs")]
struct Cli {
    /// Settings directory (defaults to the platform config directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a script into clip segments.
    Segment(SegmentArgs),
    /// Price a segmented script and check it against the credit balance.
    Estimate(EstimateArgs),
    /// Show or reset settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Script text file
    script: PathBuf,

    /// Segmentation mode (evenSplit, duration, ai, hybrid)
    #[arg(long, value_parser = parse_mode)]
    mode: Option<SegmentationMode>,

    /// Maximum number of segments
    #[arg(long)]
    max_segments: Option<usize>,

    /// Target seconds per segment
    #[arg(long)]
    target_duration: Option<f64>,
}

#[derive(Parser, Debug)]
struct SegmentArgs {
    #[command(flatten)]
    plan: PlanArgs,

    /// Print the full result as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Parser, Debug)]
struct EstimateArgs {
    #[command(flatten)]
    plan: PlanArgs,

    /// Segment indexes (0-based) to leave out of the run
    #[arg(long = "disable")]
    disable: Vec<usize>,

    /// Billed features (defaults to the configured ones)
    #[arg(long, value_enum, value_delimiter = ',')]
    features: Option<Vec<Feature>>,

    /// Print the breakdown as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Print the settings file path
    Path,
    /// Delete the settings file and print the defaults
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Feature {
    Enhancement,
    Continuity,
    Camera,
    Lighting,
}

fn parse_mode(value: &str) -> Result<SegmentationMode, String> {
    value.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    storyreel_lib::init_logging(cli.log_dir.as_deref(), cli.verbose);

    let manager = match &cli.config_dir {
        Some(dir) => SettingsManager::new(dir.clone()),
        None => SettingsManager::for_user().context("resolve settings directory")?,
    };

    match cli.cmd {
        Command::Segment(args) => cmd_segment(&manager, args).await,
        Command::Estimate(args) => cmd_estimate(&manager, args).await,
        Command::Config { action } => cmd_config(&manager, action),
    }
}

async fn cmd_segment(manager: &SettingsManager, args: SegmentArgs) -> anyhow::Result<()> {
    let settings = manager.load();
    let result = plan(&settings, &args.plan).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    for segment in &result.segments {
        println!(
            "[{:>3}] {:>5.1}s  {}",
            segment.order,
            segment.duration,
            segment.text.replace('\n', " / ")
        );
    }
    for warning in &result.warnings {
        eprintln!("warning: {}", warning.message);
    }
    eprintln!(
        "{} segments, {:.1}s total ({} mode{})",
        result.segments.len(),
        result.segments.iter().map(|s| s.duration).sum::<f64>(),
        result.metadata.effective_mode.as_str(),
        if result.metadata.fell_back {
            ", fallback"
        } else {
            ""
        }
    );
    Ok(())
}

async fn cmd_estimate(manager: &SettingsManager, args: EstimateArgs) -> anyhow::Result<()> {
    let settings = manager.load();
    let result = plan(&settings, &args.plan).await?;

    let mut collection =
        SegmentCollection::from_segments(result.segments).context("build segment collection")?;
    for index in &args.disable {
        let id = collection
            .get_at(*index)
            .map(|s| s.id.clone())
            .with_context(|| format!("no segment at index {index}"))?;
        collection.set_enabled(&id, false)?;
    }

    let features = match &args.features {
        Some(list) => feature_set(list),
        None => settings.feature_set(),
    };
    let breakdown = CostBreakdown::for_collection(&collection, features);
    let gate = CreditGate {
        balance: settings.billing.credit_balance,
        unlimited: settings.billing.unlimited,
    };
    let affordable = gate.check(&breakdown).is_ok();

    if args.json {
        let out = serde_json::json!({
            "breakdown": breakdown,
            "balance": gate.balance,
            "unlimited": gate.unlimited,
            "affordable": affordable,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "Segments:   {} enabled of {}",
        breakdown.segment_count,
        collection.len()
    );
    println!("Duration:   {:.1}s", breakdown.total_duration_sec);
    println!("Base:       {} credits", breakdown.base_tokens);
    println!("Surcharge:  {} credits", breakdown.surcharge_tokens);
    println!(
        "Total:      {} credits (x{:.2})",
        breakdown.total_tokens, breakdown.multiplier
    );
    println!("Price:      {}", breakdown.price_display());
    if gate.unlimited {
        println!("Balance:    unlimited");
    } else {
        println!(
            "Balance:    {} credits ({})",
            gate.balance,
            if affordable { "affordable" } else { "insufficient" }
        );
    }
    Ok(())
}

fn cmd_config(manager: &SettingsManager, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = manager.load();
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        ConfigAction::Path => {
            println!("{}", manager.settings_path().display());
        }
        ConfigAction::Reset => {
            let settings = manager.reset()?;
            eprintln!("reset {}", manager.settings_path().display());
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }
    Ok(())
}

/// Segments the script with settings plus command line overrides
async fn plan(settings: &AppSettings, args: &PlanArgs) -> anyhow::Result<SegmentationResult> {
    let script = read_script(&args.script)?;

    let mut options = settings.segmentation_options();
    if let Some(mode) = args.mode {
        options.mode = mode;
    }
    if let Some(max) = args.max_segments {
        options.constraints.max_segments = max;
    }
    if let Some(target) = args.target_duration {
        options.constraints.target_duration = target;
    }
    debug!("Segmenting {} with {:?}", args.script.display(), options);

    // No LLM backend is wired into the CLI; AI modes take the deterministic path.
    let llm = LlmCapability::unavailable("no LLM provider configured");
    let engine = SegmentationEngine::new(settings.llm_options());
    Ok(engine.segment(&script, &options, &llm).await)
}

fn read_script(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read script '{}'", path.display()))
}

fn feature_set(features: &[Feature]) -> FeatureSet {
    FeatureSet {
        enhancement: features.contains(&Feature::Enhancement),
        continuity: features.contains(&Feature::Continuity),
        camera_direction: features.contains(&Feature::Camera),
        lighting: features.contains(&Feature::Lighting),
    }
}
