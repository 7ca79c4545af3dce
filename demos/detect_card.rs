//! Locate a card in a photo and save the rectified card
//!
//! Useful for checking detection on real photos before grading them. The
//! detection candidate is printed as JSON; the warped card is written as PNG.

use card_grader::image_loader::load_image_oriented;
use card_grader::{CardGrader, GradingConfig};
use clap::Parser;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "detect_card")]
#[command(about = "Detect the card boundary and write the rectified card")]
struct Cli {
    /// Photo containing one card.
    image: PathBuf,

    /// Where to write the rectified card (PNG).
    #[arg(long, default_value = "rectified.png")]
    out: PathBuf,

    /// Calibration JSON.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GradingConfig::from_json_file(path),
        None => Ok(GradingConfig::default()),
    };
    let grader = match config.and_then(CardGrader::new) {
        Ok(grader) => grader,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };

    let image = match load_image_oriented(&cli.image) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error loading image: {}", e);
            process::exit(1);
        }
    };

    let (candidate, card) = match grader.detect_and_rectify(&image) {
        Ok(Some(found)) => found,
        Ok(None) => {
            eprintln!("No card found in {}", cli.image.display());
            eprintln!("Suggestion: photograph the card flat against a plain, contrasting background");
            process::exit(2);
        }
        Err(e) => {
            eprintln!("Rectification failed: {}", e);
            process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&candidate) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing detection: {}", e),
    }

    if let Err(e) = card.image().save(&cli.out) {
        eprintln!("Error writing {}: {}", cli.out.display(), e);
        process::exit(1);
    }

    eprintln!();
    eprintln!("Detection Summary:");
    eprintln!("  Method: {}", candidate.method);
    eprintln!("  Confidence: {:.1}%", candidate.confidence * 100.0);
    if let Some(metrics) = &candidate.metrics {
        eprintln!(
            "  Area {:.1}%, aspect {:.3}, rectangularity {:.2}, solidity {:.2}",
            metrics.area_ratio * 100.0,
            metrics.aspect,
            metrics.rectangularity,
            metrics.solidity
        );
    }
    eprintln!("  Rectified card saved to {}", cli.out.display());
}
