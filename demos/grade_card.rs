//! Command-line interface for card_grader
//!
//! Grades a card from a front photo and an optional back photo. The full
//! report goes to stdout as JSON; a human summary goes to stderr.

use card_grader::image_loader::load_image_oriented;
use card_grader::{CardGrader, GradeReport, GradingConfig, SideReport};
use clap::Parser;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "grade_card")]
#[command(about = "Estimate the condition grade of a trading card from photos")]
struct Cli {
    /// Photo of the card front.
    front: PathBuf,

    /// Photo of the card back.
    #[arg(long)]
    back: Option<PathBuf>,

    /// Calibration JSON (see the generate_config example).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print only the grade, not the per-side measurements.
    #[arg(long)]
    grade_only: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match GradingConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config file: {}", e);
                process::exit(1);
            }
        },
        None => GradingConfig::default(),
    };

    let grader = match CardGrader::new(config) {
        Ok(grader) => grader,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let result = load_image_oriented(&cli.front).and_then(|front| {
        let back = cli.back.as_deref().map(load_image_oriented).transpose()?;
        grader.grade_image(&front, back.as_ref())
    });

    match result {
        Ok(report) => print_report(&report, cli.grade_only),
        Err(error) => {
            eprintln!("Grading failed: {}", error);
            if error.is_recoverable() {
                eprintln!("Suggestion: {}", error.user_message());
            }
            process::exit(1);
        }
    }
}

fn print_report(report: &GradeReport, grade_only: bool) {
    let json = if grade_only {
        serde_json::to_string_pretty(&report.grade)
    } else {
        serde_json::to_string_pretty(report)
    };
    match json {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing report: {}", e),
    }

    let grade = &report.grade;
    eprintln!();
    eprintln!("Card Grade Summary:");
    eprintln!("  Grade: {} (range {})", grade.grade_label, grade.grade_range);
    eprintln!("  Score: {:.1} (weighted {:.2})", grade.final_score, grade.weighted_score);
    eprintln!(
        "  Centering {:.1}  Corners {:.1}  Edges {:.1}  Surface {:.1}",
        grade.sub_scores.centering.score,
        grade.sub_scores.corners.score,
        grade.sub_scores.edges.score,
        grade.sub_scores.surface.score
    );
    eprintln!(
        "  Confidence: {:.0}% ({})",
        grade.overall_confidence * 100.0,
        grade.confidence_level
    );
    print_side("Front", &report.front);
    if let Some(back) = &report.back {
        print_side("Back", back);
    }

    for explanation in &grade.explanations {
        eprintln!("  - {}", explanation);
    }
    for warning in &grade.warnings {
        eprintln!("  Warning: {}", warning);
    }
    for recommendation in &grade.recommendations {
        eprintln!("  Tip: {}", recommendation);
    }
}

fn print_side(name: &str, side: &SideReport) {
    let method = side
        .detection
        .method
        .map_or_else(|| "not found".to_string(), |m| m.to_string());
    eprintln!(
        "  {}: detection {} ({:.0}%), capture quality {}",
        name,
        method,
        side.detection.confidence * 100.0,
        side.quality.level
    );
}
