//! Generate the default calibration file
//!
//! Creates a JSON config with every grading parameter at its built-in value

use card_grader::GradingConfig;
use std::{env, path::Path, process};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <output_config.json>", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  {} calibration/default.json", args[0]);
        process::exit(1);
    }

    let output_path = Path::new(&args[1]);

    if let Some(parent) = output_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Error creating directory: {}", e);
            process::exit(1);
        }
    }

    let config = GradingConfig::default_calibration();

    match config.to_json_file(output_path) {
        Ok(_) => {
            let w = &config.scoring.weights;
            eprintln!("Configuration saved to {}", output_path.display());
            eprintln!();
            eprintln!("Config summary:");
            eprintln!(
                "  Weights: centering {:.0}%, corners {:.0}%, edges {:.0}%, surface {:.0}%",
                w.centering * 100.0,
                w.corners * 100.0,
                w.edges * 100.0,
                w.surface * 100.0
            );
            eprintln!(
                "  Detection: area {:.0}%-{:.0}%, aspect {:.2}-{:.2}",
                config.detection.min_area_ratio * 100.0,
                config.detection.max_area_ratio * 100.0,
                config.detection.min_aspect,
                config.detection.max_aspect
            );
            eprintln!(
                "  Fallback: below {:.0}% confidence, {} concurrent, {} ms timeout",
                config.fallback.confidence_threshold * 100.0,
                config.fallback.max_concurrent,
                config.fallback.timeout_ms
            );
            eprintln!(
                "  Rectified frame: {}x{}",
                config.rectification.width, config.rectification.height
            );
        }
        Err(e) => {
            eprintln!("Error saving config: {}", e);
            process::exit(1);
        }
    }
}
