mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dermis_core::{BgrFrame, FaceRect, SkinAnalyzer};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dermis", version, about = "Skin type and skin condition analysis")]
struct Cli {
    /// TOML configuration file (overrides DERMIS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train both classifiers on synthetic data and save them
    Train {
        /// Seed for data generation, splitting and the forests
        #[arg(long)]
        seed: Option<u64>,
        /// Number of synthetic samples to generate
        #[arg(long)]
        samples: Option<usize>,
    },
    /// Classify the skin in a face photo
    Analyze {
        image: PathBuf,
        /// Face box as x,y,width,height, fractional values allowed (default: whole image)
        #[arg(long, value_parser = parse_face, allow_hyphen_values = true)]
        face: Option<FaceRect>,
    },
    /// Print the feature vector of a face photo
    Features {
        image: PathBuf,
        /// Face box as x,y,width,height, fractional values allowed (default: whole image)
        #[arg(long, value_parser = parse_face, allow_hyphen_values = true)]
        face: Option<FaceRect>,
    },
    /// Show which models are loaded
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut analyzer_config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Train { seed, samples } => {
            if let Some(seed) = seed {
                analyzer_config.seed = seed;
            }
            if let Some(samples) = samples {
                analyzer_config.sample_count = samples;
            }
            let mut analyzer = SkinAnalyzer::open(analyzer_config);
            let report = analyzer.auto_train().context("training failed")?;

            for r in [
                analyzer.skin_type_classifier().report(),
                analyzer.skin_condition_classifier().report(),
            ]
            .into_iter()
            .flatten()
            {
                eprintln!("{r}");
            }
            print_json(&report)?;
            if !report.success {
                tracing::warn!("accuracy target not met; models were saved anyway");
            }
        }
        Commands::Analyze { image, face } => {
            let analyzer = SkinAnalyzer::open(analyzer_config);
            if !analyzer.is_ready() {
                anyhow::bail!("models are not trained; run `dermis train` first");
            }
            let frame = load_frame(&image)?;
            let face = face.unwrap_or_else(|| frame.full_rect());
            let analysis = analyzer.analyze(&frame, &[face])?;
            print_json(&analysis)?;
        }
        Commands::Features { image, face } => {
            let analyzer = SkinAnalyzer::open(analyzer_config);
            let frame = load_frame(&image)?;
            let face = face.unwrap_or_else(|| frame.full_rect());
            let features = analyzer.extract(&frame, &face);
            print_json(&serde_json::json!({
                "face": face,
                "features": features.as_slice(),
            }))?;
        }
        Commands::Status => {
            let analyzer = SkinAnalyzer::open(analyzer_config);
            print_json(&serde_json::json!({
                "model_dir": analyzer.config().model_dir,
                "ready": analyzer.is_ready(),
                "skin_type": analyzer.skin_type_classifier().info(),
                "skin_condition": analyzer.skin_condition_classifier().info(),
            }))?;
        }
    }

    Ok(())
}

fn load_frame(path: &Path) -> Result<BgrFrame> {
    BgrFrame::open(path).with_context(|| format!("loading image {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse a detector box `x,y,width,height`. Fractional and negative values
/// are accepted and clamped to the image origin.
fn parse_face(s: &str) -> Result<FaceRect, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid face rectangle {s:?}: {e}"))?;
    let &[x, y, width, height] = parts.as_slice() else {
        return Err(format!("expected x,y,width,height, got {s:?}"));
    };
    if !parts.iter().all(|v| v.is_finite()) {
        return Err(format!("face rectangle must be finite, got {s:?}"));
    }
    let face = FaceRect::from_box(x, y, width, height);
    if face.width == 0 || face.height == 0 {
        return Err("face rectangle must have non-zero size".to_string());
    }
    Ok(face)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_face() {
        assert_eq!(parse_face("10,20,30,40"), Ok(FaceRect::new(10, 20, 30, 40)));
        assert_eq!(parse_face(" 1, 2, 3, 4 "), Ok(FaceRect::new(1, 2, 3, 4)));
        assert!(parse_face("1,2,3").is_err());
        assert!(parse_face("1,2,0,4").is_err());
        assert!(parse_face("a,b,c,d").is_err());
        assert!(parse_face("1,2,inf,4").is_err());
        // detector boxes may be fractional or start left of the image
        assert_eq!(parse_face("10.4,20.6,30,40"), Ok(FaceRect::new(10, 21, 30, 40)));
        assert_eq!(parse_face("-1,2,3,4"), Ok(FaceRect::new(0, 2, 2, 4)));
        assert!(parse_face("-5,2,5,4").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["dermis", "analyze", "face.png", "--face", "1,2,3,4"]).unwrap();
        match cli.command {
            Commands::Analyze { image, face } => {
                assert_eq!(image, PathBuf::from("face.png"));
                assert_eq!(face, Some(FaceRect::new(1, 2, 3, 4)));
            }
            _ => panic!("expected analyze"),
        }

        let cli = Cli::try_parse_from(["dermis", "features", "face.png", "--face", "-3.5,0,40.5,40"]).unwrap();
        match cli.command {
            Commands::Features { face, .. } => assert_eq!(face, Some(FaceRect::new(0, 0, 37, 40))),
            _ => panic!("expected features"),
        }

        let cli = Cli::try_parse_from(["dermis", "train", "--seed", "7", "--config", "d.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("d.toml")));
        assert!(matches!(
            cli.command,
            Commands::Train {
                seed: Some(7),
                samples: None
            }
        ));
    }
}
