use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use emotion_classifier::artifact;
use emotion_classifier::audio::{decoder, encoder};
use emotion_classifier::dataset::SplitMode;
use emotion_classifier::training::{self, SequenceArchitecture, SequenceModel};
use emotion_classifier::{AudioData, AugmentConfig, Augmentor, DatasetBuilder, PipelineConfig, Predictor};

/// Speech emotion classifier - train and apply emotion models on short voice clips
#[derive(Parser, Debug)]
#[command(name = "emotion-classifier")]
#[command(version = "0.1.0")]
#[command(about = "Train and apply speech emotion classifiers", long_about = None)]
struct Cli {
    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grid-search and train the pooled-feature perceptron
    TrainMlp(TrainArgs),
    /// Train the convolution + LSTM model on MFCC sequences
    TrainSeq(TrainArgs),
    /// Classify clips with a saved model
    Predict {
        /// Directory written by train-mlp or train-seq
        #[arg(long, value_name = "DIR")]
        model: PathBuf,

        #[arg(value_name = "CLIP", required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Write the noisy and shifted variants of one clip for listening checks
    AugmentPreview {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(value_name = "OUTPUT_DIR")]
        output_dir: PathBuf,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = 0.005)]
        noise_factor: f32,

        #[arg(long, default_value_t = 0.2)]
        shift_max_fraction: f64,
    },
}

#[derive(Args, Debug, Default)]
struct TrainArgs {
    /// JSON pipeline configuration; flags below override its fields
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Corpus root directory (repeatable)
    #[arg(long = "root", value_name = "DIR")]
    roots: Vec<PathBuf>,

    /// Add a noisy and a shifted copy of every clip
    #[arg(long)]
    augment: bool,

    /// Split augmented examples independently instead of by source clip
    #[arg(long)]
    by_example: bool,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    max_len: Option<usize>,

    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
}

impl TrainArgs {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("Failed to load config {:?}", path))?,
            None => PipelineConfig::default(),
        };
        self.apply_overrides(&mut config);
        config.validate().context("Configuration validation failed")?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut PipelineConfig) {
        if !self.roots.is_empty() {
            config.dataset.roots = self.roots.clone();
        }
        if self.augment && config.dataset.augmentation.is_none() {
            config.dataset.augmentation = Some(AugmentConfig::default());
        }
        if self.by_example {
            config.dataset.split.mode = SplitMode::ByExample;
        }
        if let Some(seed) = self.seed {
            config.dataset.split.seed = seed;
            config.search.seed = seed;
            config.training.seed = seed;
        }
        if let Some(epochs) = self.epochs {
            config.training.epochs = epochs;
        }
        if let Some(max_len) = self.max_len {
            config.sequence.max_len = max_len;
        }
        if self.output.is_some() {
            config.output = self.output.clone();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Command::TrainMlp(args) => train_mlp(&args.pipeline_config()?),
        Command::TrainSeq(args) => train_seq(&args.pipeline_config()?),
        Command::Predict { model, inputs } => predict(&model, &inputs),
        Command::AugmentPreview {
            input,
            output_dir,
            seed,
            noise_factor,
            shift_max_fraction,
        } => augment_preview(
            &input,
            &output_dir,
            seed,
            AugmentConfig {
                noise_factor,
                shift_max_fraction,
                ..AugmentConfig::default()
            },
        ),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn train_mlp(config: &PipelineConfig) -> Result<()> {
    let builder = DatasetBuilder::new(config.dataset.clone())?;
    let split = builder
        .load_pooled(config.pooled)
        .context("Failed to build pooled dataset")?;

    let outcome = training::train_classical(&split, &config.dataset.spectral, config.pooled, &config.search)
        .context("Classical training failed")?;
    println!(
        "Best parameters: {} (cv accuracy {:.4})",
        outcome.search.best, outcome.search.best_score
    );
    println!("{}", outcome.report);

    if let Some(dir) = &config.output {
        artifact::save_classical(&outcome.model, dir)
            .with_context(|| format!("Failed to save model to {:?}", dir))?;
        println!("Saved model to {:?}", dir);
    }
    Ok(())
}

fn train_seq(config: &PipelineConfig) -> Result<()> {
    let builder = DatasetBuilder::new(config.dataset.clone())?;
    let split = builder
        .load_sequences(config.sequence.n_mfcc, config.sequence.max_len)
        .context("Failed to build sequence dataset")?;

    let architecture = SequenceArchitecture::new(
        config.sequence.n_mfcc,
        config.sequence.max_len,
        split.encoder.num_classes(),
    );
    let mut model = SequenceModel::new(architecture, config.training.seed)?;
    let history = model
        .fit(&split.train, &split.test, &config.training)
        .context("Sequence training failed")?;
    info!(
        epochs = history.epochs_run(),
        best_epoch = history.best_epoch,
        stopped_early = history.stopped_early,
        "sequence training finished"
    );

    let report = model.evaluate(&split.test, &split.encoder)?;
    println!("{}", report);

    if let Some(dir) = &config.output {
        artifact::save_sequence(&model, &split.encoder, &config.dataset.spectral, dir)
            .with_context(|| format!("Failed to save model to {:?}", dir))?;
        println!("Saved model to {:?}", dir);
    }
    Ok(())
}

fn predict(model_dir: &Path, inputs: &[PathBuf]) -> Result<()> {
    let predictor = Predictor::load(model_dir)
        .with_context(|| format!("Failed to load model from {:?}", model_dir))?;
    info!(kind = ?predictor.kind(), classes = predictor.encoder().num_classes(), "model loaded");
    for input in inputs {
        let label = predictor
            .predict(input)
            .with_context(|| format!("Failed to classify {:?}", input))?;
        println!("{}\t{}", input.display(), label);
    }
    Ok(())
}

fn augment_preview(input: &Path, output_dir: &Path, seed: u64, config: AugmentConfig) -> Result<()> {
    ensure!(input.is_file(), "Input path is not a file: {:?}", input);
    let audio = decoder::decode_audio(input).context("Failed to decode input audio")?;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("clip");
    let mut augmentor = Augmentor::new(config, seed);
    let variants = [
        ("noise", augmentor.noisy(&audio.samples)),
        ("shift", augmentor.shifted(&audio.samples)),
    ];
    for (suffix, samples) in variants {
        let path = output_dir.join(format!("{stem}_{suffix}.wav"));
        encoder::write_wav(&AudioData::new(samples, audio.sample_rate), &path)
            .with_context(|| format!("Failed to write {:?}", path))?;
        println!("Wrote {:?}", path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_train_subcommand_with_repeated_roots() {
        let cli = Cli::try_parse_from([
            "emotion-classifier",
            "train-seq",
            "--root",
            "a",
            "--root",
            "b",
            "--augment",
            "--epochs",
            "3",
        ])
        .unwrap();
        let Command::TrainSeq(args) = cli.command else {
            panic!("expected train-seq");
        };
        assert_eq!(args.roots, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert!(args.augment);
        assert_eq!(args.epochs, Some(3));
    }

    #[test]
    fn predict_requires_an_input() {
        assert!(Cli::try_parse_from(["emotion-classifier", "predict", "--model", "m"]).is_err());
    }

    #[test]
    fn overrides_replace_config_fields() {
        let args = TrainArgs {
            roots: vec![PathBuf::from("corpus")],
            augment: true,
            by_example: true,
            seed: Some(7),
            max_len: Some(64),
            ..TrainArgs::default()
        };
        let mut config = PipelineConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.dataset.roots, vec![PathBuf::from("corpus")]);
        assert!(config.dataset.augmentation.is_some());
        assert_eq!(config.dataset.split.mode, SplitMode::ByExample);
        assert_eq!(config.training.seed, 7);
        assert_eq!(config.search.seed, 7);
        assert_eq!(config.sequence.max_len, 64);
        assert!(config.validate().is_ok());
    }
}
