use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::Context;
use burn::backend::NdArray;
use clap::Parser;
use gmachine_runtime::{
    BatchSize, BurnMachine, CreateMode, Feeding, Field, FieldSelection, InferConfig, InferResult,
    Inference, ParameterKind, Parameters, Sample,
};

use super::describe::load_model_config;

type Backend = NdArray<f32>;

#[derive(Parser, Debug)]
pub struct InferArgs {
    /// Network description, as written by `Topology::to_json`.
    #[clap(short = 't', long = "topology")]
    pub topology: PathBuf,
    /// Parameter values keyed by name.
    #[clap(short = 'p', long = "parameters")]
    pub parameters: PathBuf,
    /// JSON array of samples, each a list of fields.
    #[clap(short = 'i', long = "input")]
    pub input: PathBuf,
    /// TOML inference config. Flags below override its values.
    #[clap(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Output fields to print, in order.
    #[clap(short = 'f', long = "field")]
    pub fields: Vec<Field>,
    /// Samples per forward pass. The whole input is one batch when omitted.
    #[clap(short = 'b', long = "batch-size")]
    pub batch_size: Option<NonZeroUsize>,
    /// Sample field feeding an input, as `name=index`.
    #[clap(long = "feeding", value_parser = parse_feeding)]
    pub feeding: Vec<(String, usize)>,
}

impl InferArgs {
    pub fn batch_size(&self) -> Option<BatchSize> {
        self.batch_size.map(BatchSize::Fixed)
    }

    fn infer_config(&self) -> anyhow::Result<InferConfig> {
        let mut config = match &self.config {
            Some(path) => InferConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => InferConfig::default(),
        };
        if !self.fields.is_empty() {
            config = config.with_fields(FieldSelection::new(self.fields.clone())?);
        }
        if let Some(batch_size) = self.batch_size() {
            config = config.with_batch_size(batch_size);
        }
        if !self.feeding.is_empty() {
            config = config.with_feeding(self.feeding.iter().cloned().collect::<Feeding>());
        }
        Ok(config)
    }
}

fn parse_feeding(arg: &str) -> Result<(String, usize), String> {
    let (name, index) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected `name=index`, got `{arg}`"))?;
    let index = index
        .parse()
        .map_err(|e| format!("invalid field index `{index}`: {e}"))?;
    Ok((name.to_string(), index))
}

fn read_samples(path: &Path) -> anyhow::Result<Vec<Sample>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read samples {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid samples {}", path.display()))
}

pub(crate) fn handle_command(args: InferArgs) -> anyhow::Result<()> {
    let result = run_inference(&args)?;
    println!("{}", render(&result)?);
    Ok(())
}

fn render(result: &InferResult) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

fn run_inference(args: &InferArgs) -> anyhow::Result<InferResult> {
    let model = load_model_config(&args.topology)?;
    let config = args.infer_config()?;
    let data_types = model.data_types();
    config.validate(&data_types)?;

    let parameters = Parameters::load(&args.parameters)
        .with_context(|| format!("Failed to load parameters {}", args.parameters.display()))?;
    let samples = read_samples(&args.input)?;
    log::info!(
        "Running {} sample(s) through {} layer(s)",
        samples.len(),
        model.layers.len()
    );

    let machine = BurnMachine::<Backend>::create_from_config(
        model,
        CreateMode::Testing,
        &[ParameterKind::Value],
        &Default::default(),
    )?;
    let mut session = Inference::with_machine(machine, data_types, &parameters)?;
    Ok(session.infer(samples, &config)?)
}
