use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use gmachine_topology::ModelConfig;

#[derive(Parser, Debug)]
pub struct DescribeArgs {
    /// Network description, as written by `Topology::to_json`.
    #[clap(short = 't', long = "topology")]
    pub topology: PathBuf,
}

pub(crate) fn handle_command(args: DescribeArgs) -> anyhow::Result<()> {
    let config = load_model_config(&args.topology)?;
    print!("{}", describe(&config));
    Ok(())
}

pub(crate) fn load_model_config(path: &Path) -> anyhow::Result<ModelConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read topology {}", path.display()))?;
    ModelConfig::from_json(&json)
        .with_context(|| format!("Invalid topology {}", path.display()))
}

fn describe(config: &ModelConfig) -> String {
    let mut out = String::new();
    for layer in &config.layers {
        let role = if config.input_layer_names.contains(&layer.name) {
            " (input)"
        } else if config.output_layer_names.contains(&layer.name) {
            " (output)"
        } else {
            ""
        };
        out.push_str(&format!(
            "{}{role}: {} {} [{}]",
            layer.name, layer.kind, layer.shape, layer.size
        ));
        if !layer.inputs.is_empty() {
            out.push_str(&format!(" <- {}", layer.inputs.join(", ")));
        }
        out.push('\n');
    }
    for parameter in &config.parameters {
        out.push_str(&format!("param {} {:?}\n", parameter.name, parameter.dims));
    }
    out
}
