//! enzkin CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ek_inference::chain::ChainFailure;
use ek_inference::diagnostics::{DiagnosticsResult, QualitySummary};
use ek_inference::summary::{PPC_BAND_LEVELS, ParameterSummary, PpcBand, ppc_bands, summarize_columns};
use ek_inference::{
    AssayData, LikelihoodMode, MetricKind, PosteriorDraw, SamplerConfig, SamplerControl,
    ToySettings,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "enzkin")]
#[command(about = "enzkin - Bayesian Michaelis-Menten kinetics from absorbance traces")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample the posterior of an assay payload (JSON)
    Sample {
        /// Input assay payload (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Run configuration (JSON); flags below override it.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of chains
        #[arg(long)]
        chains: Option<usize>,

        /// Warm-up iterations per chain
        #[arg(long)]
        warmup: Option<usize>,

        /// Post-warm-up draws per chain
        #[arg(long)]
        samples: Option<usize>,

        /// Base seed (chain c uses seed + c)
        #[arg(long)]
        seed: Option<u64>,

        /// Maximum NUTS tree depth
        #[arg(long)]
        max_treedepth: Option<usize>,

        /// Target acceptance probability for step-size adaptation
        #[arg(long)]
        target_accept: Option<f64>,

        /// Adapt a dense metric instead of a diagonal one.
        #[arg(long)]
        dense: bool,

        /// Which traces receive the rate likelihood.
        #[arg(long, value_enum)]
        likelihood: Option<LikelihoodArg>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto).
        #[arg(long, default_value = "0")]
        threads: usize,
    },

    /// Generate a toy assay payload from known kinetic parameters
    Simulate {
        /// Toy settings (JSON); defaults to the recovery scenario.
        #[arg(long)]
        config: Option<PathBuf>,

        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Output file for the payload (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the generating values here.
        #[arg(long)]
        truth: Option<PathBuf>,
    },

    /// Summarize a `sample` result: medians, 95% intervals and predictive bands
    Summarize {
        /// Result file written by `sample`
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LikelihoodArg {
    DuplicatedBlanks,
    BlanksOnce,
}

impl From<LikelihoodArg> for LikelihoodMode {
    fn from(arg: LikelihoodArg) -> Self {
        match arg {
            LikelihoodArg::DuplicatedBlanks => LikelihoodMode::DuplicatedBlanks,
            LikelihoodArg::BlanksOnce => LikelihoodMode::BlanksOnce,
        }
    }
}

/// `--config` file of `sample`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RunConfig {
    sampler: SamplerConfig,
    likelihood: LikelihoodMode,
}

/// What `sample` writes and `summarize` reads.
#[derive(Debug, Serialize, Deserialize)]
struct SampleOutput {
    likelihood: LikelihoodMode,
    config: SamplerConfig,
    #[serde(skip_deserializing)]
    parameters: Vec<ParameterSummary>,
    #[serde(skip_deserializing)]
    diagnostics: Option<DiagnosticsResult>,
    #[serde(skip_deserializing)]
    quality: Option<QualitySummary>,
    n_divergent: usize,
    #[serde(default)]
    failed_chains: Vec<ChainFailure>,
    step_size: Vec<f64>,
    ppc_conc: Vec<f64>,
    draws: Vec<PosteriorDraw>,
}

#[derive(Debug, Serialize)]
struct SummaryOutput {
    parameters: Vec<ParameterSummary>,
    ppc_bands: Vec<PpcBand>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Sample {
            input,
            config,
            chains,
            warmup,
            samples,
            seed,
            max_treedepth,
            target_accept,
            dense,
            likelihood,
            output,
            threads,
        } => {
            let mut run = match config {
                Some(path) => read_json::<RunConfig>(&path)?,
                None => RunConfig::default(),
            };
            let s = &mut run.sampler;
            if let Some(v) = chains {
                s.n_chains = v;
            }
            if let Some(v) = warmup {
                s.n_warmup = v;
            }
            if let Some(v) = samples {
                s.n_samples = v;
            }
            if let Some(v) = seed {
                s.seed = v;
            }
            if let Some(v) = max_treedepth {
                s.nuts.max_treedepth = v;
            }
            if let Some(v) = target_accept {
                s.nuts.target_accept = v;
            }
            if dense {
                s.nuts.metric = MetricKind::Dense;
            }
            if let Some(v) = likelihood {
                run.likelihood = v.into();
            }
            cmd_sample(&input, &run, output.as_ref(), threads)
        }
        Commands::Simulate { config, seed, output, truth } => {
            let mut settings = match config {
                Some(path) => read_json::<ToySettings>(&path)?,
                None => ToySettings::default(),
            };
            if let Some(v) = seed {
                settings.seed = v;
            }
            cmd_simulate(&settings, output.as_ref(), truth.as_ref())
        }
        Commands::Summarize { input, output } => cmd_summarize(&input, output.as_ref()),
        Commands::Version => {
            println!("enzkin {}", ek_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_sample(input: &Path, run: &RunConfig, output: Option<&PathBuf>, threads: usize) -> Result<()> {
    if threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
    }

    tracing::info!(path = %input.display(), "loading assay");
    let data: AssayData = read_json(input)?;
    let assay = data.validate().with_context(|| format!("invalid assay payload {}", input.display()))?;
    tracing::info!(
        traces = assay.traces.n_traces(),
        blanks = assay.traces.n_blank(),
        times = assay.traces.n_times(),
        "assay loaded"
    );

    let out = ek_inference::fit(&assay, run.likelihood, &run.sampler, &SamplerControl::new())?;
    tracing::info!(
        draws = out.draws.len(),
        divergent = out.result.n_divergent(),
        quality = %out.quality.status,
        "sampling complete"
    );
    for finding in out.quality.failures.iter().chain(&out.quality.warnings) {
        tracing::warn!(finding = %finding, "quality gate");
    }

    let result = SampleOutput {
        likelihood: run.likelihood,
        config: run.sampler.clone(),
        parameters: out.key_summaries(),
        n_divergent: out.result.n_divergent(),
        failed_chains: out.result.failed_chains.clone(),
        step_size: out.result.chains.iter().map(|c| c.step_size).collect(),
        diagnostics: Some(out.diagnostics),
        quality: Some(out.quality),
        ppc_conc: out.ppc_conc,
        draws: out.draws,
    };
    write_json(output, serde_json::to_value(&result)?)
}

fn cmd_simulate(settings: &ToySettings, output: Option<&PathBuf>, truth: Option<&PathBuf>) -> Result<()> {
    let toy = settings.simulate()?;
    tracing::info!(traces = toy.data.m, blanks = toy.data.m0, seed = settings.seed, "toy assay generated");
    if let Some(path) = truth {
        std::fs::write(path, serde_json::to_string_pretty(&toy.truth)?)?;
    }
    write_json(output, serde_json::to_value(&toy.data)?)
}

fn cmd_summarize(input: &Path, output: Option<&PathBuf>) -> Result<()> {
    let run: SampleOutput = read_json(input)?;
    let (names, columns) = ek_inference::draws::columns(&run.draws)?;
    let keep: Vec<usize> = names
        .iter()
        .enumerate()
        .filter(|(_, n)| n.as_str() != "chain" && n.as_str() != "iteration" && !n.starts_with("k_ppc["))
        .map(|(i, _)| i)
        .collect();
    let kept_names: Vec<String> = keep.iter().map(|&i| names[i].clone()).collect();
    let kept_cols: Vec<Vec<f64>> = keep.iter().map(|&i| columns[i].clone()).collect();

    let k_ppc: Vec<Vec<f64>> = run.draws.iter().map(|d| d.k_ppc.clone()).collect();
    let summary = SummaryOutput {
        parameters: summarize_columns(&kept_names, &kept_cols),
        ppc_bands: ppc_bands(&k_ppc, &run.ppc_conc, &PPC_BAND_LEVELS),
    };
    tracing::info!(draws = run.draws.len(), parameters = summary.parameters.len(), "summarized");
    write_json(output, serde_json::to_value(&summary)?)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
