pub mod loader;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::analysis::{self, AnalysisResult};
use crate::cancel::CancellationToken;
use crate::config::AnalysisConfig;

#[derive(Parser)]
#[clap(name = "ftacli")]
#[clap(author = "faulttree-core contributors")]
#[clap(version)]
#[clap(about = "Fault-tree analysis: minimal cut sets, probability, Monte Carlo", long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Optional TOML file layered under the builtin analysis defaults.
    #[clap(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Seal and structurally check a fault tree without quantifying it.
    Validate {
        #[clap(value_parser)]
        input: PathBuf,
    },

    /// Run the full pipeline: seal, minimal cut sets, probability, and
    /// (if `n_simulations` is non-zero in config) Monte Carlo sampling.
    Analyze {
        #[clap(value_parser)]
        input: PathBuf,

        #[clap(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Force a Monte Carlo run regardless of the loaded config's
    /// `n_simulations`, overriding it from the command line.
    Sample {
        #[clap(value_parser)]
        input: PathBuf,

        #[clap(short = 'n', long, default_value_t = 100_000)]
        iterations: u64,

        #[clap(long, default_value_t = 0)]
        seed: u64,
    },
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub struct CliRunner {
    config_path: Option<PathBuf>,
}

impl CliRunner {
    pub fn new(cli: &Cli) -> Self {
        let filter = if cli.verbose {
            tracing_subscriber::EnvFilter::new("debug")
        } else {
            tracing_subscriber::EnvFilter::from_default_env()
        };
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        Self { config_path: cli.config.clone() }
    }

    pub fn run(&self, command: Commands) -> Result<(), CliError> {
        match command {
            Commands::Validate { input } => self.run_validate(input),
            Commands::Analyze { input, format } => self.run_analyze(input, format),
            Commands::Sample { input, iterations, seed } => self.run_sample(input, iterations, seed),
        }
    }

    fn load_config(&self) -> Result<AnalysisConfig, CliError> {
        AnalysisConfig::load(self.config_path.as_deref()).map_err(CliError::Config)
    }

    fn run_validate(&self, input: PathBuf) -> Result<(), CliError> {
        println!("Validating {}...", input.display());
        let mut tree = loader::load_from_path(&input)?;
        match crate::validate::seal(&mut tree, false) {
            Ok(report) => {
                println!("{}", "valid".green());
                println!("  gates reachable: {}", tree.inter_events.len());
                for warning in &report.warnings {
                    println!("  {} {}", "warning:".yellow(), warning);
                }
                Ok(())
            }
            Err(e) => {
                eprintln!("{} {}", "invalid:".red(), e);
                Err(CliError::Analysis(e.to_string()))
            }
        }
    }

    fn run_analyze(&self, input: PathBuf, format: OutputFormat) -> Result<(), CliError> {
        println!("Analyzing {}...", input.display());
        let mut tree = loader::load_from_path(&input)?;
        let config = self.load_config()?;
        let cancel = CancellationToken::new();

        let result = analysis::analyze(&mut tree, &config, &cancel)
            .map_err(|e| CliError::Analysis(e.to_string()))?;

        match format {
            OutputFormat::Text => print_text(&result),
            OutputFormat::Json => print_json(&result)?,
        }
        Ok(())
    }

    fn run_sample(&self, input: PathBuf, iterations: u64, seed: u64) -> Result<(), CliError> {
        println!("Sampling {} ({iterations} iterations)...", input.display());
        let mut tree = loader::load_from_path(&input)?;
        let mut config = self.load_config()?;
        config.n_simulations = iterations;
        config.seed = seed;
        let cancel = CancellationToken::new();

        let spinner = indicatif::ProgressBar::new_spinner();
        spinner.set_message(format!("running {iterations} Monte Carlo iterations"));
        spinner.enable_steady_tick(std::time::Duration::from_millis(120));

        let result = analysis::analyze(&mut tree, &config, &cancel)
            .map_err(|e| CliError::Analysis(e.to_string()))?;

        spinner.finish_and_clear();

        println!("  finished at {}", chrono::Utc::now().to_rfc3339());

        if let Some(mc) = &result.monte_carlo {
            println!(
                "  mean: {:.6} (std dev {:.6}, n={})",
                mc.mean, mc.std_dev, mc.iterations
            );
            println!(
                "  quantiles: p05={:.6} p50={:.6} p95={:.6}",
                mc.quantiles.p05, mc.quantiles.p50, mc.quantiles.p95
            );
            for warning in &mc.warnings {
                println!("  {} {}", "warning:".yellow(), warning);
            }
        }
        Ok(())
    }
}

fn print_text(result: &AnalysisResult) {
    println!("{}", "analysis complete".green());
    println!("  generated at: {}", chrono::Utc::now().to_rfc3339());
    println!("  minimal cut sets: {}", result.cut_set_count_before_cutoff);
    println!("  reported cut sets (after cut_off): {}", result.probability.cut_sets.len());
    println!("  top event probability: {:.6e}", result.probability.top_probability);
    for cs in result.probability.cut_sets.iter().take(10) {
        println!("    {:>12.4e}  {}", cs.probability, cs.members.join(" & "));
    }
    if !result.probability.importance.is_empty() {
        println!("  importance (Fussell-Vesely):");
        let mut ranked: Vec<_> = result.probability.importance.iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (id, fv) in ranked.iter().take(10) {
            println!("    {:>8.4}  {}", fv, id);
        }
    }
    for warning in &result.probability.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
    if let Some(mc) = &result.monte_carlo {
        println!(
            "  monte carlo mean: {:.6e} (std dev {:.6e}, n={}, p05={:.6e}, p50={:.6e}, p95={:.6e})",
            mc.mean, mc.std_dev, mc.iterations, mc.quantiles.p05, mc.quantiles.p50, mc.quantiles.p95
        );
    }
}

fn print_json(result: &AnalysisResult) -> Result<(), CliError> {
    #[derive(serde::Serialize)]
    struct CutSetOut {
        members: Vec<String>,
        probability: f64,
    }
    #[derive(serde::Serialize)]
    struct MonteCarloOut {
        mean: f64,
        std_dev: f64,
        p05: f64,
        p50: f64,
        p95: f64,
        iterations: u64,
    }
    #[derive(serde::Serialize)]
    struct Out<'a> {
        generated_at: String,
        cut_set_count_before_cutoff: usize,
        top_probability: f64,
        cut_sets: Vec<CutSetOut>,
        importance: &'a std::collections::BTreeMap<String, f64>,
        warnings: &'a [String],
        monte_carlo: Option<MonteCarloOut>,
    }
    let out = Out {
        generated_at: chrono::Utc::now().to_rfc3339(),
        cut_set_count_before_cutoff: result.cut_set_count_before_cutoff,
        top_probability: result.probability.top_probability,
        cut_sets: result
            .probability
            .cut_sets
            .iter()
            .map(|cs| CutSetOut { members: cs.members.clone(), probability: cs.probability })
            .collect(),
        importance: &result.probability.importance,
        warnings: &result.probability.warnings,
        monte_carlo: result.monte_carlo.as_ref().map(|m| MonteCarloOut {
            mean: m.mean,
            std_dev: m.std_dev,
            p05: m.quantiles.p05,
            p50: m.quantiles.p50,
            p95: m.quantiles.p95,
            iterations: m.iterations,
        }),
    };
    let json = serde_json::to_string_pretty(&out).map_err(|e| CliError::Analysis(e.to_string()))?;
    println!("{json}");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("failed to load fault tree: {0}")]
    Loader(#[from] loader::LoaderError),

    #[error("configuration error: {0}")]
    Config(crate::config::ConfigError),

    #[error("analysis error: {0}")]
    Analysis(String),
}
