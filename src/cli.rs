//! Command-line definitions. No behavior lives here.

use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::service::GenerationOptions;

/// qagen - QA artifact generation dashboard
#[derive(Parser)]
#[command(name = "qagen")]
#[command(about = "Generate Gherkin scenarios, Selenium scripts and test plans from requirements")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides APP_CONFIG_PATH)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the dashboard HTTP API and event stream
    Serve {
        /// Address to bind (defaults to server.bind_addr)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Run one generation for a panel and save the artifact
    Generate(GenerateArgs),
    /// List generation agents and panels
    Agents,
    /// Check that the generation service is reachable
    Ping,
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Panel id, e.g. gherkin or selenium-python
    #[arg(long)]
    pub panel: String,

    /// Requirement text
    #[arg(long, default_value = "")]
    pub text: String,

    /// Requirement document to upload
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Directory to save the artifact into (defaults to artifacts_dir)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Print the result without saving an artifact
    #[arg(long)]
    pub no_download: bool,

    #[arg(long)]
    pub feature_name: Option<String>,

    #[arg(long)]
    pub test_name: Option<String>,

    #[arg(long)]
    pub iterations: Option<u32>,

    /// Ask the backend to split long input into chunks
    #[arg(long)]
    pub chunk_input: bool,

    #[arg(long)]
    pub chunk_size: Option<u32>,
}

impl GenerateArgs {
    pub fn options(&self) -> GenerationOptions {
        GenerationOptions {
            feature_name: self.feature_name.clone(),
            test_name: self.test_name.clone(),
            iterations: self.iterations,
            chunk_input: self.chunk_input.then_some(true),
            chunk_size: self.chunk_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_generate_with_options() {
        let cli = Cli::parse_from([
            "qagen",
            "--config",
            "custom.toml",
            "generate",
            "--panel",
            "gherkin",
            "--text",
            "As a user I want to log in",
            "--feature-name",
            "login",
            "--chunk-input",
            "--no-download",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate command");
        };
        assert_eq!(args.panel, "gherkin");
        assert!(args.no_download);
        let options = args.options();
        assert_eq!(options.feature_name.as_deref(), Some("login"));
        assert_eq!(options.chunk_input, Some(true));
        assert_eq!(options.iterations, None);
    }

    #[test]
    fn serve_bind_is_optional() {
        let cli = Cli::parse_from(["qagen", "serve"]);
        assert!(matches!(cli.command, Commands::Serve { bind: None }));

        let cli = Cli::parse_from(["qagen", "serve", "--bind", "0.0.0.0:8080"]);
        let Commands::Serve { bind } = cli.command else {
            panic!("expected serve command");
        };
        assert_eq!(bind, Some("0.0.0.0:8080".parse().unwrap()));
    }
}
