mod params;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use vmflow_cloud::Endpoint;
use vmflow_cloud_vsphere::VsphereProvider;
use vmflow_config::ControllerConfig;
use vmflow_session::{Credential, parse_server_url};

#[derive(Parser)]
#[command(name = "vmflowd")]
#[command(about = "vmflow machine controller daemon", long_about = None)]
struct Cli {
    /// Config file (default: discovered, see `vmflow-config`)
    #[arg(short, long, global = true, env = "VMFLOW_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the config and credentials without contacting the server
    Validate,
    /// Log in to the management endpoint and report the session user
    CheckAuth,
    /// Print the effective config (secrets removed)
    ShowConfig,
    /// Print the version
    Version,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ControllerConfig> {
    let mut config = match path {
        Some(path) => ControllerConfig::from_file(path)?,
        None => {
            let path = vmflow_config::find_config_file()?;
            tracing::debug!(path = %path.display(), "using config file");
            ControllerConfig::from_file(&path)?
        }
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn validate(config: &ControllerConfig) -> anyhow::Result<()> {
    let params = params::session_params(config)?;
    let credential = params::check_offline(&params)?;
    let url = parse_server_url(&config.server)?;

    println!("{} {}", "✓".green(), "config is valid".bold());
    println!("  server:     {}", url.as_str().cyan());
    println!("  datacenter: {}", display_or_default(&config.datacenter));
    println!("  mode:       {}", config.mode);
    let auth = match credential {
        Credential::Password { username, .. } => format!("password ({})", username),
        Credential::Certificate(_) => "client certificate".to_string(),
    };
    println!("  auth:       {}", auth);
    if config.thumbprint.is_none() {
        println!(
            "  {} no thumbprint configured, the server certificate is not verified",
            "!".yellow()
        );
    }
    if let Some(interval) = config.keepalive_interval() {
        println!("  keepalive:  every {}s", interval.as_secs());
    }
    Ok(())
}

async fn check_auth(config: &ControllerConfig) -> anyhow::Result<()> {
    let params = params::session_params(config)?;
    let credential = params::check_offline(&params)?;
    let Credential::Password { username, password } = credential else {
        anyhow::bail!("check-auth supports username/password credentials only");
    };

    let endpoint = Endpoint {
        url: parse_server_url(&config.server)?,
        thumbprint: config.thumbprint.clone(),
        user_agent: format!("vmflowd/{}", env!("CARGO_PKG_VERSION")),
    };
    let provider = VsphereProvider::new(endpoint, username, password);
    tracing::info!(provider = provider.name(), server = %config.server, "checking credentials");

    let status = provider.check_auth().await;
    if status.authenticated {
        println!(
            "{} authenticated as {}",
            "✓".green(),
            status.account_info.unwrap_or_default().cyan()
        );
        Ok(())
    } else {
        eprintln!("{} {}", "✗".red(), "authentication failed".red().bold());
        if let Some(error) = &status.error {
            eprintln!("  {}", error);
        }
        anyhow::bail!("authentication failed")
    }
}

fn show_config(config: &ControllerConfig) -> anyhow::Result<()> {
    let mut redacted = config.clone();
    redacted.password.clear();
    let yaml = serde_yaml::to_string(&redacted).context("failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}

fn display_or_default(value: &str) -> &str {
    if value.is_empty() { "(default)" } else { value }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        println!("vmflowd {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = load_config(cli.config.as_ref())?;
    match cli.command {
        Commands::Validate => validate(&config),
        Commands::CheckAuth => check_auth(&config).await,
        Commands::ShowConfig => show_config(&config),
        Commands::Version => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmflow.yaml");
        std::fs::write(&path, "server: vc.local\nusername: admin\npassword: secret\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server, "vc.local");
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_load_config_rejects_empty_server() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmflow.yaml");
        std::fs::write(&path, "datacenter: dc0\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["vmflowd", "--config", "/etc/vmflow.yaml", "check-auth"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckAuth));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/vmflow.yaml")));
    }
}
