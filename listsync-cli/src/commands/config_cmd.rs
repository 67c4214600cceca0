use clap::{Args, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;

use crate::config::Config;
use crate::sync::describe;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Write a commented config file to the default location
    Init,
}

const DEFAULT_CONFIG: &str = r#"# lists configuration

# Where lists.json and settings.json live (default: platform data dir)
# data_dir: ~/.local/share/lists

# sync:
#   server_url: "http://localhost:8080"
#   token: "<api key>"
#   auto_sync: false
"#;

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&redacted(config))?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("data_dir: {}", config.data_dir.value.display());
                        println!("  source: {}", config.data_dir.source);
                        println!();

                        println!("sync: {}", describe(&config.sync));
                        println!(
                            "  auto_sync: {}",
                            if config.sync.auto_sync { "on" } else { "off" }
                        );
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'lists config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}

/// Copy of the config safe to print: credentials are masked.
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if config.sync.token.is_some() {
        config.sync.token = Some("********".to_string());
    }
    if config.sync.session.is_some() {
        config.sync.session = Some("********".to_string());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSource, ConfigValue, SyncConfig};
    use std::path::PathBuf;

    #[test]
    fn test_redacted_masks_credentials() {
        let config = Config {
            data_dir: ConfigValue::new(PathBuf::from("/tmp/lists"), ConfigSource::Default),
            config_file: None,
            sync: SyncConfig {
                server_url: Some("http://localhost:8080".to_string()),
                token: Some("secret".to_string()),
                session: None,
                auto_sync: false,
            },
        };

        let json = serde_json::to_string(&redacted(&config)).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("http://localhost:8080"));
    }
}
