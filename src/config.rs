use clap::Args;
use std::path::PathBuf;

use crate::error::Error;
use crate::plugin::VALIDATING_ADMISSION_WEBHOOK;

#[derive(Args, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct RunArgs {
    #[arg(short, long, default_value_t = 9443)]
    pub port: u16,
    #[arg(long, default_value = "/webhook-dispatch/tls.crt")]
    pub tls_cert: PathBuf,
    #[arg(long, default_value = "/webhook-dispatch/tls.key")]
    pub tls_key: PathBuf,
    /// Read ValidatingWebhookConfigurations from this YAML file instead of
    /// watching WebhookDispatch objects in the cluster
    #[arg(long)]
    pub webhook_file: Option<PathBuf>,
    /// Admission plugins to run, in order
    #[arg(long, value_delimiter = ',', default_value = VALIDATING_ADMISSION_WEBHOOK)]
    pub plugins: Vec<String>,
}

/// Validated runtime settings for the `run` command.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub tls_cert: PathBuf,
    pub tls_key: PathBuf,
    pub webhook_file: Option<PathBuf>,
    pub plugins: Vec<String>,
}

impl TryFrom<RunArgs> for Config {
    type Error = Error;

    fn try_from(args: RunArgs) -> Result<Config, Error> {
        if args.port == 0 {
            return Err(Error::InvalidConfig("port must not be 0".into()));
        }
        let plugins: Vec<String> = args
            .plugins
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if plugins.is_empty() {
            return Err(Error::InvalidConfig("at least one plugin is required".into()));
        }
        Ok(Config {
            port: args.port,
            tls_cert: args.tls_cert,
            tls_key: args.tls_key,
            webhook_file: args.webhook_file,
            plugins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        run: RunArgs,
    }

    fn parse(args: &[&str]) -> Result<Config, Error> {
        let argv = std::iter::once("webhook-dispatch").chain(args.iter().copied());
        let cli = Cli::try_parse_from(argv)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Config::try_from(cli.run)
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.port, 9443);
        assert_eq!(config.plugins, vec![VALIDATING_ADMISSION_WEBHOOK]);
        assert!(config.webhook_file.is_none());
    }

    #[test]
    fn plugin_list_and_file() {
        let config = parse(&[
            "-p",
            "8443",
            "--webhook-file",
            "/etc/hooks.yaml",
            "--plugins",
            "ValidatingAdmissionWebhook, Other",
        ])
        .unwrap();
        assert_eq!(config.port, 8443);
        assert_eq!(config.plugins, vec!["ValidatingAdmissionWebhook", "Other"]);
        assert_eq!(config.webhook_file, Some(PathBuf::from("/etc/hooks.yaml")));
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(matches!(parse(&["-p", "0"]), Err(Error::InvalidConfig(_))));
        assert!(matches!(parse(&["--plugins", " "]), Err(Error::InvalidConfig(_))));
    }
}
