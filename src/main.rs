use std::process::ExitCode;
use std::sync::Arc;

use autha_ldap::config::DEFAULT_CONFIG_PATH;
use autha_ldap::telemetry::{self, TracingTelemetry};
use autha_ldap::{Configuration, LdapService, User, UserStore};
use clap::{Parser, Subcommand};
use zeroize::Zeroizing;

const PASSWORD_ENV: &str = "LDAP_PASSWORD";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the configuration file.
    #[arg(long, short, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
    /// OTLP endpoint receiving logs.
    #[arg(long, env = "OTLP_ENDPOINT")]
    otlp: Option<String>,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the credentials of a user, read from `LDAP_PASSWORD`.
    Login {
        username: String,
        /// Only search this directory.
        #[arg(long, short)]
        domain: Option<String>,
    },
    /// Find a user without checking any credential.
    Find {
        username: String,
        /// Only search this directory.
        #[arg(long, short)]
        domain: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let provider = match telemetry::init(args.otlp.as_deref()) {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("cannot initialize telemetry: {err}");
            return ExitCode::FAILURE;
        },
    };

    let code = run(args).await;

    if let Some(provider) = provider {
        if let Err(err) = provider.shutdown() {
            eprintln!("cannot flush logs: {err}");
        }
    }

    code
}

async fn run(args: Args) -> ExitCode {
    let config = match Configuration::read(&args.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(path = %args.config, %err, "invalid configuration");
            return ExitCode::FAILURE;
        },
    };

    let service = LdapService::new(config, Arc::new(TracingTelemetry::new()));
    let store = UserStore::new(service);

    let user = match args.cmd {
        Commands::Login { username, domain } => {
            // Never taken from the command line, which other users can read.
            let Some(password) = std::env::var(PASSWORD_ENV)
                .ok()
                .map(Zeroizing::new)
            else {
                tracing::error!(env = PASSWORD_ENV, "missing password");
                return ExitCode::FAILURE;
            };

            let domain = domain.as_deref();
            match store
                .validate_credentials_in(&username, &password, domain)
                .await
            {
                Ok(user) => user,
                Err(err) => {
                    tracing::error!(%username, %err, "credential check failed");
                    return ExitCode::FAILURE;
                },
            }
        },
        Commands::Find { username, domain } => {
            store.find_by_username_in(&username, domain.as_deref()).await
        },
    };

    print(user.as_ref())
}

fn print(user: Option<&User>) -> ExitCode {
    let Some(user) = user else {
        println!("no user");
        return ExitCode::FAILURE;
    };

    match serde_json::to_string_pretty(user) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        },
        Err(err) => {
            tracing::error!(%err, "cannot serialize user");
            ExitCode::FAILURE
        },
    }
}
