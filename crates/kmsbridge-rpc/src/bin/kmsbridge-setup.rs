//! kmsbridge-setup - print PEM material from a KeyControl certificate bundle.
//!
//! The output is what `certFile` and `caCertFile` in the plugin configuration
//! should contain.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kmsbridge_core::CertificateBundle;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "kmsbridge-setup", version)]
#[command(about = "Extract plugin certificates from a KeyControl bundle")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the client certificate entry
    ShowClientCert {
        /// Certificate bundle JSON downloaded from KeyControl
        bundle: PathBuf,
    },
    /// Print the CA certificate entry
    ShowCaCert {
        /// Certificate bundle JSON downloaded from KeyControl
        bundle: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let pem = match &cli.command {
        Command::ShowClientCert { bundle } => load(bundle)?.client_certificate(),
        Command::ShowCaCert { bundle } => load(bundle)?.ca_certificate(),
    }
    .context("certificate bundle has no usable entry")?;

    println!("{pem}");
    Ok(())
}

fn load(path: &Path) -> Result<CertificateBundle> {
    CertificateBundle::load(path)
        .with_context(|| format!("failed to read certificate bundle {}", path.display()))
}
