use std::fs;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;

use cityguide_core::network::{certificate_fingerprint, CertificatePin, PinTable};

use crate::{AppContext, AppError, DisplayFallback, Result};

#[derive(Subcommand, Debug)]
pub enum PinCommands {
    /// Compute the SHA-256 pin of a certificate (PEM or DER)
    Fingerprint(PinFingerprintArgs),
    /// List configured pins
    List,
}

#[derive(Args, Debug)]
pub struct PinFingerprintArgs {
    /// Certificate file
    pub path: PathBuf,
    /// Print a config entry for this host
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FingerprintReport {
    pub source: String,
    pub host: Option<String>,
    pub fingerprints: Vec<String>,
}

impl DisplayFallback for FingerprintReport {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for fingerprint in &self.fingerprints {
            lines.push(format!("sha256 {fingerprint}"));
        }
        if let (Some(host), Some(leaf)) = (&self.host, self.fingerprints.first()) {
            lines.push(String::new());
            lines.push("[[transport.pins]]".to_string());
            lines.push(format!("host = \"{host}\""));
            lines.push(format!("fingerprint = \"{leaf}\""));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PinListReport {
    pub config: String,
    pub pins: Vec<CertificatePin>,
}

impl DisplayFallback for PinListReport {
    fn display(&self) -> String {
        if self.pins.is_empty() {
            return format!("No pins configured in {}", self.config);
        }
        let mut lines = vec![format!("Pins in {}:", self.config)];
        for pin in &self.pins {
            lines.push(format!("  - {} {}", pin.host, pin.fingerprint));
        }
        lines.join("\n")
    }
}

/// The first certificate of a PEM bundle is the leaf; the pin applies to it.
pub(crate) fn fingerprint_file(args: &PinFingerprintArgs) -> Result<FingerprintReport> {
    let bytes = fs::read(&args.path)?;
    let fingerprints = read_certificates(&bytes)?
        .iter()
        .map(|der| certificate_fingerprint(der))
        .collect();
    Ok(FingerprintReport {
        source: args.path.display().to_string(),
        host: args.host.clone(),
        fingerprints,
    })
}

fn read_certificates(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    let trimmed = bytes
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .map(|start| &bytes[start..])
        .unwrap_or_default();
    if !trimmed.starts_with(b"-----BEGIN") {
        if trimmed.is_empty() {
            return Err(AppError::InvalidArguments("certificate file is empty".to_string()));
        }
        return Ok(vec![bytes.to_vec()]);
    }

    let mut reader = trimmed;
    let certs = rustls_pemfile::certs(&mut reader)
        .map(|cert| cert.map(|der| der.as_ref().to_vec()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(AppError::InvalidArguments(
            "no CERTIFICATE block found in PEM input".to_string(),
        ));
    }
    Ok(certs)
}

impl AppContext {
    pub(crate) fn pin_list(&self) -> Result<PinListReport> {
        let table = PinTable::new(self.config.transport.pins.clone())?;
        Ok(PinListReport {
            config: self.config_path.display().to_string(),
            pins: table.entries(),
        })
    }
}
