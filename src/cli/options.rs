//! The options for the signing proxy command line tool.

use std::{fs, path::PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::Parser;

use super::{
    error::Error,
    report::{KeyReport, ProbeReport, Report},
};
use crate::{
    constants::SIGNPROXY_DEFAULT_CONFIG_FILE,
    signing::{KeyLabel, RemoteSigner, Transport},
};

//------------ Options -------------------------------------------------------

/// The command line options for the signing proxy.
#[derive(clap::Parser)]
#[command(
    version,
    about = "Delegates key generation and signing to remote signing servers.",
)]
pub struct Options {
    #[command(flatten)]
    pub general: GeneralOptions,

    #[command(subcommand)]
    pub command: Command,
}

impl Options {
    /// Creates the options from the process arguments.
    ///
    /// If the arguments won’t result in usable options, exits the process.
    pub fn from_args() -> Self {
        Self::parse()
    }
}

//------------ GeneralOptions ------------------------------------------------

#[derive(clap::Args)]
pub struct GeneralOptions {
    /// Path to the configuration file.
    #[arg(
        short, long,
        env = "SIGNPROXY_CONFIG",
        default_value = SIGNPROXY_DEFAULT_CONFIG_FILE,
    )]
    pub config: String,
}

//------------ Command -------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum Command {
    /// Check which signing servers accept connections.
    Probe(Probe),

    /// Have a signing server create a new key pair.
    Keygen(Keygen),

    /// Store the certificate for a key.
    UploadCert(UploadCert),

    /// Sign the contents of a file.
    Sign(Sign),

    /// Verify a signature over the contents of a file.
    Verify(Verify),
}

impl Command {
    pub fn run<T: Transport>(self, signer: &RemoteSigner<T>) -> Result<Report, Error> {
        match self {
            Self::Probe(cmd) => Ok(cmd.run(signer)),
            Self::Keygen(cmd) => cmd.run(signer),
            Self::UploadCert(cmd) => cmd.run(signer),
            Self::Sign(cmd) => cmd.run(signer),
            Self::Verify(cmd) => cmd.run(signer),
        }
    }
}

//------------ Probe ---------------------------------------------------------

#[derive(clap::Parser)]
pub struct Probe;

impl Probe {
    pub fn run<T: Transport>(self, signer: &RemoteSigner<T>) -> Report {
        let results = signer
            .probe_endpoints()
            .into_iter()
            .map(|(endpoint, status)| ProbeReport::new(endpoint.to_string(), status))
            .collect();
        Report::Probe(results)
    }
}

//------------ Keygen --------------------------------------------------------

#[derive(clap::Parser)]
pub struct Keygen {
    /// Mark the key as ephemeral.
    #[arg(long)]
    ephemeral: bool,
}

impl Keygen {
    pub fn run<T: Transport>(self, signer: &RemoteSigner<T>) -> Result<Report, Error> {
        let key = signer.generate_key(self.ephemeral)?;
        Ok(Report::Key(KeyReport {
            label: key.label().to_string(),
            public_key: BASE64.encode(key.public_key_der()?),
            ephemeral: key.is_ephemeral(),
        }))
    }
}

//------------ UploadCert ----------------------------------------------------

#[derive(clap::Parser)]
pub struct UploadCert {
    /// The label of the key.
    #[arg(long)]
    label: String,

    /// A PEM or DER encoded certificate.
    #[arg(long, value_name = "FILE")]
    cert: PathBuf,
}

impl UploadCert {
    pub fn run<T: Transport>(self, signer: &RemoteSigner<T>) -> Result<Report, Error> {
        let certificate = read_file(&self.cert)?;
        let label = KeyLabel::from(self.label);
        signer.upload_certificate(&label, &certificate)?;
        Ok(Report::Uploaded(label.to_string()))
    }
}

//------------ Sign ----------------------------------------------------------

#[derive(clap::Parser)]
pub struct Sign {
    /// The label of the key.
    #[arg(long)]
    label: String,

    /// The file to sign.
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
}

impl Sign {
    pub fn run<T: Transport>(self, signer: &RemoteSigner<T>) -> Result<Report, Error> {
        let message = read_file(&self.input)?;
        let signature = signer.sign(&KeyLabel::from(self.label), &message)?;
        Ok(Report::Signature(BASE64.encode(signature)))
    }
}

//------------ Verify --------------------------------------------------------

#[derive(clap::Parser)]
pub struct Verify {
    /// The label of the key.
    #[arg(long)]
    label: String,

    /// The file that was signed.
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// The base64 encoded signature.
    #[arg(long)]
    signature: String,
}

impl Verify {
    pub fn run<T: Transport>(self, signer: &RemoteSigner<T>) -> Result<Report, Error> {
        let message = read_file(&self.input)?;
        let signature = BASE64
            .decode(self.signature.trim())
            .map_err(|e| Error::Input(format!("signature is not base64: {}", e)))?;
        let valid = signer.verify(&KeyLabel::from(self.label), &message, &signature)?;
        Ok(Report::Verified(valid))
    }
}

fn read_file(path: &PathBuf) -> Result<Vec<u8>, Error> {
    fs::read(path).map_err(|e| Error::io(path, e))
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn options_are_consistent() {
        Options::command().debug_assert();
    }

    #[test]
    fn parses_subcommands() {
        let options =
            Options::try_parse_from(["signproxy", "-c", "/etc/signproxy.conf", "keygen", "--ephemeral"]).unwrap();
        assert_eq!("/etc/signproxy.conf", options.general.config);
        assert!(matches!(options.command, Command::Keygen(Keygen { ephemeral: true })));

        let options = Options::try_parse_from([
            "signproxy",
            "verify",
            "--label",
            "signproxy-1",
            "--input",
            "msg.bin",
            "--signature",
            "AAAA",
        ])
        .unwrap();
        match options.command {
            Command::Verify(verify) => assert_eq!("signproxy-1", verify.label),
            _ => panic!("Expected verify command"),
        }

        assert!(Options::try_parse_from(["signproxy", "sign", "--label", "x"]).is_err());
    }
}
