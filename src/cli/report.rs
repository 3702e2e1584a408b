//! What the command line tool prints.

use std::fmt;

use crate::signing::ProbeStatus;

//------------ Report --------------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Report {
    Probe(Vec<ProbeReport>),
    Key(KeyReport),
    Uploaded(String),
    Signature(String),
    Verified(bool),
}

impl Report {
    /// The process exit code that goes with this report.
    pub fn exit_code(&self) -> i32 {
        match self {
            Report::Verified(false) => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Report::Probe(results) => {
                for result in results {
                    writeln!(f, "{} {}", result.endpoint, result.status)?;
                }
                Ok(())
            }
            Report::Key(key) => {
                writeln!(f, "label: {}", key.label)?;
                writeln!(f, "public key: {}", key.public_key)?;
                if key.ephemeral {
                    writeln!(f, "ephemeral: yes")?;
                }
                Ok(())
            }
            Report::Uploaded(label) => writeln!(f, "certificate stored for {}", label),
            Report::Signature(signature) => writeln!(f, "{}", signature),
            Report::Verified(true) => writeln!(f, "valid"),
            Report::Verified(false) => writeln!(f, "invalid"),
        }
    }
}

//------------ ProbeReport ---------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProbeReport {
    pub endpoint: String,
    pub status: ProbeStatus,
}

impl ProbeReport {
    pub fn new(endpoint: String, status: ProbeStatus) -> Self {
        ProbeReport { endpoint, status }
    }
}

//------------ KeyReport -----------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyReport {
    pub label: String,

    /// Base64 encoded SubjectPublicKeyInfo.
    pub public_key: String,

    pub ephemeral: bool,
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_signature_fails_the_process() {
        assert_eq!(1, Report::Verified(false).exit_code());
        assert_eq!(0, Report::Verified(true).exit_code());
        assert_eq!("invalid\n", Report::Verified(false).to_string());
    }

    #[test]
    fn probe_lists_one_line_per_server() {
        let report = Report::Probe(vec![
            ProbeReport::new("a/10.0.0.1:8080".to_string(), ProbeStatus::Reachable),
            ProbeReport::new("b/10.1.0.1:8080".to_string(), ProbeStatus::Unreachable),
        ]);
        assert_eq!("a/10.0.0.1:8080 reachable\nb/10.1.0.1:8080 unreachable\n", report.to_string());
    }
}
