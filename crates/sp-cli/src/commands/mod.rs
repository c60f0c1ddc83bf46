//! Command implementations.

pub mod artifact;
pub mod assess;
pub mod decode;
pub mod metadata;
pub mod verify;

pub use artifact::run_artifact;
pub use assess::run_assess;
pub use decode::run_decode;
pub use metadata::run_metadata;
pub use verify::run_verify;

use std::io::Read;
use std::path::Path;

use sp_core::SamlConfig;
use sp_protocol_saml::trust::TrustContext;
use tracing::debug;

use crate::{CliError, CliResult};

/// Reads a command-line value. `-` reads stdin and `@path` reads a file;
/// anything else is taken literally. Surrounding whitespace is dropped.
pub fn read_input(input: &str) -> CliResult<String> {
    let value = if input == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else if let Some(path) = input.strip_prefix('@') {
        std::fs::read_to_string(path)?
    } else {
        input.to_string()
    };
    Ok(value.trim().to_string())
}

/// Loads the trust context from the `--config` file.
pub fn load_context(path: Option<&Path>) -> CliResult<TrustContext> {
    let path = path.ok_or_else(|| {
        CliError::InvalidArgument("this command needs --config (or SAML_SP_CONFIG)".to_string())
    })?;
    let config = SamlConfig::load(path)?;
    debug!(path = %path.display(), "loaded service provider configuration");
    Ok(TrustContext::from_config(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_input_is_trimmed() {
        assert_eq!(read_input("  abc \n").unwrap(), "abc");
    }

    #[test]
    fn at_prefix_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value.txt");
        std::fs::write(&path, "PHNhbWw+\n").unwrap();
        assert_eq!(read_input(&format!("@{}", path.display())).unwrap(), "PHNhbWw+");
    }

    #[test]
    fn context_requires_a_config_path() {
        assert!(matches!(load_context(None), Err(CliError::InvalidArgument(_))));
    }
}
