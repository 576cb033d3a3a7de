//! Options for fuzzing an external command from inside the test suite.
//!
//! The command line travels as base64 (standard alphabet, padded) of its
//! JSON form in [`FUZZ_OPTIONS_ENV`], so arbitrary arguments survive any
//! shell or build tool in between.

use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::bridge::CommandSpec;
use crate::consts::FUZZ_OPTIONS_ENV;

/// Error type for encoding and decoding fuzz options.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Fuzz options name no command")]
    EmptyCommand,

    #[error("Fuzz options are not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Fuzz options are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{name} is not valid UTF-8", name = FUZZ_OPTIONS_ENV)]
    NotUnicode,
}

/// The external command to fuzz.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FuzzOptions {
    pub cmd:  String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the command; empty means inherit
    #[serde(default)]
    pub dir:  String,
}

impl FuzzOptions {
    /// # Errors
    /// Returns `ConfigError::EmptyCommand` if `cmd` is empty.
    pub fn encode(&self) -> Result<String, ConfigError> {
        if self.cmd.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        Ok(BASE64.encode(serde_json::to_vec(self)?))
    }

    /// # Errors
    /// Returns `ConfigError` if `encoded` isn't base64 JSON naming a command.
    pub fn decode(encoded: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_slice(&BASE64.decode(encoded.trim())?)?;
        if options.cmd.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        Ok(options)
    }

    /// Reads [`FUZZ_OPTIONS_ENV`]. `Ok(None)` means fuzzing wasn't
    /// configured and should be skipped.
    ///
    /// # Errors
    /// Returns `ConfigError` if the variable is set but malformed.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        match std::env::var(FUZZ_OPTIONS_ENV) {
            Ok(encoded) if encoded.trim().is_empty() => Ok(None),
            Ok(encoded) => Self::decode(&encoded).map(Some),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode),
        }
    }

    pub fn command_spec(&self) -> CommandSpec {
        CommandSpec {
            program: self.cmd.clone(),
            args:    self.args.clone(),
            dir:     (!self.dir.is_empty()).then(|| PathBuf::from(&self.dir)),
        }
    }
}

impl From<&CommandSpec> for FuzzOptions {
    fn from(spec: &CommandSpec) -> Self {
        Self {
            cmd:  spec.program.clone(),
            args: spec.args.clone(),
            dir:  spec
                .dir
                .as_ref()
                .map(|dir| dir.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let options = FuzzOptions {
            cmd:  "./convert".to_owned(),
            args: vec!["--mode".to_owned(), "a b\tc".to_owned()],
            dir:  "/tmp/work".to_owned(),
        };
        let encoded = options.encode().unwrap();
        assert!(encoded.bytes().all(|b| b.is_ascii_alphanumeric() || b"+/=".contains(&b)));
        assert_eq!(FuzzOptions::decode(&encoded).unwrap(), options);
    }

    #[test]
    fn test_decode_known_encoding() {
        // {"cmd":"cat","args":["-u"],"dir":""}
        let decoded = FuzzOptions::decode("eyJjbWQiOiJjYXQiLCJhcmdzIjpbIi11Il0sImRpciI6IiJ9").unwrap();
        assert_eq!(decoded.cmd, "cat");
        assert_eq!(decoded.args, ["-u"]);
        assert!(decoded.command_spec().dir.is_none());
    }

    #[test]
    fn test_missing_fields_default() {
        let encoded = BASE64.encode(br#"{"cmd":"convert"}"#);
        let decoded = FuzzOptions::decode(&encoded).unwrap();
        assert!(decoded.args.is_empty());
        assert!(decoded.dir.is_empty());
    }

    #[test]
    fn test_rejects() {
        struct TestCase {
            name:    &'static str,
            encoded: String,
            check:   fn(&ConfigError) -> bool,
        }

        let cases = [
            TestCase {
                name:    "empty command",
                encoded: BASE64.encode(br#"{"cmd":"","args":["x"]}"#),
                check:   |e| matches!(e, ConfigError::EmptyCommand),
            },
            TestCase {
                name:    "not base64",
                encoded: "not base64!".to_owned(),
                check:   |e| matches!(e, ConfigError::Base64(_)),
            },
            TestCase {
                name:    "not json",
                encoded: BASE64.encode(b"cmd=convert"),
                check:   |e| matches!(e, ConfigError::Json(_)),
            },
        ];

        for case in &cases {
            let err = FuzzOptions::decode(&case.encoded).unwrap_err();
            assert!((case.check)(&err), "{}: got {err}", case.name);
        }

        assert!(matches!(FuzzOptions::default().encode(), Err(ConfigError::EmptyCommand)));
    }

    #[test]
    fn test_command_spec_round_trip() {
        let spec = CommandSpec::new("convert").arg("--utc").current_dir("/srv");
        let options = FuzzOptions::from(&spec);
        assert_eq!(options.dir, "/srv");
        assert_eq!(options.command_spec(), spec);
    }
}
