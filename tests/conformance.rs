use std::process::Command;

use tsdate_verify::fuzz::{self, FuzzConfig, FuzzFailure};
use tsdate_verify::runner::{self, MismatchKind};
use tsdate_verify::{BridgeError, CancelToken, CommandSpec, Corpus, Error, logging};

const REFERENCE: &str = env!("CARGO_BIN_EXE_reference-timestamp-to-date");

fn reference(args: &[&str]) -> CommandSpec {
    CommandSpec::new(REFERENCE).args(args.iter().copied())
}

#[test]
fn test_reference_command_conforms() {
    logging::init_for_tests();
    let corpus = Corpus::builtin().unwrap();
    let report = runner::verify_external(&reference(&[]), &corpus, &CancelToken::new()).unwrap();
    assert_eq!(report.cases, 1020);
    assert!(report.is_conformant(), "{}", report.mismatches[0]);
}

#[test]
fn test_offset_bug_is_reported() {
    logging::init_for_tests();
    let corpus = Corpus::builtin().unwrap();
    let report = runner::verify_external(&reference(&["--fault", "swap-offset"]), &corpus, &CancelToken::new()).unwrap();
    assert!(!report.mismatches.is_empty());
    assert!(
        report
            .mismatches
            .iter()
            .all(|m| matches!(m.kind, MismatchKind::WrongMatch { .. }))
    );
    assert!(matches!(report.into_result(), Err(Error::Nonconformant { .. })));
}

#[test]
fn test_protocol_error_aborts_run() {
    logging::init_for_tests();
    let corpus = Corpus::builtin().unwrap();
    let err = runner::verify_external(&reference(&["--fault", "malformed", "--after", "5"]), &corpus, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::Bridge(BridgeError::Protocol(_))), "{err}");
}

#[test]
fn test_fuzz_reference_command() {
    logging::init_for_tests();
    let corpus = Corpus::builtin().unwrap();
    let config = FuzzConfig {
        cases:       64,
        seed_corpus: false,
    };
    let summary = fuzz::fuzz_external(&reference(&[]), &corpus, config, &CancelToken::new()).unwrap();
    assert!(summary.random_cases > 0);
}

#[test]
fn test_fuzz_seed_corpus_catches_offset_bug() {
    logging::init_for_tests();
    let corpus = Corpus::builtin().unwrap();
    let config = FuzzConfig {
        cases:       0,
        seed_corpus: true,
    };
    let err = fuzz::fuzz_external(&reference(&["--fault", "swap-offset"]), &corpus, config, &CancelToken::new())
        .unwrap_err();
    assert!(
        matches!(err, Error::Falsified {
            failure: FuzzFailure::WrongMatch { .. } | FuzzFailure::Inverted { .. },
            ..
        }),
        "{err}"
    );
}

#[test]
fn test_verify_binary_exit_codes() {
    let verify = env!("CARGO_BIN_EXE_verify-timestamp-to-date");

    let ok = Command::new(verify).arg(REFERENCE).output().unwrap();
    assert!(ok.status.success(), "{}", String::from_utf8_lossy(&ok.stderr));

    let bad = Command::new(verify)
        .args([REFERENCE, "--fault", "swap-offset"])
        .output()
        .unwrap();
    assert!(!bad.status.success());
    let stderr = String::from_utf8_lossy(&bad.stderr);
    assert!(stderr.lines().any(|line| line.starts_with("ERROR: timestamp-to-date:")), "{stderr}");

    let usage = Command::new(verify).output().unwrap();
    assert_eq!(usage.status.code(), Some(2));
}
