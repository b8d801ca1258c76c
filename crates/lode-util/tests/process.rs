use lode_util::process::CommandBuilder;

#[cfg(unix)]
#[test]
fn test_exec_stdout_trims_output() {
    let out = CommandBuilder::new("echo").arg("hello").exec_stdout().unwrap();
    assert_eq!(out, "hello");
}

#[cfg(unix)]
#[test]
fn test_exec_stdout_fails_on_nonzero_status() {
    let err = CommandBuilder::new("sh")
        .args(["-c", "echo boom >&2; exit 3"])
        .exec_stdout()
        .unwrap_err();
    assert!(err.to_string().contains("boom"), "got: {err}");
}

#[cfg(unix)]
#[test]
fn test_env_and_cwd_are_applied() {
    let tmp = tempfile::TempDir::new().unwrap();
    let out = CommandBuilder::new("sh")
        .args(["-c", "echo $LODE_TEST_VAR; pwd"])
        .env("LODE_TEST_VAR", "present")
        .cwd(tmp.path())
        .exec_stdout()
        .unwrap();
    assert!(out.starts_with("present"));
}

#[test]
fn test_missing_program_is_io_error() {
    let result = CommandBuilder::new("definitely-not-a-real-program-xyz").exec();
    assert!(result.is_err());
}
