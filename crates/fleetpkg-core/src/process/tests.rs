//! Tests for the process runner.

use super::*;

fn sh(script: &str) -> ToolCommand {
    ToolSpec::new("sh")
        .with_args(["-c", script])
        .command(Duration::from_secs(10))
}

mod tool_spec_tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Tools {
        single: ToolSpec,
        multi: ToolSpec,
    }

    #[test]
    fn deserializes_string_and_array_forms() {
        let tools: Tools = toml::from_str(
            r#"
            single = "apt-get"
            multi = ["sh", "/opt/fake-pdsh.sh"]
            "#,
        )
        .unwrap();
        assert_eq!(tools.single, ToolSpec::new("apt-get"));
        assert_eq!(tools.multi.program(), "sh");
        assert_eq!(
            Vec::<String>::from(tools.multi),
            vec!["sh".to_string(), "/opt/fake-pdsh.sh".to_string()]
        );
    }

    #[test]
    fn rejects_empty_command() {
        let result: Result<Tools, _> = toml::from_str(
            r#"
            single = []
            multi = ["pdsh"]
            "#,
        );
        assert!(result.is_err());
    }
}

mod run_tests {
    use super::*;

    #[test]
    fn captures_stdout_stderr_and_code() {
        let output = sh("echo out; echo err >&2; exit 3").run().unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.success());
    }

    #[test]
    fn run_checked_reports_failure() {
        let err = sh("echo broken >&2; exit 1").run_checked().unwrap_err();
        match err {
            ToolError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(1));
                assert!(stderr.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_program_is_not_found() {
        let err = ToolSpec::new("fleetpkg-definitely-missing-tool")
            .command(Duration::from_secs(1))
            .run()
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[test]
    fn slow_tool_times_out() {
        let err = ToolSpec::new("sh")
            .with_args(["-c", "sleep 5"])
            .command(Duration::from_millis(200))
            .run()
            .unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err}");
    }

    #[test]
    fn current_dir_applies_to_child_only() {
        let temp = tempfile::TempDir::new().unwrap();
        let before = std::env::current_dir().unwrap();
        let output = sh("pwd").current_dir(temp.path()).run_checked().unwrap();
        let reported = PathBuf::from(output.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            temp.path().canonicalize().unwrap()
        );
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn secret_env_reaches_child_but_not_debug() {
        let secret = Credential::new("s3cr3t");
        let command = sh("printf '%s' \"$FLEETPKG_TEST_SECRET\"").secret_env("FLEETPKG_TEST_SECRET", &secret);
        assert!(!format!("{command:?}").contains("s3cr3t"));
        assert!(!command.display().contains("s3cr3t"));
        let output = command.run_checked().unwrap();
        assert_eq!(output.stdout, "s3cr3t");
    }
}

mod retry_tests {
    use super::*;

    #[test]
    fn retries_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let mut calls = 0;
        let result: Result<u32, String> = policy.run(
            "flaky step",
            |attempt| {
                calls += 1;
                if attempt < 3 {
                    Err(format!("attempt {attempt} failed"))
                } else {
                    Ok(attempt)
                }
            },
            |_| true,
        );
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn stops_on_non_retryable_error() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let mut calls = 0;
        let result: Result<(), String> = policy.run(
            "step",
            |_| {
                calls += 1;
                Err("fatal".to_string())
            },
            |err| err != "fatal",
        );
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn gives_up_after_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let mut calls = 0;
        let result: Result<(), String> = policy.run(
            "step",
            |_| {
                calls += 1;
                Err("still down".to_string())
            },
            |_| true,
        );
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }
}
