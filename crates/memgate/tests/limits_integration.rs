//! Process-level contracts that can only be observed from outside: exit
//! statuses, which stream carries which diagnostic, and the recoverable
//! paths' markers. Each scenario binary runs in its own process, for every
//! thread/recovery configuration.

#[cfg(test)]
pub mod tests {
    use std::process::{Command, Output};

    use memgate::{EXIT_ALLOC_COUNT_EXCEEDED, EXIT_OUT_OF_MEMORY};

    const CONFIGS: [&str; 3] = ["", "single-thread", "size-header"];

    fn run_scenario(name: &str, features: &str) -> Output {
        let mut args = vec!["run", "-p", "test-limits", "--example", name];
        if !features.is_empty() {
            args.push("--features");
            args.push(features);
        }
        Command::new("cargo")
            .args(&args)
            .output()
            .expect("Failed to execute command")
    }

    fn assert_contains(haystack: &str, needle: &str, scenario: &str, features: &str) {
        assert!(
            haystack.contains(needle),
            "Expected [{features}] {scenario} to print:\n{needle}\n\nGot:\n{haystack}",
        );
    }

    #[test]
    fn byte_limit_breach_is_recoverable_and_sticky() {
        for features in CONFIGS {
            let output = run_scenario("oom_recoverable", features);
            assert!(
                output.status.success(),
                "Process did not exit successfully.\n\nstdout:\n{}\nstderr:\n{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            let stdout = String::from_utf8_lossy(&output.stdout);
            assert_contains(&stdout, "denied at block 3", "oom_recoverable", features);
            assert_contains(&stdout, "sticky flag set", "oom_recoverable", features);
            assert_contains(
                &stdout,
                "sticky flag survives re-initialize",
                "oom_recoverable",
                features,
            );
        }
    }

    #[test]
    fn fatal_oom_exits_101_with_the_message_on_stderr() {
        for features in CONFIGS {
            let output = run_scenario("oom_exit", features);
            assert_eq!(
                output.status.code(),
                Some(EXIT_OUT_OF_MEMORY),
                "stdout:\n{}\nstderr:\n{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            let stderr = String::from_utf8_lossy(&output.stderr);
            assert_contains(&stderr, "heap budget exhausted", "oom_exit", features);
            let stdout = String::from_utf8_lossy(&output.stdout);
            assert!(
                !stdout.contains("past the limit"),
                "the crossing allocation must not return: {stdout}"
            );
        }
    }

    #[test]
    fn fatal_oom_prints_the_default_message_when_unconfigured() {
        let output = run_scenario("oom_exit_default", "");
        assert_eq!(output.status.code(), Some(EXIT_OUT_OF_MEMORY));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert_contains(&stderr, "ERROR: out of memory", "oom_exit_default", "");
    }

    #[test]
    fn count_limit_exits_112_with_the_diagnostic_on_stdout() {
        for features in CONFIGS {
            let output = run_scenario("count_limit_fatal", features);
            assert_eq!(
                output.status.code(),
                Some(EXIT_ALLOC_COUNT_EXCEEDED),
                "stdout:\n{}\nstderr:\n{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            let stdout = String::from_utf8_lossy(&output.stdout);
            assert_contains(&stdout, "allocated block 3", "count_limit_fatal", features);
            assert_contains(
                &stdout,
                "allocation count limit 3 exceeded",
                "count_limit_fatal",
                features,
            );
            assert!(
                !stdout.contains("past the limit"),
                "the fourth allocation must terminate, not return: {stdout}"
            );
        }
    }

    #[test]
    fn free_triggered_merges_never_raise() {
        for features in CONFIGS {
            let output = run_scenario("free_merge_skips_limits", features);
            assert!(
                output.status.success(),
                "Process did not exit successfully.\n\nstdout:\n{}\nstderr:\n{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            let stdout = String::from_utf8_lossy(&output.stdout);
            assert_contains(
                &stdout,
                "free-triggered merge stayed silent",
                "free_merge_skips_limits",
                features,
            );
            assert_contains(
                &stdout,
                "allocating merge raised",
                "free_merge_skips_limits",
                features,
            );
        }
    }

    #[test]
    fn installed_adapter_denies_allocations_over_the_ceiling() {
        for features in CONFIGS {
            let output = run_scenario("adapter_denies_over_limit", features);
            assert!(
                output.status.success(),
                "Process did not exit successfully.\n\nstdout:\n{}\nstderr:\n{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            let stdout = String::from_utf8_lossy(&output.stdout);
            assert_contains(&stdout, "try_reserve denied", "adapter_denies_over_limit", features);
            assert_contains(&stdout, "sticky flag set", "adapter_denies_over_limit", features);
        }
    }
}
