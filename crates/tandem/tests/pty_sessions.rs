//! Integration tests for sessions on real pseudo-terminals.
//!
//! These tests start `/bin/sh` and a few coreutils, so they only run on Unix.

#![cfg(unix)]

use std::time::{Duration, Instant};

use tandem::{ExitStatus, ExpectError, Pattern, Session, SessionConfig, SessionState, TerminateConfig};

fn lit(s: &str) -> Pattern {
    Pattern::literal(s).unwrap()
}

fn quick_terminate() -> TerminateConfig {
    TerminateConfig::new()
        .grace(Duration::from_millis(300))
        .kill_grace(Duration::from_secs(2))
}

/// Test a shell prompt round trip.
///
/// The command text is chosen so that the terminal echo of the command
/// cannot satisfy the pattern; only the shell's evaluated output can.
#[tokio::test]
async fn shell_round_trip() {
    let mut session = Session::spawn("sh", SessionConfig::shell()).await.unwrap();
    assert!(session.state().is_running());
    assert!(session.pid() > 0);

    session.send("echo ab$((1 + 2))cd").await.unwrap();
    let m = session
        .expect(&[lit("ab3cd")], Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(m.matched, "ab3cd");

    session.send("exit").await.unwrap();
    let err = session
        .expect(&[lit("never printed")], Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(err.is_process_exited(), "{err}");
    assert_eq!(session.terminate().await.unwrap(), ExitStatus::Exited(0));
}

/// Test that a pattern split across two writes still matches.
#[tokio::test]
async fn match_spans_chunks() {
    let config = SessionConfig::new("/bin/sh")
        .args(["-c", "printf 'ab'; sleep 0.3; printf 'cd\\n'; sleep 5"])
        .terminate(quick_terminate());
    let mut session = Session::spawn("chunks", config).await.unwrap();

    let m = session
        .expect(&[lit("abcd")], Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(m.before, "");

    session.terminate().await.unwrap();
}

/// Test that expect gives up at its deadline and leaves the process alone.
#[tokio::test]
async fn timeout_is_bounded() {
    let config = SessionConfig::new("/bin/sh")
        .args(["-c", "echo waiting; sleep 30"])
        .terminate(quick_terminate());
    let mut session = Session::spawn("sleepy", config).await.unwrap();

    let started = Instant::now();
    let err = session
        .expect(&[lit("never printed")], Duration::from_millis(300))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout(), "{err}");
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
    assert!(err.buffer().unwrap_or_default().contains("waiting"));
    assert!(session.state().is_running());

    session.terminate().await.unwrap();
}

/// Test that the deadline holds while a process floods the terminal.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timeout_holds_under_continuous_output() {
    let config = SessionConfig::new("yes").terminate(quick_terminate());
    let mut session = Session::spawn("flood", config).await.unwrap();

    let started = Instant::now();
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        session.expect(&[lit("never printed")], Duration::from_secs(1)),
    )
    .await
    .expect("expect ignored its deadline");
    let elapsed = started.elapsed();

    let err = result.unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    assert!(err.buffer().unwrap_or_default().contains("y\r\n"));
    assert!(session.state().is_running());

    session.terminate().await.unwrap();
}

/// Test that an exit is reported even while a leftover background job keeps
/// the terminal open.
#[tokio::test]
async fn exit_seen_while_terminal_held_open() {
    let config = SessionConfig::new("/bin/sh").args(["-c", "trap '' HUP; sleep 4 & exit 3"]);
    let mut session = Session::spawn("orphan", config).await.unwrap();

    let started = Instant::now();
    let err = session
        .expect(&[lit("never printed")], Duration::from_secs(3))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(
        matches!(err, ExpectError::ProcessExited { status: ExitStatus::Exited(3), .. }),
        "{err}"
    );
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    assert_eq!(session.state(), SessionState::Terminated(ExitStatus::Exited(3)));
}

/// Test that a timeout too large for the clock waits for a match normally.
#[tokio::test]
async fn oversized_timeout_still_matches() {
    let mut session = Session::spawn("sh", SessionConfig::shell()).await.unwrap();

    session.send("echo big$((2 * 3))wait").await.unwrap();
    let m = tokio::time::timeout(
        Duration::from_secs(10),
        session.expect(&[lit("big6wait")], Duration::from_secs(u64::MAX / 2)),
    )
    .await
    .expect("no match within the outer bound")
    .unwrap();
    assert_eq!(m.matched, "big6wait");

    session.send("exit").await.unwrap();
    session.terminate().await.unwrap();
}

/// Test that output printed before exit is still matchable, and the exit is
/// reported once nothing else matches.
#[tokio::test]
async fn exit_after_output() {
    let config = SessionConfig::new("/bin/sh").args(["-c", "echo finished; exit 3"]);
    let mut session = Session::spawn("short", config).await.unwrap();

    session
        .expect(&[lit("finished")], Duration::from_secs(5))
        .await
        .unwrap();

    let err = session
        .expect(&[lit("more")], Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(
        matches!(err, ExpectError::ProcessExited { status: ExitStatus::Exited(3), .. }),
        "{err}"
    );
    assert_eq!(session.state(), SessionState::Terminated(ExitStatus::Exited(3)));
    assert!(session.send("hello").await.is_err());
}

/// Test that terminating twice returns the first status.
#[tokio::test]
async fn terminate_is_idempotent() {
    let config = SessionConfig::new("sleep")
        .args(["30"])
        .terminate(quick_terminate());
    let mut session = Session::spawn("sleeper", config).await.unwrap();

    let first = session.terminate().await.unwrap();
    let second = session.terminate().await.unwrap();
    assert_eq!(first, second);
    assert!(matches!(first, ExitStatus::Signaled(_)));
    assert!(!session.state().is_running());
}

/// Test escalation to SIGKILL when the program ignores polite signals.
#[tokio::test]
async fn stubborn_process_is_killed() {
    let config = SessionConfig::new("/bin/sh")
        .args(["-c", "trap '' HUP TERM; echo armed; while :; do sleep 1; done"])
        .terminate(quick_terminate());
    let mut session = Session::spawn("stubborn", config).await.unwrap();
    session
        .expect(&[lit("armed")], Duration::from_secs(5))
        .await
        .unwrap();

    let started = Instant::now();
    let status = session.terminate().await.unwrap();
    assert_eq!(status, ExitStatus::Signaled(sigkill()));
    assert!(started.elapsed() < Duration::from_secs(4));
}

/// Test that a program exiting on its exit command is never signaled.
#[tokio::test]
async fn exit_command_is_tried_first() {
    let config = SessionConfig::shell().terminate(quick_terminate().exit_command("exit 7"));
    let mut session = Session::spawn("polite", config).await.unwrap();

    let status = session.terminate().await.unwrap();
    assert_eq!(status, ExitStatus::Exited(7));
}

/// Test the ready pattern gate and its timeout.
#[tokio::test]
async fn ready_pattern_timeout_cleans_up() {
    let config = SessionConfig::new("/bin/sh")
        .args(["-c", "echo booting; sleep 30"])
        .ready(lit("ready>"))
        .ready_timeout(Duration::from_millis(300))
        .terminate(quick_terminate());

    let err = Session::spawn("never-ready", config).await.unwrap_err();
    assert!(err.is_timeout(), "{err}");
}

/// Test that a missing program is a spawn error.
#[tokio::test]
async fn missing_program_fails_to_spawn() {
    let config = SessionConfig::new("/nonexistent/tandem-no-such-binary");
    let err = Session::spawn("ghost", config).await.unwrap_err();
    assert!(matches!(err, ExpectError::Spawn(_)), "{err}");
}

/// Test regex captures on real output.
#[tokio::test]
async fn regex_captures_from_shell() {
    let mut session = Session::spawn("sh", SessionConfig::shell()).await.unwrap();

    session.send("echo port=$((4000 + 321))").await.unwrap();
    let m = session
        .expect(
            &[Pattern::regex(r"port=(?P<port>\d+)\r?\n").unwrap()],
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(m.group(1), Some("4321"));
    assert_eq!(m.name("port"), Some("4321"));

    session.terminate().await.unwrap();
}

const fn sigkill() -> i32 {
    tandem::PtySignal::Kill.as_unix_signal()
}
