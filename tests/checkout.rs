mod common;

use common::{TestEnv, commit_file, git, git_stdout, slow_fetch_git, stderr, stdout, write_snapshot};
use std::fs;
use std::time::{Duration, Instant};

#[test]
fn head_on_main_clones_and_checks_out_tip() {
    let env = TestEnv::new();
    let work = env.path("work");

    let output = env.checkout(&work, &["--commit", "HEAD"]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), env.tip);
    assert_eq!(git_stdout(&work, &["rev-parse", "HEAD"]), env.tip);
    assert_eq!(fs::read_to_string(work.join("lib.txt")).unwrap(), "v2\n");
}

#[test]
fn missing_commit_is_stale_reference() {
    let env = TestEnv::new();
    let work = env.path("work");
    let stale = "a".repeat(40);

    let output = env.checkout(&work, &["--commit", &stale]);

    assert_eq!(output.status.code(), Some(116), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("force-pushed"));
}

#[test]
fn malformed_commit_fails_before_touching_disk() {
    let env = TestEnv::new();
    let work = env.path("work");

    let output = env.checkout(&work, &["--commit", "abc123"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(!work.exists());
}

#[test]
fn missing_branch_is_config_error() {
    let env = TestEnv::new();
    let work = env.path("work");

    let output = std::process::Command::new(common::reposync_binary())
        .args(["checkout", "--repo", env.origin_url(), "--dir"])
        .arg(&work)
        .env_remove("REPOSYNC_BRANCH")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("branch"));
}

#[test]
fn fetch_timeout_reports_override_status() {
    let env = TestEnv::new();
    let work = env.path("work");
    let slow_git = slow_fetch_git(env.temp_dir.path());

    let started = Instant::now();
    let output = env.checkout(
        &work,
        &["--remote-timeout", "1", "--git", slow_git.to_str().unwrap()],
    );

    assert_eq!(output.status.code(), Some(110), "stderr: {}", stderr(&output));
    assert!(started.elapsed() < Duration::from_secs(20));
}

#[test]
fn fetch_timeout_honours_custom_status() {
    let env = TestEnv::new();
    let work = env.path("work");
    let slow_git = slow_fetch_git(env.temp_dir.path());

    let output = env.checkout(
        &work,
        &[
            "--remote-timeout",
            "1",
            "--remote-timeout-exit-code",
            "75",
            "--git",
            slow_git.to_str().unwrap(),
        ],
    );

    assert_eq!(output.status.code(), Some(75), "stderr: {}", stderr(&output));
}

#[test]
fn pinned_commit_is_checked_out_on_reused_repository() {
    let env = TestEnv::new();
    let work = env.path("work");
    assert_eq!(env.checkout(&work, &[]).status.code(), Some(0));

    fs::write(work.join("README.md"), "local edit\n").unwrap();
    fs::write(work.join("untracked.txt"), "junk\n").unwrap();

    let output = env.checkout(&work, &["--commit", &env.first_commit]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), env.first_commit);
    assert_eq!(
        fs::read_to_string(work.join("README.md")).unwrap(),
        "# Test Project\n"
    );
    assert!(!work.join("untracked.txt").exists());
    assert!(!work.join("lib.txt").exists());
    assert!(git_stdout(&work, &["status", "--porcelain"]).is_empty());
}

#[test]
fn floating_checkout_picks_up_new_commits() {
    let env = TestEnv::new();
    let work = env.path("work");
    assert_eq!(env.checkout(&work, &[]).status.code(), Some(0));

    let new_tip = commit_file(&env.origin, "lib.txt", "v3\n", "Third commit");
    let output = env.checkout(&work, &[]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), new_tip);
}

#[test]
fn force_clean_replaces_existing_directory() {
    let env = TestEnv::new();
    let work = env.path("work");
    fs::create_dir_all(&work).unwrap();
    fs::write(work.join("garbage.bin"), "garbage").unwrap();

    let output = env.checkout(&work, &["--force-clean"]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(!work.join("garbage.bin").exists());
    assert_eq!(git_stdout(&work, &["rev-parse", "HEAD"]), env.tip);
}

#[test]
fn locked_index_restores_from_newest_snapshot() {
    let env = TestEnv::new();

    // A snapshot taken from a mirror: its origin points somewhere else.
    let seed = env.path("seed");
    git(env.temp_dir.path(), &["clone", "--quiet", env.origin_url(), "seed"]);
    git(&seed, &["remote", "set-url", "origin", "/nonexistent/mirror.git"]);

    let bucket = env.path("bucket");
    fs::create_dir_all(&bucket).unwrap();
    fs::write(bucket.join("snap-2024-01-01.tar.gz"), "not an archive").unwrap();
    write_snapshot(&seed, &bucket.join("snap-2024-06-01.tar.gz"));

    // A working copy left behind by a killed invocation.
    let work = env.path("work");
    assert_eq!(env.checkout(&work, &[]).status.code(), Some(0));
    fs::write(work.join(".git").join("index.lock"), "").unwrap();

    let output = env.checkout(&work, &["--cache-bucket", bucket.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("snap-2024-06-01.tar.gz"));
    assert!(!work.join(".git").join("index.lock").exists());
    assert_eq!(stdout(&output), env.tip);
    assert_eq!(
        git_stdout(&work, &["remote", "get-url", "origin"]),
        env.origin_url()
    );
}

#[test]
fn empty_cache_fails_with_restore_error() {
    let env = TestEnv::new();
    let bucket = env.path("bucket");
    fs::create_dir_all(&bucket).unwrap();
    let work = env.path("work");

    let output = env.checkout(&work, &["--cache-bucket", bucket.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("no snapshots"));
    assert!(work.exists());
    assert!(fs::read_dir(&work).unwrap().next().is_none());
}

#[test]
fn success_marker_written_for_job() {
    let env = TestEnv::new();
    let work = env.path("work");
    let markers = env.path("markers");

    let output = env.checkout(
        &work,
        &["--job-id", "build-7", "--marker-dir", markers.to_str().unwrap()],
    );

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let marker: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(markers.join("build-7.success")).unwrap())
            .unwrap();
    assert_eq!(marker["job_id"], "build-7");
    assert_eq!(marker["commit"], env.tip.as_str());
    assert_eq!(marker["branch"], "main");
}

#[test]
fn no_marker_on_failure() {
    let env = TestEnv::new();
    let work = env.path("work");
    let markers = env.path("markers");
    let stale = "b".repeat(40);

    let output = env.checkout(
        &work,
        &[
            "--commit",
            &stale,
            "--job-id",
            "build-8",
            "--marker-dir",
            markers.to_str().unwrap(),
        ],
    );

    assert_eq!(output.status.code(), Some(116));
    assert!(!markers.join("build-8.success").exists());
}
