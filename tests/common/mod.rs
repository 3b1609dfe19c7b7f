#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Return the path to the compiled `reposync` binary.
pub fn reposync_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_reposync"))
}

/// Run a git command inside `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> Output {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .env("GIT_AUTHOR_NAME", "Test User")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test User")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {}: {}", args.join(" "), e));

    assert!(
        output.status.success(),
        "git command failed: git {}\nstdout: {}\nstderr: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

/// Run git and return trimmed stdout.
pub fn git_stdout(dir: &Path, args: &[&str]) -> String {
    String::from_utf8_lossy(&git(dir, args).stdout)
        .trim()
        .to_string()
}

/// Write `contents` to `name` in `repo` and commit it.
pub fn commit_file(repo: &Path, name: &str, contents: &str, message: &str) -> String {
    fs::write(repo.join(name), contents).unwrap();
    git(repo, &["add", name]);
    git(repo, &["commit", "-m", message]);
    git_stdout(repo, &["rev-parse", "HEAD"])
}

/// A scratch area holding an origin repository with two commits on `main`.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub origin: PathBuf,
    pub first_commit: String,
    pub tip: String,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let origin = temp_dir.path().join("origin");
        fs::create_dir_all(&origin).unwrap();

        git(&origin, &["init", "-b", "main"]);
        let first_commit = commit_file(&origin, "README.md", "# Test Project\n", "Initial commit");
        let tip = commit_file(&origin, "lib.txt", "v2\n", "Second commit");

        Self {
            temp_dir,
            origin,
            first_commit,
            tip,
        }
    }

    /// A path under the scratch area (not created).
    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    pub fn origin_url(&self) -> &str {
        self.origin.to_str().unwrap()
    }

    /// `reposync checkout` against this origin, with a fixed repo and branch.
    pub fn checkout(&self, work_dir: &Path, extra: &[&str]) -> Output {
        let mut cmd = Command::new(reposync_binary());
        cmd.arg("checkout")
            .arg("--repo")
            .arg(&self.origin)
            .arg("--branch")
            .arg("main")
            .arg("--dir")
            .arg(work_dir)
            .args(extra)
            .env("RUST_LOG", "info")
            .env_remove("GIT_LFS_SKIP_SMUDGE");
        for (key, _) in std::env::vars() {
            if key.starts_with("REPOSYNC_") {
                cmd.env_remove(key);
            }
        }
        cmd.output().unwrap()
    }
}

/// Write an executable `git` wrapper that sleeps instead of fetching.
pub fn slow_fetch_git(dir: &Path) -> PathBuf {
    let path = dir.join("slow-git");
    fs::write(
        &path,
        "#!/bin/sh\nfor arg in \"$@\"; do\n  if [ \"$arg\" = fetch ]; then\n    sleep 30\n    exit 0\n  fi\ndone\nexec git \"$@\"\n",
    )
    .unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Archive the contents of `src` as a `.tar.gz` snapshot at `dest`.
pub fn write_snapshot(src: &Path, dest: &Path) {
    let out = File::create(dest).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(out, Compression::fast()));
    builder.append_dir_all(".", src).unwrap();
    builder.into_inner().unwrap().finish().unwrap();
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
