//! Leak scanner
//!
//! Decodes every secret of every context and searches files for the
//! plaintext values. Files are split across a fixed number of worker
//! threads; the decoded secrets are shared read-only between them.

use gitsecrets_core::format::mask_all;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use tracing::{debug, error, warn};

use crate::error::{Result, SecretsError};
use crate::repository::Repository;

/// A secret in plaintext, with where it was declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSecret {
    pub name: String,
    pub context: String,
    pub value: String,
}

/// Secrets that decoded, and the errors of those that did not
#[derive(Debug, Default)]
pub struct DecodedSecrets {
    pub secrets: Vec<DecodedSecret>,
    pub skipped: Vec<SecretsError>,
}

/// Decode all secrets of all contexts. Failures are collected, not fatal.
pub fn decode_all_secrets(repository: &Repository) -> DecodedSecrets {
    let mut decoded = DecodedSecrets::default();

    for context in repository.contexts() {
        for secret in repository.secrets_by_context(context.name()) {
            match repository.decode_secret(secret) {
                // an empty value would match every line
                Ok(value) if value.is_empty() => {
                    debug!(secret = %secret.name, context = context.name(), "skipping empty secret");
                }
                Ok(value) => decoded.secrets.push(DecodedSecret {
                    name: secret.name.clone(),
                    context: context.name().to_string(),
                    value,
                }),
                Err(e) => {
                    warn!(secret = %secret.name, context = context.name(), error = %e, "could not decode secret, skipping");
                    decoded.skipped.push(e);
                }
            }
        }
    }

    decoded
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leak {
    pub file: PathBuf,
    pub line_number: usize,
    pub secret_name: String,
    pub context: String,
    /// The offending line with the secret replaced by asterisks
    pub masked_line: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFailure {
    pub file: PathBuf,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub files_scanned: usize,
    pub leaks: Vec<Leak>,
    pub failures: Vec<ScanFailure>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.leaks.is_empty() && self.failures.is_empty()
    }

    fn merge(&mut self, other: ScanReport) {
        self.files_scanned += other.files_scanned;
        self.leaks.extend(other.leaks);
        self.failures.extend(other.failures);
    }
}

/// Number of scan workers when none is configured
pub fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Scan `files` for any of `secrets` using at most `workers` threads
pub fn scan_files(files: &[PathBuf], secrets: &[DecodedSecret], workers: usize) -> ScanReport {
    run_chunks(files, workers, |chunk| scan_chunk(chunk, secrets))
}

/// Split `files` across `workers` scoped threads and merge their reports.
///
/// Files of a worker that panicked are reported as failures, so a lost
/// chunk never reads as clean.
fn run_chunks<F>(files: &[PathBuf], workers: usize, scan: F) -> ScanReport
where
    F: Fn(&[PathBuf]) -> ScanReport + Sync,
{
    let workers = workers.max(1);
    let chunk_size = files.len().div_ceil(workers).max(1);
    let scan = &scan;

    let mut report = ScanReport::default();
    thread::scope(|scope| {
        let handles: Vec<_> = files
            .chunks(chunk_size)
            .map(|chunk| (chunk, scope.spawn(move || scan(chunk))))
            .collect();

        for (chunk, handle) in handles {
            match handle.join() {
                Ok(partial) => report.merge(partial),
                Err(_) => {
                    error!(files = chunk.len(), "scan worker panicked");
                    report.failures.extend(chunk.iter().map(|file| ScanFailure {
                        file: file.clone(),
                        error: "scan worker panicked".to_string(),
                    }));
                }
            }
        }
    });

    report.leaks.sort_by(|a, b| {
        a.file
            .cmp(&b.file)
            .then(a.line_number.cmp(&b.line_number))
            .then(a.secret_name.cmp(&b.secret_name))
    });
    report.failures.sort_by(|a, b| a.file.cmp(&b.file));
    report
}

fn scan_chunk(files: &[PathBuf], secrets: &[DecodedSecret]) -> ScanReport {
    let mut report = ScanReport::default();
    for file in files {
        match fs::read(file) {
            Ok(bytes) => {
                report.files_scanned += 1;
                let content = String::from_utf8_lossy(&bytes);
                report.leaks.extend(scan_content(file, &content, secrets));
            }
            Err(e) => report.failures.push(ScanFailure {
                file: file.clone(),
                error: format!("open file error: {}", e),
            }),
        }
    }
    report
}

fn scan_content(file: &Path, content: &str, secrets: &[DecodedSecret]) -> Vec<Leak> {
    let mut leaks = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let found: Vec<&DecodedSecret> = secrets
            .iter()
            .filter(|s| !s.value.is_empty() && line.contains(&s.value))
            .collect();
        if found.is_empty() {
            continue;
        }

        // every secret on the line is hidden in each report
        let masked_line = mask_all(line, found.iter().map(|s| s.value.as_str()));
        leaks.extend(found.into_iter().map(|secret| Leak {
            file: file.to_path_buf(),
            line_number: idx + 1,
            secret_name: secret.name.clone(),
            context: secret.context.clone(),
            masked_line: masked_line.clone(),
        }));
    }
    leaks
}

fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| SecretsError::Git(format!("could not run git: {}", e)))?;

    if !output.status.success() {
        return Err(SecretsError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Paths of a NUL separated git listing (`-z`), joined onto `root`
fn parse_file_list(output: &str, root: &Path) -> Vec<PathBuf> {
    output
        .split('\0')
        .filter(|name| !name.is_empty())
        .map(|name| root.join(name))
        .collect()
}

/// Files staged for commit, or every tracked file when `all` is set
pub fn git_files(dir: &Path, all: bool) -> Result<Vec<PathBuf>> {
    let root = PathBuf::from(git(dir, &["rev-parse", "--show-toplevel"])?.trim());
    let listing = if all {
        git(&root, &["ls-files", "-z"])?
    } else {
        git(
            &root,
            &["diff", "--cached", "--name-only", "-z", "--diff-filter=ACM"],
        )?
    };
    Ok(parse_file_list(&listing, &root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::SecretResolver;
    use crate::repository::{Context, Secret};
    use tempfile::TempDir;

    const KEY: &str = "aju1ZieThohngii4eem4saeCh2fieral";

    fn secret(name: &str, value: &str) -> DecodedSecret {
        DecodedSecret {
            name: name.to_string(),
            context: "default".to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_decode_all_skips_failures() {
        let mut repo = Repository::new(1, None);
        let default = Context::new("default", SecretResolver::plain(KEY));
        let prod = Context::new("prod", SecretResolver::env("GIT_SECRETS_TEST_SCAN_UNSET"));

        let password = default.encode_value("hunter2").unwrap();
        let empty = default.encode_value("").unwrap();
        repo.add_context(default).unwrap();
        repo.add_context(prod).unwrap();
        repo.add_secret(Secret::new("password", password.clone(), "default"))
            .unwrap();
        repo.add_secret(Secret::new("empty", empty, "default")).unwrap();
        repo.add_secret(Secret::new("password", password, "prod")).unwrap();

        let decoded = decode_all_secrets(&repo);
        assert_eq!(decoded.secrets, vec![secret("password", "hunter2")]);
        assert_eq!(decoded.skipped.len(), 1);
        assert!(matches!(
            decoded.skipped[0].root(),
            SecretsError::Resolution(_)
        ));
    }

    #[test]
    fn test_scan_finds_and_masks_leaks() {
        let tmp = TempDir::new().unwrap();
        let clean = tmp.path().join("clean.txt");
        let leaky = tmp.path().join("leaky.env");
        fs::write(&clean, "nothing to see\n").unwrap();
        fs::write(&leaky, "HOST=localhost\nPASSWORD=hunter2 # hunter2\n").unwrap();

        let secrets = vec![secret("password", "hunter2"), secret("token", "abc123")];
        let report = scan_files(&[clean, leaky.clone()], &secrets, 2);

        assert_eq!(report.files_scanned, 2);
        assert!(!report.is_clean());
        assert_eq!(
            report.leaks,
            vec![Leak {
                file: leaky,
                line_number: 2,
                secret_name: "password".to_string(),
                context: "default".to_string(),
                masked_line: "PASSWORD=************ # ************".to_string(),
            }]
        );
    }

    #[test]
    fn test_scan_reports_unreadable_files() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("missing.txt");

        let report = scan_files(&[missing.clone()], &[secret("password", "hunter2")], 4);
        assert_eq!(report.files_scanned, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].file, missing);
    }

    #[test]
    fn test_scan_many_files_with_few_workers() {
        let tmp = TempDir::new().unwrap();
        let files: Vec<PathBuf> = (0..25)
            .map(|i| {
                let path = tmp.path().join(format!("file{i}.txt"));
                let content = if i % 5 == 0 { "secret=hunter2" } else { "clean" };
                fs::write(&path, content).unwrap();
                path
            })
            .collect();

        let report = scan_files(&files, &[secret("password", "hunter2")], 3);
        assert_eq!(report.files_scanned, 25);
        assert_eq!(report.leaks.len(), 5);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_scan_nothing() {
        let report = scan_files(&[], &[secret("password", "hunter2")], 0);
        assert!(report.is_clean());
        assert_eq!(report.files_scanned, 0);
    }

    #[test]
    fn test_empty_secret_never_matches() {
        let leaks = scan_content(Path::new("f"), "anything\n", &[secret("empty", "")]);
        assert!(leaks.is_empty());
    }

    #[test]
    fn test_parse_file_list() {
        let files = parse_file_list("src/main.rs\0 spaced name.env\0\0", Path::new("/repo"));
        assert_eq!(
            files,
            vec![
                PathBuf::from("/repo/src/main.rs"),
                PathBuf::from("/repo/ spaced name.env")
            ]
        );
    }

    #[test]
    fn test_two_secrets_on_one_line_both_masked() {
        let secrets = vec![secret("a", "hunter2"), secret("b", "s3cretToken")];
        let leaks = scan_content(Path::new("f.env"), "A=hunter2 B=s3cretToken\n", &secrets);

        assert_eq!(leaks.len(), 2);
        for leak in &leaks {
            assert_eq!(leak.masked_line, "A=************ B=************");
        }
        assert_eq!(leaks[0].secret_name, "a");
        assert_eq!(leaks[1].secret_name, "b");
    }

    #[test]
    fn test_panicked_worker_files_reported() {
        let files: Vec<PathBuf> = (0..4).map(|i| PathBuf::from(format!("f{i}"))).collect();

        let report = run_chunks(&files, 2, |chunk| {
            if chunk.iter().any(|f| f == Path::new("f3")) {
                panic!("worker failure");
            }
            ScanReport {
                files_scanned: chunk.len(),
                ..ScanReport::default()
            }
        });

        assert_eq!(report.files_scanned, 2);
        assert!(!report.is_clean());
        let failed: Vec<&PathBuf> = report.failures.iter().map(|f| &f.file).collect();
        assert_eq!(failed, vec![&files[2], &files[3]]);
    }

    fn run_git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    #[test]
    fn test_git_files_non_ascii_names() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        run_git(dir, &["init", "-q"]);
        run_git(dir, &["config", "user.email", "dev@example.com"]);
        run_git(dir, &["config", "user.name", "dev"]);
        run_git(dir, &["config", "core.quotePath", "true"]);

        fs::write(dir.join("größe.env"), "PASSWORD=hunter2\n").unwrap();
        run_git(dir, &["add", "größe.env"]);

        let staged = git_files(dir, false).unwrap();
        assert_eq!(staged.len(), 1);
        assert!(staged[0].ends_with("größe.env"));
        assert!(staged[0].is_file());

        let report = scan_files(&staged, &[secret("password", "hunter2")], 1);
        assert!(report.failures.is_empty());
        assert_eq!(report.leaks.len(), 1);

        run_git(dir, &["-c", "commit.gpgsign=false", "commit", "-q", "-m", "init"]);
        assert!(git_files(dir, false).unwrap().is_empty());
        let tracked = git_files(dir, true).unwrap();
        assert_eq!(tracked.len(), 1);
        assert!(tracked[0].is_file());
    }
}
