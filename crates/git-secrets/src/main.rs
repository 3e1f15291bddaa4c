//! git-secrets - encrypted secrets and config for a git repository
//!
//! Commands:
//! - init <NAME>: Create a .git-secrets.json decrypting via global secret NAME
//! - info: Show contexts, configs and secrets of the selected context
//! - get config|secret <NAME>: Print a config value or decoded secret
//! - set config|secret <NAME>: Write a config value or encrypted secret
//! - encode / decode: Encrypt or decrypt a single value
//! - add context|file: Add a context or a file to a render target
//! - render [TARGET...]: Render templates with the selected context
//! - global-secret [NAME [VALUE]]: Manage the global AES keys
//! - scan: Search staged files for leaked secrets

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use git_secrets::repository::{CliOverrides, ConfigWriter, FileToRender, Repository};
use git_secrets::scan::{decode_all_secrets, default_workers, git_files, scan_files};
use git_secrets::{parse_repository, write_initial_config, RenderingEngine, SecretOverrides};
use gitsecrets_core::format::table;
use gitsecrets_core::paths::{find_project_file, PROJECT_FILE_NAME};
use gitsecrets_core::{ConfigError, GlobalConfig, Paths};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "git-secrets")]
#[command(about = "Encrypted per-project secrets and config with context inheritance and file rendering")]
#[command(version)]
#[command(after_help = r#"CONTEXTS:
    Every document has a 'default' context. Other contexts (e.g. prod)
    may override secrets and configs that 'default' declares:
      git-secrets add context prod
      git-secrets set config databaseHost db.prod -c prod

KEYS:
    AES keys are 16, 24 or 32 bytes. They come from a global secret
    (decryptSecret.fromName) or an environment variable (fromEnv):
      git-secrets global-secret myproject "$(pwgen -c 32 -n -s 1)"

TEMPLATES:
    DATABASE_HOST={{ .Configs.databaseHost }}
    DATABASE_PASSWORD={{ .Secrets.databasePassword | Base64Encode }}"#)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct GlobalArgs {
    /// Project document (default: .git-secrets.json in this or a parent directory)
    #[arg(short = 'f', long = "file", global = true)]
    file: Option<PathBuf>,

    /// Context to work with
    #[arg(short = 'c', long, global = true, default_value = "default")]
    context: String,

    /// Use this AES key for every context
    #[arg(long, global = true)]
    secret: Option<String>,

    /// Use this global secret for every context
    #[arg(long, global = true)]
    secret_name: Option<String>,

    /// Read the AES key of every context from this environment variable
    #[arg(long, global = true)]
    secret_env: Option<String>,

    /// Override a global secret for this run (NAME=VALUE, repeatable)
    #[arg(long = "global-secret", global = true, value_parser = parse_key_val)]
    global_secrets: Vec<(String, String)>,

    /// Global key store (default: <config dir>/git-secrets/config.yaml)
    #[arg(long, global = true)]
    global_config: Option<PathBuf>,

    /// Debug logging; scan also lists the files it reads
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a .git-secrets.json decrypting via a global secret
    Init {
        /// Name of the global secret holding the AES key
        name: String,
    },

    /// Show contexts, configs and secrets of the selected context
    Info {
        /// Also show decoded secret values
        #[arg(short, long)]
        decode: bool,
    },

    /// Print a config value or a decoded secret
    Get {
        #[command(subcommand)]
        entry: GetCommands,
    },

    /// Write a config value or an encrypted secret
    Set {
        #[command(subcommand)]
        entry: SetCommands,
    },

    /// Encrypt a value with the key of the selected context
    Encode {
        /// Value to encrypt (omit for hidden prompt)
        value: Option<String>,
    },

    /// Decrypt a base64 value with the key of the selected context
    Decode {
        value: String,
    },

    /// Add a context or a file to render
    Add {
        #[command(subcommand)]
        entry: AddCommands,
    },

    /// Render templates with the values of the selected context
    Render {
        /// Render targets to render (default: all)
        #[arg(conflicts_with = "file_in")]
        targets: Vec<String>,

        /// Print the rendering context and output instead of writing files
        #[arg(long)]
        dry_run: bool,

        /// Render a single template (requires --file-out)
        #[arg(short = 'i', long, requires = "file_out")]
        file_in: Option<PathBuf>,

        /// Output of the single template (requires --file-in)
        #[arg(short = 'o', long, requires = "file_in")]
        file_out: Option<PathBuf>,
    },

    /// List, print or set global AES keys
    #[command(alias = "global-secrets")]
    GlobalSecret {
        /// Secret name
        name: Option<String>,
        /// New AES key (16, 24 or 32 bytes)
        value: Option<String>,
        /// Overwrite an existing secret
        #[arg(long)]
        force: bool,
    },

    /// Search staged files for plaintext secrets
    Scan {
        /// Scan every tracked file instead of staged ones
        #[arg(short, long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum GetCommands {
    /// Print a config value
    Config { name: String },
    /// Print a decoded secret
    Secret { name: String },
}

#[derive(Subcommand)]
enum SetCommands {
    /// Write a config value to the selected context
    Config {
        name: String,
        value: String,
        /// Overwrite an existing value
        #[arg(long)]
        force: bool,
    },
    /// Encrypt and write a secret to the selected context
    Secret {
        name: String,
        /// Value to encrypt (insecure, omit for hidden prompt)
        #[arg(long)]
        value: Option<String>,
        /// Overwrite an existing value
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum AddCommands {
    /// Add an empty context
    Context { name: String },
    /// Add a template to a render target
    File {
        file_in: String,
        file_out: String,
        /// Render target to add the file to
        #[arg(short, long)]
        target: String,
    },
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("missing name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let args = cli.global;
    let paths = match &args.global_config {
        Some(path) => Paths::new().with_global_config(path.clone()),
        None => Paths::new(),
    };

    match cli.command {
        Commands::Init { name } => cmd_init(&args, &name),
        Commands::GlobalSecret { name, value, force } => {
            cmd_global_secret(&paths, name.as_deref(), value.as_deref(), force)
        }
        command => {
            let mut repo = load_repository(&args, &paths)?;
            run(command, &mut repo, &args)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands, repo: &mut Repository, args: &GlobalArgs) -> Result<()> {
    match command {
        Commands::Info { decode } => cmd_info(repo, decode),
        Commands::Get { entry } => match entry {
            GetCommands::Config { name } => cmd_get_config(repo, &name),
            GetCommands::Secret { name } => cmd_get_secret(repo, &name),
        },
        Commands::Set { entry } => match entry {
            SetCommands::Config { name, value, force } => cmd_set_config(repo, &name, &value, force),
            SetCommands::Secret { name, value, force } => cmd_set_secret(repo, &name, value, force),
        },
        Commands::Encode { value } => cmd_encode(repo, value),
        Commands::Decode { value } => cmd_decode(repo, &value),
        Commands::Add { entry } => match entry {
            AddCommands::Context { name } => cmd_add_context(repo, &name),
            AddCommands::File {
                file_in,
                file_out,
                target,
            } => cmd_add_file(repo, &target, &file_in, &file_out),
        },
        Commands::Render {
            targets,
            dry_run,
            file_in,
            file_out,
        } => {
            let single = file_in.zip(file_out).map(|(i, o)| FileToRender::new(i, o));
            cmd_render(repo, &targets, single, dry_run)
        }
        Commands::Scan { all } => cmd_scan(repo, all, args.verbose),
        Commands::Init { .. } | Commands::GlobalSecret { .. } => {
            bail!("this command does not use a project document")
        }
    }
}

/// The project document: --file, or the nearest .git-secrets.json upwards
fn project_file(args: &GlobalArgs) -> Result<PathBuf> {
    let path = match &args.file {
        Some(path) => path.clone(),
        None => {
            let cwd = env::current_dir()?;
            find_project_file(&cwd).with_context(|| {
                format!(
                    "no {} found in {} or any parent directory, create one with 'git-secrets init <secret-name>'",
                    PROJECT_FILE_NAME,
                    cwd.display()
                )
            })?
        }
    };
    Ok(fs::canonicalize(&path).unwrap_or(path))
}

fn load_global_config(paths: &Paths) -> Result<GlobalConfig> {
    GlobalConfig::load_from(&paths.global_config).with_context(|| {
        format!(
            "could not load global config {}",
            paths.global_config.display()
        )
    })
}

fn load_repository(args: &GlobalArgs, paths: &Paths) -> Result<Repository> {
    let global = Arc::new(load_global_config(paths)?);
    let overrides: Arc<SecretOverrides> = Arc::new(args.global_secrets.iter().cloned().collect());

    let file = project_file(args)?;
    let mut repo = parse_repository(&file, Arc::clone(&global), Arc::clone(&overrides))
        .with_context(|| format!("could not load {}", file.display()))?;

    let cli = CliOverrides {
        secret: args.secret.clone(),
        secret_name: args.secret_name.clone(),
        secret_env: args.secret_env.clone(),
    };
    if let Some(resolver) = cli.resolver(&overrides, &global) {
        repo.override_resolver(resolver);
    }

    repo.set_selected_context(&args.context)?;
    Ok(repo)
}

fn prompt_value() -> Result<String> {
    let value =
        rpassword::prompt_password("Value to encode: ").context("Failed to read value")?;
    if value.is_empty() {
        bail!("Empty value not allowed");
    }
    Ok(value)
}

fn current_name(repo: &Repository) -> Result<String> {
    Ok(repo.current()?.name().to_string())
}

/// Create the project document
fn cmd_init(args: &GlobalArgs, secret_name: &str) -> Result<()> {
    let path = match &args.file {
        Some(path) => path.clone(),
        None => env::current_dir()?.join(PROJECT_FILE_NAME),
    };

    write_initial_config(&path, secret_name)?;

    println!("success: Created {}", path.display());
    println!();
    println!("The default context decrypts with the global secret '{}'.", secret_name);
    println!("If it does not exist yet, create it with:");
    println!("  git-secrets global-secret {} <16, 24 or 32 byte key>", secret_name);

    Ok(())
}

/// Show the selected context
fn cmd_info(repo: &Repository, decode: bool) -> Result<()> {
    let names: Vec<&str> = repo.contexts().iter().map(|c| c.name()).collect();
    let current = current_name(repo)?;

    if let Some(file) = repo.config_file_used() {
        println!(
            "Config File: {} (Version: {})",
            file.display(),
            repo.config_version()
        );
    }
    println!("Available Contexts: {}", names.join(", "));
    println!("Selected Context: {}", current);
    println!();

    let mut configs = repo.current_configs()?;
    configs.sort_by(|a, b| a.name.cmp(&b.name));
    if !configs.is_empty() {
        let rows: Vec<Vec<String>> = configs
            .iter()
            .map(|c| vec![c.name.clone(), c.value.clone(), c.origin_context.clone()])
            .collect();
        print!(
            "{}",
            table(&["Config Key", "Config Value", "Origin Context"], &rows)
        );
        println!();
    }

    let mut secrets = repo.current_secrets()?;
    secrets.sort_by(|a, b| a.name.cmp(&b.name));
    if !secrets.is_empty() {
        let mut rows = Vec::new();
        for secret in secrets {
            let mut row = vec![secret.name.clone(), secret.origin_context.clone()];
            if decode {
                match repo.decode_secret(secret) {
                    Ok(value) => row.push(value),
                    Err(e) => {
                        println!("warning: {}", e);
                        continue;
                    }
                }
            }
            rows.push(row);
        }

        let headers: &[&str] = if decode {
            &["Secret Name", "Origin Context", "Decoded Value"]
        } else {
            &["Secret Name", "Origin Context"]
        };
        print!("{}", table(headers, &rows));
        println!();

        if !decode {
            println!("info: Use --decode to show the decoded secrets");
        }
    }

    if !repo.render_targets().is_empty() {
        println!("Render Targets: {}", repo.render_target_names().join(", "));
    }

    Ok(())
}

fn cmd_get_config(repo: &Repository, name: &str) -> Result<()> {
    let Some(config) = repo.current_config(name)? else {
        bail!(
            "the config entry {} does not exist on context {}",
            name,
            current_name(repo)?
        );
    };
    println!("{}", config.value);
    Ok(())
}

fn cmd_get_secret(repo: &Repository, name: &str) -> Result<()> {
    let Some(secret) = repo.current_secret(name)? else {
        bail!(
            "the secret {} does not exist on context {}",
            name,
            current_name(repo)?
        );
    };
    println!("{}", repo.decode_secret(secret)?);
    Ok(())
}

fn cmd_set_config(repo: &mut Repository, name: &str, value: &str, force: bool) -> Result<()> {
    let context = current_name(repo)?;
    repo.writer_mut()?.set_config(&context, name, value, force)?;

    println!("success: Config entry {} written to context {}", name, context);
    println!("Resolve the value: git-secrets get config {}", name);
    println!("Use it in a template: {{{{ .Configs.{} }}}}", name);
    Ok(())
}

fn cmd_set_secret(
    repo: &mut Repository,
    name: &str,
    value: Option<String>,
    force: bool,
) -> Result<()> {
    let value = match value {
        Some(v) => v,
        None => prompt_value()?,
    };

    let context = current_name(repo)?;
    let encoded = repo.current()?.encode_value(&value)?;
    repo.writer_mut()?.set_secret(&context, name, &encoded, force)?;

    println!("success: Secret {} written to context {}", name, context);
    println!("Resolve the decoded value: git-secrets get secret {}", name);
    println!("Use it in a template: {{{{ .Secrets.{} }}}}", name);
    Ok(())
}

fn cmd_encode(repo: &Repository, value: Option<String>) -> Result<()> {
    let value = match value {
        Some(v) => v,
        None => prompt_value()?,
    };
    println!("{}", repo.current()?.encode_value(&value)?);
    Ok(())
}

fn cmd_decode(repo: &Repository, value: &str) -> Result<()> {
    println!("{}", repo.current()?.decode_value(value)?);
    Ok(())
}

fn cmd_add_context(repo: &mut Repository, name: &str) -> Result<()> {
    repo.writer_mut()?.add_context(name)?;

    println!("success: Context {} added", name);
    println!("It uses the key of the default context unless you set decryptSecret on it.");
    Ok(())
}

fn cmd_add_file(repo: &mut Repository, target: &str, file_in: &str, file_out: &str) -> Result<()> {
    repo.writer_mut()?.add_file_to_render(target, file_in, file_out)?;

    println!("success: {} -> {} added to target {}", file_in, file_out, target);
    println!("Render it: git-secrets render {}", target);
    Ok(())
}

/// Files to render: the single given file, the named targets, or every
/// target plus the files declared on the selected context
fn files_to_render(
    repo: &Repository,
    targets: &[String],
    single: Option<FileToRender>,
) -> Result<Vec<FileToRender>> {
    if let Some(file) = single {
        return Ok(vec![file]);
    }

    let mut files = Vec::new();
    if targets.is_empty() {
        for target in repo.render_targets() {
            files.extend(target.files().iter().cloned());
        }
        files.extend(repo.current()?.files_to_render().iter().cloned());
    } else {
        for name in targets {
            files.extend(repo.render_target(name)?.files().iter().cloned());
        }
    }

    if files.is_empty() {
        bail!("nothing to render, add files with 'git-secrets add file <in> <out> --target <name>' or use --file-in and --file-out");
    }
    Ok(files)
}

fn cmd_render(
    repo: &Repository,
    targets: &[String],
    single: Option<FileToRender>,
    dry_run: bool,
) -> Result<()> {
    let files = files_to_render(repo, targets, single)?;
    let engine = RenderingEngine::new(repo);

    println!("info: Rendering as context {}", current_name(repo)?);
    println!();

    for file in &files {
        if dry_run {
            let (context, rendered) = engine.render_file(file)?;
            println!(
                "Would render {} to {}",
                file.file_in.display(),
                file.file_out.display()
            );
            println!("Available Variables:");
            println!("{}", serde_json::to_string_pretty(&context)?);
            println!();
            println!("{}", rendered);
        } else {
            engine
                .write_file(file)
                .with_context(|| format!("could not render {}", file.file_in.display()))?;
            println!("{} -> {}", file.file_in.display(), file.file_out.display());
        }
    }

    Ok(())
}

fn cmd_global_secret(
    paths: &Paths,
    name: Option<&str>,
    value: Option<&str>,
    force: bool,
) -> Result<()> {
    let mut global = load_global_config(paths)?;

    match (name, value) {
        (None, _) => {
            let keys = global.secret_keys();
            if keys.is_empty() {
                println!("No global secrets stored. Add one with: git-secrets global-secret <name> <value>");
            }
            for key in keys {
                println!("{}", key);
            }
        }
        (Some(name), None) => match global.secret(name) {
            Some(secret) => println!("{}", secret),
            None => bail!("the global secret {} does not exist", name),
        },
        (Some(name), Some(value)) => {
            match global.set_secret(name, value, force) {
                Err(e @ ConfigError::InvalidKeyLength(_)) => {
                    bail!("{}. hint: generate a key with 'pwgen -c 32 -n -s 1'", e)
                }
                other => other?,
            }
            println!(
                "success: Global secret {} written to {}",
                name.to_lowercase(),
                paths.global_config.display()
            );
        }
    }

    Ok(())
}

fn scan_root(repo: &Repository) -> Result<PathBuf> {
    match repo.config_file_used().and_then(Path::parent) {
        Some(dir) => Ok(dir.to_path_buf()),
        None => Ok(env::current_dir()?),
    }
}

fn cmd_scan(repo: &Repository, all: bool, verbose: bool) -> Result<()> {
    let start = Instant::now();

    let decoded = decode_all_secrets(repo);
    for error in &decoded.skipped {
        println!("warning: {}, skipping this secret", error);
    }

    let files = git_files(&scan_root(repo)?, all)?;
    if files.is_empty() {
        println!("info: No staged files found, use --all to scan all tracked files");
        return Ok(());
    }
    if verbose {
        for file in &files {
            println!("{}", file.display());
        }
        println!();
    }

    let report = scan_files(&files, &decoded.secrets, default_workers());

    for failure in &report.failures {
        println!("{} - error: {}", failure.file.display(), failure.error);
    }
    for leak in &report.leaks {
        println!(
            "{}:{} - secret {} from context {} is present",
            leak.file.display(),
            leak.line_number,
            leak.secret_name,
            leak.context
        );
        println!("> {} | {}", leak.line_number, leak.masked_line);
        println!();
    }

    let summary = format!(
        "Searched {} files for {} secrets in {:.2?}",
        report.files_scanned,
        decoded.secrets.len(),
        start.elapsed()
    );

    if !report.is_clean() {
        println!("{}", summary);
        bail!(
            "found {} leaked secrets and {} unreadable files",
            report.leaks.len(),
            report.failures.len()
        );
    }

    println!("success: No leaked secrets found");
    println!("{}", summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from(["git-secrets", "info", "--decode"]).unwrap();
        assert!(matches!(cli.command, Commands::Info { decode: true }));
        assert_eq!(cli.global.context, "default");

        let cli = Cli::try_parse_from(["git-secrets", "get", "secret", "databasePassword", "-c", "prod"])
            .unwrap();
        assert_eq!(cli.global.context, "prod");
        match cli.command {
            Commands::Get {
                entry: GetCommands::Secret { name },
            } => assert_eq!(name, "databasePassword"),
            _ => panic!("Expected get secret"),
        }

        let cli = Cli::try_parse_from([
            "git-secrets",
            "set",
            "secret",
            "token",
            "--value",
            "abc",
            "--force",
        ])
        .unwrap();
        match cli.command {
            Commands::Set {
                entry: SetCommands::Secret { name, value, force },
            } => {
                assert_eq!(name, "token");
                assert_eq!(value.as_deref(), Some("abc"));
                assert!(force);
            }
            _ => panic!("Expected set secret"),
        }
    }

    #[test]
    fn test_global_secret_overrides() {
        let cli = Cli::try_parse_from([
            "git-secrets",
            "--global-secret",
            "proj=aju1ZieThohngii4eem4saeCh2fieral",
            "--global-secret",
            "other=a=b",
            "info",
        ])
        .unwrap();
        assert_eq!(
            cli.global.global_secrets,
            vec![
                ("proj".to_string(), "aju1ZieThohngii4eem4saeCh2fieral".to_string()),
                ("other".to_string(), "a=b".to_string()),
            ]
        );

        assert!(Cli::try_parse_from(["git-secrets", "--global-secret", "novalue", "info"]).is_err());
    }

    #[test]
    fn test_render_args() {
        let cli = Cli::try_parse_from(["git-secrets", "render", "env", "k8s", "--dry-run"]).unwrap();
        match cli.command {
            Commands::Render {
                targets, dry_run, ..
            } => {
                assert_eq!(targets, vec!["env", "k8s"]);
                assert!(dry_run);
            }
            _ => panic!("Expected render"),
        }

        assert!(Cli::try_parse_from(["git-secrets", "render", "-i", "a.tpl"]).is_err());
        assert!(Cli::try_parse_from(["git-secrets", "render", "-i", "a.tpl", "-o", "a"]).is_ok());
        assert!(
            Cli::try_parse_from(["git-secrets", "render", "env", "-i", "a.tpl", "-o", "a"]).is_err()
        );
    }

    #[test]
    fn test_global_secret_alias() {
        let cli = Cli::try_parse_from(["git-secrets", "global-secrets"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::GlobalSecret { name: None, value: None, force: false }
        ));
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("a=b").unwrap(),
            ("a".to_string(), "b".to_string())
        );
        assert!(parse_key_val("=b").is_err());
        assert!(parse_key_val("ab").is_err());
    }
}
