//! `cargo xtask` for the rdbms-rs workspace.
//!
//! ```text
//! cargo xtask ci                 fmt check, clippy, tests
//! cargo xtask test [-p crate]    tests, or the mock-server sessions with --sessions
//! cargo xtask fuzz <target>      one libFuzzer target (cargo-fuzz, nightly)
//! cargo xtask bench [crate]      criterion benches
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

/// Targets under `fuzz/fuzz_targets`.
const FUZZ_TARGETS: &[&str] = &[
    "tokenizer",
    "decode_value",
    "parse_packet",
    "parse_prelogin",
    "parse_env_change",
    "dsn",
];

/// Crates that carry criterion benches.
const BENCHED: &[&str] = &["tds-protocol", "tds-codec", "rdbms-types", "rdbms-client"];

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace tasks for rdbms-rs")]
struct Cli {
    #[command(subcommand)]
    task: Task,
}

#[derive(Subcommand)]
enum Task {
    /// Formatting check, clippy with warnings denied, then every test
    Ci,
    /// Run tests
    Test {
        /// Only this package
        #[arg(short, long)]
        package: Option<String>,
        /// Only the end-to-end sessions against the mock TDS server
        #[arg(long, conflicts_with = "package")]
        sessions: bool,
    },
    /// Fuzz one target for a bounded time
    Fuzz {
        /// Target name
        target: String,
        /// Seconds to run
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },
    /// Run criterion benches
    Bench {
        /// Only this crate
        package: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(workspace_root()?);

    match cli.task {
        Task::Ci => {
            step("fmt", || cmd!(sh, "cargo fmt --all -- --check").run())?;
            step("clippy", || {
                cmd!(sh, "cargo clippy --workspace --all-features --all-targets -- -D warnings")
                    .run()
            })?;
            step("test", || cmd!(sh, "cargo test --workspace --all-features").run())?;
        }
        Task::Test { package, sessions } => {
            if sessions {
                step("sessions", || {
                    cmd!(sh, "cargo test -p rdbms-testing --test tds_session").run()
                })?;
            } else if let Some(p) = package {
                step("test", || cmd!(sh, "cargo test -p {p} --all-features").run())?;
            } else {
                step("test", || cmd!(sh, "cargo test --workspace --all-features").run())?;
            }
        }
        Task::Fuzz { target, seconds } => {
            if !FUZZ_TARGETS.contains(&target.as_str()) {
                bail!("no fuzz target '{target}'; known: {}", FUZZ_TARGETS.join(", "));
            }
            let _fuzz = sh.push_dir("fuzz");
            let limit = format!("-max_total_time={seconds}");
            step("fuzz", || cmd!(sh, "cargo +nightly fuzz run {target} -- {limit}").run())?;
        }
        Task::Bench { package } => {
            let crates: Vec<&str> = match package.as_deref() {
                Some(p) if BENCHED.contains(&p) => vec![p],
                Some(p) => bail!("{p} has no benches; known: {}", BENCHED.join(", ")),
                None => BENCHED.to_vec(),
            };
            for p in crates {
                step(p, || cmd!(sh, "cargo bench -p {p}").run())?;
            }
        }
    }
    Ok(())
}

fn step(name: &str, run: impl FnOnce() -> xshell::Result<()>) -> Result<()> {
    eprintln!("xtask: {name}");
    run().with_context(|| format!("{name} failed"))
}

fn workspace_root() -> Result<PathBuf> {
    let out = std::process::Command::new(env!("CARGO"))
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("cargo locate-project")?;
    let manifest = PathBuf::from(String::from_utf8(out.stdout)?.trim());
    manifest
        .parent()
        .map(PathBuf::from)
        .context("manifest has no parent directory")
}
