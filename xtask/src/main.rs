use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for Swarm")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: fmt, clippy, tests, shaders, deny, doc
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates, warnings denied
    Clippy,
    /// Run all tests
    Test,
    /// Validate the built-in WGSL shaders with naga
    Shaders,
    /// Run cargo deny check
    Deny,
    /// Build rustdoc for the workspace
    Doc,
    /// Build the entire workspace
    Build,
}

/// A cargo invocation with the banner printed before it runs.
struct Step {
    banner: &'static str,
    args: &'static [&'static str],
}

const FMT: Step = Step {
    banner: "cargo fmt --check",
    args: &["fmt", "--all", "--", "--check"],
};
const CLIPPY: Step = Step {
    banner: "cargo clippy",
    args: &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
};
const TEST: Step = Step {
    banner: "cargo test",
    args: &["test", "--workspace"],
};
const SHADERS: Step = Step {
    banner: "built-in shader validation",
    args: &["run", "--quiet", "-p", "swarm-cli", "--", "builtins"],
};
const DENY: Step = Step {
    banner: "cargo deny check (licenses bans sources)",
    args: &["deny", "check", "licenses", "bans", "sources"],
};
const DOC: Step = Step {
    banner: "cargo doc",
    args: &["doc", "--workspace", "--no-deps"],
};
const BUILD: Step = Step {
    banner: "cargo build",
    args: &["build", "--workspace"],
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let steps: &[&Step] = match cli.command {
        Commands::Check => &[&FMT, &CLIPPY, &TEST, &SHADERS, &DENY, &DOC],
        Commands::Fmt => &[&FMT],
        Commands::Clippy => &[&CLIPPY],
        Commands::Test => &[&TEST],
        Commands::Shaders => &[&SHADERS],
        Commands::Deny => &[&DENY],
        Commands::Doc => &[&DOC],
        Commands::Build => &[&BUILD],
    };
    for step in steps {
        run(step)?;
    }

    Ok(())
}

fn run(step: &Step) -> Result<()> {
    println!("==> Running {}", step.banner);
    let status = Command::new("cargo").args(step.args).status()?;
    if !status.success() {
        bail!("{} failed", step.banner);
    }
    Ok(())
}
