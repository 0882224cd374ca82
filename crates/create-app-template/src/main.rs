//! create-app-template - Compose a project from a framework template and feature modules

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use launchpad_core::tui::CreateArgs;
use launchpad_core::{config, templates, CacheResolver, ProductConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Launchpad product configuration
#[derive(Clone)]
pub struct LaunchpadConfig;

impl ProductConfig for LaunchpadConfig {
    fn name(&self) -> &'static str {
        "launchpad"
    }

    fn display_name(&self) -> &'static str {
        "create-app-template"
    }

    fn cli_description(&self) -> &'static str {
        "Scaffold a framework template with optional feature modules"
    }

    fn registry_env(&self) -> &'static str {
        "LAUNCHPAD_REGISTRY"
    }

    fn cache_dir_env(&self) -> &'static str {
        "LAUNCHPAD_CACHE_DIR"
    }

    fn github_api_env(&self) -> &'static str {
        "LAUNCHPAD_GITHUB_API"
    }

    fn next_steps(&self, dir: &Path, needs_install: bool) -> Vec<String> {
        let mut steps = Vec::new();
        let current = std::env::current_dir().ok();

        // Step 1: cd to directory if not current
        if current.as_deref() != Some(dir) {
            steps.push(format!("cd {}", dir.display()));
        }

        // Step 2: Install dependencies if that was skipped or failed
        if needs_install {
            steps.push(self.install_command().join(" "));
        }

        // Step 3: Open README for instructions
        steps.push("Open README.md to get started".to_string());

        steps
    }
}

#[derive(Parser, Debug)]
#[command(name = "create-app-template")]
#[command(about = "Scaffold a framework template with optional feature modules")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Options for the default create command
    #[command(flatten)]
    pub create: CliCreateArgs,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new project (the default when no subcommand is given)
    Create(CliCreateArgs),
    /// List the frameworks and modules in the registry
    List(ListArgs),
    /// Inspect or clear the module cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct CliCreateArgs {
    /// Framework to use
    #[arg(short, long)]
    pub framework: Option<String>,

    /// Template evolution branch to use
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Comma-separated modules to merge, later modules win on conflicts
    #[arg(short, long)]
    pub include: Option<String>,

    /// Target directory
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Remote repo for modules (owner/repo)
    #[arg(long = "module-repo")]
    pub module_repo: Option<String>,

    /// Branch for remote modules
    #[arg(long = "module-branch")]
    pub module_branch: Option<String>,

    /// Module cache directory (also LAUNCHPAD_CACHE_DIR)
    #[arg(long = "cache-dir")]
    pub cache_dir: Option<PathBuf>,

    /// Registry file to use instead of the built-in one (also LAUNCHPAD_REGISTRY)
    #[arg(long)]
    pub registry: Option<PathBuf>,

    /// Local directory to read sources from instead of fetching from remote (for development use)
    #[arg(long = "template-dir")]
    pub template_dir: Option<PathBuf>,

    /// Number of modules to fetch at once
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Skip dependency installation
    #[arg(long = "no-install")]
    pub no_install: bool,

    /// Refuse to overwrite existing files when merging modules
    #[arg(long = "fail-on-conflict")]
    pub fail_on_conflict: bool,

    /// Auto-confirm all prompts (non-interactive mode)
    #[arg(short, long)]
    pub yes: bool,
}

impl From<CliCreateArgs> for CreateArgs {
    fn from(args: CliCreateArgs) -> Self {
        CreateArgs {
            framework: args.framework,
            branch: args.branch,
            include: args.include,
            directory: args.directory,
            module_repo: args.module_repo,
            module_branch: args.module_branch,
            cache_dir: args.cache_dir,
            registry: args.registry,
            template_dir: args.template_dir,
            jobs: args.jobs,
            no_install: args.no_install,
            fail_on_conflict: args.fail_on_conflict,
            yes: args.yes,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct ListArgs {
    /// Registry file to use instead of the built-in one (also LAUNCHPAD_REGISTRY)
    #[arg(long)]
    pub registry: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show cached modules
    List(CacheArgs),
    /// Remove one cached module, or all of them
    Clear(CacheClearArgs),
}

#[derive(ClapArgs, Debug)]
pub struct CacheArgs {
    /// Module cache directory (also LAUNCHPAD_CACHE_DIR)
    #[arg(long = "cache-dir")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct CacheClearArgs {
    /// Module to evict (all modules when omitted)
    pub module: Option<String>,

    /// Module cache directory (also LAUNCHPAD_CACHE_DIR)
    #[arg(long = "cache-dir")]
    pub cache_dir: Option<PathBuf>,
}

/// Initialize the tracing subscriber for logging.
///
/// `--debug` turns on debug output; otherwise `RUST_LOG` applies, defaulting to warnings only
/// so log lines do not interleave with the prompts.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("launchpad_core=debug,create_app_template=debug,install=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run_create(config: &LaunchpadConfig, args: CliCreateArgs) -> Result<()> {
    let result = launchpad_core::run(config, args.into()).await;

    // Ensure cursor is visible on normal exit
    let _ = console::Term::stderr().show_cursor();

    result
}

fn cache_for(config: &LaunchpadConfig, cache_dir: Option<&Path>) -> CacheResolver {
    CacheResolver::new(config::cache_root(config, cache_dir))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Ensure terminal cursor is restored on panic
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = console::Term::stderr().show_cursor();
        default_panic(info);
    }));

    // Handle Ctrl+C gracefully
    ctrlc::set_handler(move || {
        let _ = console::Term::stderr().show_cursor();
        std::process::exit(130);
    })
    .ok();

    let args = Args::parse();
    init_tracing(args.debug);
    tracing::debug!("Starting with args: {:?}", args);

    let config = LaunchpadConfig;

    match args.command {
        Some(Command::Create(create_args)) => run_create(&config, create_args).await,
        Some(Command::List(list_args)) => {
            let registry = config::load_registry(&config, list_args.registry.as_deref())?;
            templates::list_sources(&config, &registry)
        }
        Some(Command::Cache { action }) => match action {
            CacheCommand::List(cache_args) => {
                templates::list_cache(&cache_for(&config, cache_args.cache_dir.as_deref()))
            }
            CacheCommand::Clear(clear_args) => templates::clear_cache(
                &cache_for(&config, clear_args.cache_dir.as_deref()),
                clear_args.module.as_deref(),
            ),
        },
        // No subcommand: top-level flags drive the create command
        None => run_create(&config, args.create).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_flags_create() {
        let args = Args::try_parse_from([
            "create-app-template",
            "--framework",
            "react",
            "--branch",
            "hello-world",
            "--include",
            "auth-oauth,theme",
            "--module-branch",
            "auth-oauth",
            "--directory",
            "my-app",
        ])
        .unwrap();

        assert!(args.command.is_none());
        assert_eq!(args.create.framework.as_deref(), Some("react"));
        assert_eq!(args.create.include.as_deref(), Some("auth-oauth,theme"));
        assert_eq!(args.create.module_branch.as_deref(), Some("auth-oauth"));
        assert_eq!(args.create.directory, Some(PathBuf::from("my-app")));
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Args::try_parse_from(["create-app-template", "--frame", "react"]).is_err());
    }

    #[test]
    fn test_cache_clear_subcommand() {
        let args =
            Args::try_parse_from(["create-app-template", "cache", "clear", "auth-oauth"]).unwrap();
        match args.command {
            Some(Command::Cache {
                action: CacheCommand::Clear(clear),
            }) => assert_eq!(clear.module.as_deref(), Some("auth-oauth")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_next_steps_suggest_install() {
        let steps = LaunchpadConfig.next_steps(Path::new("/nonexistent/app"), true);
        assert_eq!(steps[0], "cd /nonexistent/app");
        assert!(steps.contains(&"npm install".to_string()));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
