//! Charm-style CLI front end using cliclack

use crate::compose::{parse_module_list, Composer, CompositionRequest, CompositionResult};
use crate::config;
use crate::product::ProductConfig;
use crate::registry::SourceRegistry;
use crate::runtime::install::{CommandInstaller, DependencyInstaller};
use crate::templates::cache::CacheResolver;
use crate::templates::fetcher::{GithubFetcher, LocalFetcher, TreeFetcher};
use crate::templates::merger::MergePolicy;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// CLI arguments for the create command
#[derive(Debug, Clone, Default)]
pub struct CreateArgs {
    /// Framework whose base template seeds the project
    pub framework: Option<String>,

    /// Template branch/ref (defaults to the registry's default branch)
    pub branch: Option<String>,

    /// Comma-separated modules to merge, in order
    pub include: Option<String>,

    /// Project directory to compose into
    pub directory: Option<PathBuf>,

    /// Repository to fetch every module from
    pub module_repo: Option<String>,

    /// Ref to fetch every module at
    pub module_branch: Option<String>,

    /// Module cache root
    pub cache_dir: Option<PathBuf>,

    /// Registry file to use instead of the built-in one
    pub registry: Option<PathBuf>,

    /// Local directory to read sources from instead of fetching remotely
    pub template_dir: Option<PathBuf>,

    /// Number of modules fetched at once
    pub jobs: Option<usize>,

    /// Skip dependency installation
    pub no_install: bool,

    /// Refuse to overwrite files when merging modules
    pub fail_on_conflict: bool,

    /// Auto-confirm all prompts (non-interactive mode)
    pub yes: bool,
}

/// Run the CLI with interactive prompts
pub async fn run<C: ProductConfig>(config: &C, args: CreateArgs) -> Result<()> {
    cliclack::intro(config.display_name())?;

    // Step 1: Load the registry
    let registry = config::load_registry(config, args.registry.as_deref())?;

    // Step 2: Select framework
    let framework = select_framework(&registry, &args)?;

    // Step 3: Select directory
    let project_dir = select_directory(&args)?;

    // Step 4: Build the request
    let modules = args
        .include
        .as_deref()
        .map(parse_module_list)
        .unwrap_or_default();
    let mut request = CompositionRequest::new(framework, &project_dir)?
        .with_template_branch(args.branch.clone())
        .with_modules(modules)
        .with_module_branch(args.module_branch.clone())
        .with_module_repository(args.module_repo.clone())?;
    if args.no_install {
        request = request.without_install();
    }

    let cache = CacheResolver::new(config::cache_root(config, args.cache_dir.as_deref()));
    cliclack::log::info(format!("Module cache: {}", cache.cache_root().display()))?;
    let installer = CommandInstaller::from_config(config);

    // Step 5: Compose with the selected source
    let result = match &args.template_dir {
        Some(path) => {
            cliclack::log::info(format!("Using local sources from {}", path.display()))?;
            let fetcher = LocalFetcher::new(path.clone());
            create_project(config, registry, cache, fetcher, installer, &args, &request).await?
        }
        None => {
            cliclack::log::info("Using remote sources")?;
            let fetcher = GithubFetcher::from_config(config)?;
            create_project(config, registry, cache, fetcher, installer, &args, &request).await?
        }
    };

    // Step 6: Report and show next steps
    report(&result)?;
    let needs_install = !result.installed && project_dir.join(config.manifest_file()).is_file();
    print_next_steps(config, &project_dir, needs_install)?;

    Ok(())
}

fn select_framework(registry: &SourceRegistry, args: &CreateArgs) -> Result<String> {
    // Validation of a named framework happens in the composer, which reports the valid names
    if let Some(framework) = &args.framework {
        return Ok(framework.clone());
    }

    let templates: Vec<_> = registry.templates().collect();
    if templates.is_empty() {
        anyhow::bail!("No frameworks found in the registry.");
    }

    // If only one framework, use it automatically
    if templates.len() == 1 {
        let template = templates[0];
        cliclack::log::info(format!("Using framework: {}", template.name))?;
        return Ok(template.name.clone());
    }

    if args.yes {
        anyhow::bail!(
            "--framework is required in non-interactive mode. Available frameworks: {}",
            registry.framework_names().join(", ")
        );
    }

    let mut select = cliclack::select("Select a framework");
    for template in &templates {
        select = select.item(
            template.name.clone(),
            &template.name,
            template.description.as_deref().unwrap_or(""),
        );
    }

    Ok(select.interact()?)
}

fn select_directory(args: &CreateArgs) -> Result<PathBuf> {
    let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let path = match (&args.directory, args.yes) {
        (Some(dir), _) => resolve_directory(&current_dir, dir),
        (None, true) => current_dir.clone(),
        (None, false) => {
            let input: String = cliclack::input("Project directory")
                .placeholder(".")
                .default_input(".")
                .interact()?;
            resolve_directory(&current_dir, Path::new(input.trim()))
        }
    };
    cliclack::log::info(format!("Project directory: {}", path.display()))?;

    if let Some(parent) = path.parent() {
        if parent != Path::new("") && !parent.is_dir() {
            anyhow::bail!("Parent directory does not exist: {}", parent.display());
        }
    }

    let existing = existing_entries(&path);
    if existing == 0 {
        return Ok(path);
    }

    let consequence = if args.fail_on_conflict {
        "modules that touch existing files will be refused"
    } else {
        "the base template and modules overwrite files with the same name"
    };
    cliclack::log::warning(format!(
        "Directory already has {} entries; {}",
        existing, consequence
    ))?;

    if !args.yes
        && !cliclack::confirm("Compose into it anyway?")
            .initial_value(true)
            .interact()?
    {
        anyhow::bail!("Setup cancelled.");
    }

    Ok(path)
}

/// Absolute project path for user input; empty input and `.` mean the current directory
fn resolve_directory(current_dir: &Path, input: &Path) -> PathBuf {
    if input.as_os_str().is_empty() || input == Path::new(".") {
        current_dir.to_path_buf()
    } else if input.is_absolute() {
        input.to_path_buf()
    } else {
        current_dir.join(input)
    }
}

/// Number of entries already in `path` (0 when it does not exist)
fn existing_entries(path: &Path) -> usize {
    std::fs::read_dir(path)
        .map(|entries| entries.count())
        .unwrap_or(0)
}

async fn create_project<C, F, I>(
    config: &C,
    registry: SourceRegistry,
    cache: CacheResolver,
    fetcher: F,
    installer: I,
    args: &CreateArgs,
    request: &CompositionRequest,
) -> Result<CompositionResult>
where
    C: ProductConfig,
    F: TreeFetcher,
    I: DependencyInstaller,
{
    let policy = if args.fail_on_conflict {
        MergePolicy::FailOnConflict
    } else {
        MergePolicy::Overwrite
    };
    let composer = Composer::new(registry, cache, fetcher, installer)
        .with_merge_policy(policy)
        .with_manifest_file(config.manifest_file())
        .with_fetch_concurrency(args.jobs.unwrap_or(1));

    let spinner = cliclack::spinner();
    spinner.start("Composing project...");

    match composer.compose(request).await {
        Ok(result) => {
            spinner.stop(format!(
                "Wrote {} files to {}",
                result.written_paths.len(),
                request.target_directory().display()
            ));
            Ok(result)
        }
        Err(e) => {
            spinner.stop("Composition failed");
            Err(e.into())
        }
    }
}

fn report(result: &CompositionResult) -> Result<()> {
    for module in &result.merged_modules {
        cliclack::log::success(format!("Included module: {}", module))?;
    }
    for module in &result.skipped_modules {
        cliclack::log::warning(format!("Module not found: {}", module))?;
    }
    for error in &result.errors {
        cliclack::log::warning(format!(
            "{} ({}): {}",
            error.subject, error.kind, error.message
        ))?;
    }
    if result.installed {
        cliclack::log::success("Dependencies installed")?;
    }
    Ok(())
}

fn print_next_steps<C: ProductConfig>(
    config: &C,
    project_dir: &Path,
    needs_install: bool,
) -> Result<()> {
    let steps = config.next_steps(project_dir, needs_install);
    cliclack::note("Next steps", numbered(&steps))?;
    cliclack::outro(format!("Project ready in {}", project_dir.display()))?;
    Ok(())
}

fn numbered(steps: &[String]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_directory() {
        let cwd = Path::new("/work");
        assert_eq!(resolve_directory(cwd, Path::new("")), PathBuf::from("/work"));
        assert_eq!(resolve_directory(cwd, Path::new(".")), PathBuf::from("/work"));
        assert_eq!(
            resolve_directory(cwd, Path::new("my-app")),
            PathBuf::from("/work/my-app")
        );
        assert_eq!(
            resolve_directory(cwd, Path::new("/elsewhere/app")),
            PathBuf::from("/elsewhere/app")
        );
    }

    #[test]
    fn test_existing_entries() {
        let dir = TempDir::new().unwrap();
        assert_eq!(existing_entries(&dir.path().join("missing")), 0);
        assert_eq!(existing_entries(dir.path()), 0);
        std::fs::write(dir.path().join("README.md"), "").unwrap();
        assert_eq!(existing_entries(dir.path()), 1);
    }

    #[test]
    fn test_numbered_steps() {
        let steps = vec!["cd my-app".to_string(), "npm install".to_string()];
        assert_eq!(numbered(&steps), "1. cd my-app\n2. npm install");
    }
}
