// CLI commands for operating Arbiter
use anyhow::{bail, Context, Result};
use arbiter_common::config::Config;
use arbiter_common::types::{EvaluationMode, LanguageId, Millis, Problem};
use arbiter_judge::classifier;
use arbiter_judge::engine::{self, ExecutionClient};
use arbiter_judge::store::RedisStore;
use arbiter_judge::{HarnessRegistry, Judge, JudgeSettings};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

/// Read and sanity-check a problem file
fn read_problem(path: &Path) -> Result<Problem> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read problem file {}", path.display()))?;
    let problem: Problem = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse problem file {}", path.display()))?;
    validate_problem(&problem)?;
    Ok(problem)
}

fn validate_problem(problem: &Problem) -> Result<()> {
    if problem.id.trim().is_empty() {
        bail!("Problem id must not be empty");
    }
    if problem.test_cases.is_empty() {
        bail!("Problem '{}' has no test cases", problem.id);
    }

    let mut seen = HashSet::new();
    for tc in &problem.test_cases {
        if !seen.insert(tc.id) {
            bail!("Problem '{}' has duplicate test case id {}", problem.id, tc.id);
        }
    }
    Ok(())
}

/// Validate languages.json and list what it configures
pub fn check(config_path: &Path) -> Result<()> {
    let registry = HarnessRegistry::load(config_path)?;

    println!("📋 Configured Languages:\n");
    println!(
        "{:<12} {:<8} {:<28} {:<9} {:<8} {:<10}",
        "Name", "Version", "Image", "Compiled", "Remote", "CPU/Mem"
    );
    println!("{}", "─".repeat(84));

    for language in registry.languages() {
        let harness = registry.lookup(&language)?;
        let config = &harness.config;
        println!(
            "{:<12} {:<8} {:<28} {:<9} {:<8} {:.1}/{} MB",
            language,
            config.version,
            config.image,
            if config.execution.compile.is_some() { "yes" } else { "no" },
            config
                .remote_language_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            config.cpu_limit,
            config.memory_limit_mb
        );
    }

    println!(
        "\n✅ {} language(s), every harness template valid",
        registry.languages().len()
    );
    Ok(())
}

/// Print the executable unit for a source file
pub fn render(config_path: &Path, language: &str, source: &Path) -> Result<()> {
    let registry = HarnessRegistry::load(config_path)?;
    let harness = registry.lookup(&LanguageId::new(language))?;

    let code = fs::read_to_string(source)
        .with_context(|| format!("Failed to read source file {}", source.display()))?;
    let unit = harness.template.inject(&code)?;

    print!("{}", unit);
    Ok(())
}

/// Print the error-quality tier for some error text
pub fn classify(text: Option<String>, file: Option<&Path>, passed: bool) -> Result<()> {
    let text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read error text from stdin")?;
            buffer
        }
    };

    println!("{}", classifier::classify(Some(&text), passed));
    Ok(())
}

/// Judge a local source file with the configured engine and print the verdict as JSON
pub async fn judge(
    config: &Config,
    language: &str,
    source: &Path,
    problem_path: &Path,
    mode: EvaluationMode,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let registry = HarnessRegistry::load(&config.languages_path)?;
    let engine = engine::from_config(config).context("Failed to initialize execution engine")?;
    let judge = Judge::new(
        Arc::new(registry),
        ExecutionClient::new(engine, config.timeout_grace).with_setup_limit(config.setup_timeout),
        JudgeSettings::from(config),
    );

    let code = fs::read_to_string(source)
        .with_context(|| format!("Failed to read source file {}", source.display()))?;
    let problem = read_problem(problem_path)?;
    let timeout = timeout_ms
        .map(Millis)
        .or(problem.time_limit_ms)
        .unwrap_or(config.default_timeout);

    let verdict = judge
        .evaluate(&LanguageId::new(language), &code, &problem.test_cases, timeout, mode)
        .await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&verdict).context("Failed to serialize verdict")?
    );
    Ok(())
}

/// Store a problem file in Redis
pub async fn load_problem(redis_url: &str, problem_path: &Path) -> Result<()> {
    let problem = read_problem(problem_path)?;

    let store = RedisStore::connect(redis_url, 0)
        .await
        .context("Failed to connect to Redis")?;
    let mut conn = store.connection();
    arbiter_common::redis::put_problem(&mut conn, &problem)
        .await
        .context("Failed to store problem")?;

    let hidden = problem.test_cases.iter().filter(|tc| tc.is_hidden).count();
    println!(
        "✅ Loaded problem '{}' ({} test cases, {} hidden)",
        problem.id,
        problem.test_cases.len(),
        hidden
    );
    Ok(())
}

/// Build the Docker image for a language from dockerfiles/{name}/Dockerfile
pub fn build_docker_image(config_path: &Path, name: &str, no_cache: bool) -> Result<()> {
    println!("🐳 Building Docker image for: {}", name);

    let registry = HarnessRegistry::load(config_path)?;
    let harness = registry.lookup(&LanguageId::new(name))?;

    let dockerfile_path = PathBuf::from(format!("dockerfiles/{}/Dockerfile", harness.language));
    if !dockerfile_path.exists() {
        bail!("Dockerfile not found at {}", dockerfile_path.display());
    }

    let image_latest = harness.config.image.clone();
    let image_versioned = format!("arbiter-{}:{}", harness.language, harness.config.version);

    println!("📦 Building tags:");
    println!("  - {}", image_versioned);
    println!("  - {}", image_latest);

    let mut docker_args = vec![
        "build".to_string(),
        "-t".to_string(),
        image_versioned,
        "-t".to_string(),
        image_latest.clone(),
        "-f".to_string(),
        dockerfile_path.to_string_lossy().to_string(),
    ];
    if no_cache {
        docker_args.push("--no-cache".to_string());
    }
    docker_args.push(".".to_string());

    println!("\n🔨 Running: docker {}", docker_args.join(" "));

    let status = Command::new("docker")
        .args(&docker_args)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .context("Failed to execute docker build. Is Docker installed and running?")?;

    if !status.success() {
        bail!("Docker build failed with exit code: {:?}", status.code());
    }

    println!("\n✅ Docker image {} built successfully!", image_latest);
    Ok(())
}
