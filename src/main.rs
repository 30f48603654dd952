//! skill-agent - command line entry point
//!
//! Runs one task through a skill and prints the outcome.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use skill_agent::agent::Executor;
use skill_agent::config::Config;
use skill_agent::conversation::{ThreadContext, ThreadStore};
use skill_agent::llm::{LlmClient, MockLlmClient, OpenRouterClient};
use skill_agent::project::{load_projects_dir, ProjectRegistry};
use skill_agent::skills::{load_skills_dir, SkillRegistry};
use skill_agent::tools::{apply_metadata, load_metadata_dir, ExecuteCode, ToolRegistry};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Which built-in skills to register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Builtins {
    /// Every built-in skill
    All,
    /// Research, summarizing, translating and tutoring only
    Default,
}

#[derive(Parser, Debug)]
#[command(name = "skill-agent", version, about = "Run a task through a tool-using skill")]
struct Cli {
    /// Config file (.yaml, .yml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skill to run the task with
    #[arg(short, long, default_value = "research_assistant")]
    skill: String,

    /// Task text. Read from stdin when omitted
    #[arg(short, long)]
    task: Option<String>,

    /// Comma-separated tool names replacing the skill's own list
    #[arg(long, value_delimiter = ',')]
    tools: Option<Vec<String>>,

    #[arg(long)]
    max_steps: Option<usize>,

    #[arg(long)]
    max_chars: Option<usize>,

    #[arg(long)]
    temperature: Option<f64>,

    /// Directory with skills/ and tools/ definition files
    #[arg(long)]
    defs_dir: Option<PathBuf>,

    /// Built-in skill set
    #[arg(long, value_enum, default_value_t = Builtins::All)]
    builtins: Builtins,

    /// Directory with project definition files
    #[arg(long)]
    projects_dir: Option<PathBuf>,

    /// Run the skill scoped to this project
    #[arg(long)]
    project: Option<String>,

    /// Directory for conversation threads
    #[arg(long)]
    thread_dir: Option<PathBuf>,

    /// Continue an existing thread. A new one is created when omitted
    #[arg(long, requires = "thread_dir")]
    thread: Option<String>,

    /// List available skills and exit
    #[arg(long)]
    list_skills: bool,

    /// List available projects and exit
    #[arg(long)]
    list_projects: bool,

    /// Write an example config file to this path and exit
    #[arg(long, value_name = "PATH")]
    generate_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skill_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Some(path) = &cli.generate_config {
        Config::save_example(path)?;
        println!("Wrote example config to {}", path.display());
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);
    config.validate()?;
    info!(
        "Loaded configuration: model={} real_llm={}",
        config.llm.default_model, config.use_real_llm
    );

    let (skills, registry) = build_registries(&config, cli.builtins)?;
    let projects = load_projects(&config)?;

    if cli.list_skills {
        for skill in skills.list() {
            println!("{:<20} {}", skill.name, skill.description);
        }
        return Ok(());
    }
    if cli.list_projects {
        for project in projects.list() {
            println!("{:<20} {}", project.id, project.description);
        }
        return Ok(());
    }

    let task = match &cli.task {
        Some(task) => task.clone(),
        None => {
            let mut input = String::new();
            tokio::io::stdin().read_to_string(&mut input).await?;
            input
        }
    };
    let task = task.trim();
    anyhow::ensure!(!task.is_empty(), "no task given (use --task or pipe it on stdin)");

    let mut profile = skills.get(&cli.skill)?;
    if let Some(id) = &cli.project {
        anyhow::ensure!(
            config.projects_dir.is_some(),
            "--project needs a projects directory (use --projects-dir or projects_dir in the config)"
        );
        let project = projects.get(id)?;
        profile = Arc::new(project.scope(&profile)?);
        info!("Scoped skill {} to project {}", profile.name, project.id);
    }
    let tools = match &cli.tools {
        Some(names) => registry.subset(names.as_slice())?,
        None => profile.resolve_tools(&registry)?,
    };

    let llm: Arc<dyn LlmClient> = if config.use_real_llm {
        Arc::new(OpenRouterClient::new(config.llm.client_config())?)
    } else {
        info!("Using scripted mock model (set USE_REAL_LLM=true for real calls)");
        Arc::new(MockLlmClient::default())
    };
    let mut executor = Executor::from_config(llm, &config);

    let thread = match &config.threads_dir {
        Some(dir) => {
            let store = Arc::new(ThreadStore::open(dir).await?);
            let id = match &cli.thread {
                Some(id) => id.clone(),
                None => store.create(&title_for(task)).await?.id,
            };
            executor = executor.with_context(Arc::new(ThreadContext::new(store.clone(), id.clone())));
            Some((store, id))
        }
        None => None,
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            trigger.cancel();
        }
    });

    let report = executor.run_default(task, &profile, &tools, &cancel).await?;

    if let Some((store, id)) = &thread {
        store.record_run(id, task, &report).await?;
        info!("Recorded run in thread {}", id);
    }
    if let Some(usage) = report.usage {
        info!(
            "Tokens: prompt={} completion={} total={}",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        );
    }

    println!("{}", report.outcome);
    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(v) = cli.max_steps {
        config.agent.max_steps = v;
    }
    if let Some(v) = cli.max_chars {
        config.agent.max_chars = v;
    }
    if let Some(v) = cli.temperature {
        config.agent.temperature = v;
    }
    if let Some(dir) = &cli.defs_dir {
        config.defs_dir = Some(dir.clone());
    }
    if let Some(dir) = &cli.thread_dir {
        config.threads_dir = Some(dir.clone());
    }
    if let Some(dir) = &cli.projects_dir {
        config.projects_dir = Some(dir.clone());
    }
}

/// Built-in skills and tools, overlaid with any definition files.
fn build_registries(config: &Config, builtins: Builtins) -> anyhow::Result<(SkillRegistry, ToolRegistry)> {
    let mut skills = match builtins {
        Builtins::All => SkillRegistry::with_builtins(),
        Builtins::Default => SkillRegistry::with_defaults(),
    };
    let mut registry = ToolRegistry::with_safe_defaults();
    if config.tools.allow_code_execution {
        registry.register(ExecuteCode::new());
    }

    if let Some(defs) = &config.defs_dir {
        let skills_dir = defs.join("skills");
        if skills_dir.is_dir() {
            let count = load_skills_dir(&skills_dir, &mut skills)
                .with_context(|| format!("loading skills from {}", skills_dir.display()))?;
            info!("Loaded {} skill(s) from {}", count, skills_dir.display());
        }

        let tools_dir = defs.join("tools");
        if tools_dir.is_dir() {
            let metadata = load_metadata_dir(&tools_dir)
                .with_context(|| format!("loading tool metadata from {}", tools_dir.display()))?;
            let total = metadata.len();
            let unknown = apply_metadata(&mut registry, metadata);
            info!("Applied {} of {} tool metadata file(s)", total - unknown.len(), total);
        }
    }

    for (skill, missing) in skills.missing_tools(&registry) {
        warn!("Skill {} references unavailable tools: {:?}", skill, missing);
    }

    Ok((skills, registry))
}

fn load_projects(config: &Config) -> anyhow::Result<ProjectRegistry> {
    let mut projects = ProjectRegistry::new();
    if let Some(dir) = &config.projects_dir {
        let count = load_projects_dir(dir, &mut projects)
            .with_context(|| format!("loading projects from {}", dir.display()))?;
        info!("Loaded {} project(s) from {}", count, dir.display());
    }
    Ok(projects)
}

fn title_for(task: &str) -> String {
    let title: String = task.chars().take(60).collect();
    if title.len() < task.len() {
        format!("{}...", title)
    } else {
        title
    }
}
