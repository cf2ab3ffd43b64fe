use anyhow::{Context, Result};
use architect::agent::agent_loop::AgentLoop;
use architect::agent::context::ContextBuilder;
use architect::agent::execution::ExecutionEngine;
use architect::agent::mcp::McpDiscovery;
use architect::agent::mixed::MixedRunner;
use architect::agent::profiles;
use architect::agent::state::{AgentState, AgentStatus};
use architect::agent::tools::{register_builtin_tools, ToolRegistry};
use architect::config::Config;
use architect::costs::{CostTracker, PriceBook};
use architect::providers::adapter::ModelAdapter;
use architect::providers::cache::ResponseCache;
use architect::providers::openai::OpenAiProvider;
use architect::workspace::Workspace;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "architect", version, about = "Workspace-scoped tool-using agent runtime")]
struct Cli {
    /// Task for the agent to accomplish.
    task: String,

    /// Agent profile to run (plan, build, review, or config-defined).
    #[arg(long, default_value = "build")]
    agent: String,

    /// Run plan phase then build phase.
    #[arg(long)]
    mixed: bool,

    /// Record write actions instead of executing them.
    #[arg(long)]
    dry_run: bool,

    /// Budget ceiling in USD for this run.
    #[arg(long)]
    budget: Option<f64>,

    /// Whole-run deadline in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Workspace root (default: config value, then current directory).
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Config file path.
    #[arg(long, default_value = "architect.toml")]
    config: PathBuf,
}

fn exit_code(status: AgentStatus) -> i32 {
    match status {
        AgentStatus::Running | AgentStatus::Success => 0,
        AgentStatus::Failed => 1,
        AgentStatus::BudgetExceeded => 3,
        AgentStatus::MaxSteps => 4,
        AgentStatus::Timeout => 5,
        AgentStatus::Interrupted => 130,
    }
}

struct Runtime {
    config: Config,
    workspace: Arc<Workspace>,
    registry: Arc<ToolRegistry>,
    provider: Arc<OpenAiProvider>,
    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
    dry_run: bool,
}

impl Runtime {
    fn adapter(&self) -> ModelAdapter {
        let cache = if self.config.llm_cache.enabled {
            let dir = self.config.llm_cache.dir.clone().unwrap_or_else(|| {
                dirs::cache_dir()
                    .unwrap_or_else(std::env::temp_dir)
                    .join("architect")
                    .join("llm-cache")
            });
            ResponseCache::new(dir, self.config.llm_cache.ttl_hours)
                .map_err(|e| tracing::warn!("response cache disabled: {}", e))
                .ok()
        } else {
            None
        };
        ModelAdapter::new(self.provider.clone(), self.config.llm.model.clone())
            .with_prompt_caching(self.config.llm.prompt_caching)
            .with_response_cache(cache)
            .with_retry(self.config.llm.max_retries)
            .with_sampling(self.config.llm.temperature, self.config.llm.max_tokens)
    }

    fn tracker(&self) -> Option<CostTracker> {
        if !self.config.costs.enabled {
            return None;
        }
        Some(CostTracker::new(
            PriceBook::new(&self.config.costs.prices),
            self.config.costs.budget_usd,
            self.config.costs.warn_at_usd,
        ))
    }

    fn make_loop(&self, profile_name: &str) -> Result<AgentLoop> {
        let profile = profiles::get_profile(profile_name, &self.config.agents)
            .with_context(|| format!("unknown agent profile '{}'", profile_name))?;
        let mut engine = ExecutionEngine::new(
            self.registry.clone(),
            self.workspace.clone(),
            profile.confirm_mode,
        );
        engine.set_dry_run(self.dry_run);
        let context = ContextBuilder::new(self.workspace.root(), self.config.memory.enabled);
        let mut agent_loop = AgentLoop::new(
            self.adapter(),
            Arc::new(engine),
            self.registry.clone(),
            profile,
            context,
        )
        .with_cancel_flag(self.cancel.clone())
        .with_deadline(self.deadline)
        .with_source(profile_name);
        if let Some(tracker) = self.tracker() {
            agent_loop = agent_loop.with_cost_tracker(tracker);
        }
        Ok(agent_loop)
    }
}

fn report(state: &AgentState) {
    if let Some(plan) = &state.plan_output {
        println!("--- plan ---\n{}\n", plan);
    }
    if let Some(output) = &state.final_output {
        println!("{}", output);
    }
    if let Some(plan_summary) = &state.plan_summary {
        println!("\n{}", plan_summary);
    }
    if let Some(cost) = &state.cost {
        eprintln!(
            "cost: {} in / {} out / {} cached · ${:.4}",
            cost.total_input_tokens,
            cost.total_output_tokens,
            cost.total_cached_tokens,
            cost.total_cost_usd
        );
    }
    eprintln!("status: {} ({} steps)", state.status, state.current_step);
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".parse().expect("valid default filter"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    if let Some(root) = cli.workspace {
        config.workspace.root = root;
    }
    if cli.budget.is_some() {
        config.costs.budget_usd = cli.budget;
    }

    let api_key = std::env::var(&config.llm.api_key_env).with_context(|| {
        format!(
            "API key environment variable '{}' is not set",
            config.llm.api_key_env
        )
    })?;

    let workspace = Arc::new(Workspace::new(
        config.workspace.root.clone(),
        config.workspace.allow_delete,
        &config.workspace.sensitive_patterns,
    ));

    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, &workspace, config.tools.exec_timeout_secs)?;
    if !config.mcp.servers.is_empty() {
        let stats = McpDiscovery::new()
            .discover_and_register(&config.mcp.servers, &mut registry)
            .await;
        tracing::info!(
            "mcp discovery: {}/{} servers, {} tools",
            stats.servers_ok,
            stats.servers_total,
            stats.tools_registered
        );
    }

    let provider = Arc::new(OpenAiProvider::new(
        api_key,
        config.llm.model.clone(),
        config.llm.base_url.clone(),
        config.llm.timeout_secs,
    ));

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; finishing current step");
                cancel.store(true, Ordering::Release);
            }
        });
    }

    let runtime = Runtime {
        workspace,
        registry: Arc::new(registry),
        provider,
        cancel,
        deadline: cli.timeout.map(|secs| Instant::now() + Duration::from_secs(secs)),
        dry_run: cli.dry_run,
        config,
    };

    let state = if cli.mixed {
        let plan_loop = runtime.make_loop("plan")?;
        let build_loop = runtime.make_loop("build")?;
        let mut runner = MixedRunner::new(
            plan_loop,
            build_loop,
            runtime.workspace.root(),
            runtime.config.memory.enabled,
        );
        runner.run(&cli.task).await
    } else {
        let mut agent_loop = runtime.make_loop(&cli.agent)?;
        agent_loop.run(&cli.task).await
    };

    report(&state);
    std::process::exit(exit_code(state.status));
}
