use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use weft_core::config::{AppConfig, ModelConfig, PipelineConfig};
use weft_core::event::EventBus;
use weft_core::traits::LlmClient;
use weft_core::types::{RunEvent, RunId, Score};

use weft_agent::dataset::{self, ResearchItem};
use weft_agent::evals::{EvalSuite, Judge, RunMeasurements};
use weft_agent::pipeline::{build_report_graph, PipelineDeps, ReportPipeline, ReportState};
use weft_agent::react::{judge_answer, ReactAgent};
use weft_agent::{check_expected_output, RunLogger};
use weft_llm::OpenAiClient;
use weft_tools::{truncate_chars, ToolRegistry};

#[derive(Parser)]
#[command(name = "weft", version, about = "Cyclic workflow graphs for multi-agent research")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "weft.toml", env = "WEFT_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the research pipeline on one or more topics
    Run {
        /// Topics to research (defaults to the three demo topics)
        topics: Vec<String>,
        /// How many runs may be in flight at once
        #[arg(long, default_value = "1")]
        concurrency: usize,
        /// Skip the evaluation battery
        #[arg(long)]
        no_evals: bool,
    },
    /// Run every item of a research dataset and check the expected output
    Experiment {
        /// JSON array of {topic, expected_sections, min_word_count, expected_keywords, quality_threshold}
        #[arg(long)]
        dataset: PathBuf,
        #[arg(long, default_value = "1")]
        concurrency: usize,
    },
    /// Ask the ReAct agent a question
    React {
        #[arg(trailing_var_arg = true)]
        input: Vec<String>,
        /// JSON array of {input, expected_output}; each answer is judged
        #[arg(long, conflicts_with = "input")]
        dataset: Option<PathBuf>,
    },
    /// Print the research pipeline topology
    Graph {
        /// Emit a Mermaid flowchart instead of the edge list
        #[arg(long)]
        mermaid: bool,
    },
    /// Show or create configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weft=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that need no config
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "weft", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Graph { mermaid } => return print_graph(*mermaid),
        Commands::Config {
            action: Some(ConfigAction::Init { force }),
        } => return init_config(&cli.config, *force),
        _ => {}
    }

    let config = load_config(&cli.config)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling in-flight runs");
                cancel.cancel();
            }
        });
    }

    let llm = weft_llm::client_from_config(&config);
    let events = Arc::new(EventBus::default());

    match cli.command {
        Commands::Config { .. } => {
            println!("{}", config.to_toml()?);
        }
        Commands::Run {
            topics,
            concurrency,
            no_evals,
        } => {
            let items = if topics.is_empty() {
                dataset::demo_topics()
            } else {
                topics.into_iter().map(topic_item).collect()
            };
            let ctx = RunContext {
                config,
                llm,
                events,
                cancel,
                evals: !no_evals,
            };
            run_topics(&ctx, items, concurrency, false).await;
        }
        Commands::Experiment {
            dataset: path,
            concurrency,
        } => {
            let items = dataset::load_research_items(&path)?;
            info!(items = items.len(), path = %path.display(), "Loaded dataset");
            let ctx = RunContext {
                config,
                llm,
                events,
                cancel,
                evals: false,
            };
            run_topics(&ctx, items, concurrency, true).await;
        }
        Commands::React { input, dataset: path } => {
            let agent = ReactAgent::from_config(
                llm.clone(),
                config.model.clone(),
                Arc::new(ToolRegistry::with_react_tools()),
                &config.react,
            )?
            .with_events(events.clone())
            .with_cancel(cancel.clone());

            match path {
                Some(path) => react_experiment(&agent, llm.as_ref(), &config.model, &path, &cancel).await?,
                None => {
                    let input = input.join(" ");
                    if input.trim().is_empty() {
                        anyhow::bail!("Nothing to ask: pass a question or --dataset");
                    }
                    let outcome = agent.run(&input).await?;
                    println!("{}", outcome.answer());
                    eprintln!("[{} model calls]", outcome.model_calls());
                }
            }
        }
        Commands::Graph { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Shared by every run of one invocation.
struct RunContext {
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
    events: Arc<EventBus>,
    cancel: CancellationToken,
    evals: bool,
}

struct TopicResult {
    item: ResearchItem,
    run_id: RunId,
    latency_secs: f64,
    outcome: Result<Finished, Halted>,
}

struct Finished {
    state: ReportState,
    steps: usize,
    scores: Vec<Score>,
}

/// A run that stopped early. `partial` is whatever the graph had merged
/// before the failure; `None` when the pipeline never started.
struct Halted {
    error: String,
    partial: Option<(ReportState, usize)>,
}

impl Halted {
    fn before_start(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
            partial: None,
        }
    }

    /// Indented report of the error and any partial artifacts.
    fn describe(&self) -> String {
        let mut out = format!("  Error:        {}\n", self.error);
        if let Some((state, steps)) = &self.partial {
            out.push_str(&format!("  Steps run:    {}\n", steps));
            out.push_str(&format!("  Draft:        {} chars\n", report_text(state).chars().count()));
            out.push_str(&format!("  Iterations:   {}\n", state.trace_line()));
        }
        out
    }
}

fn topic_item(topic: String) -> ResearchItem {
    ResearchItem {
        topic,
        expected_sections: Vec::new(),
        min_word_count: 500,
        expected_keywords: Vec::new(),
        quality_threshold: 0.8,
        tags: Vec::new(),
    }
}

async fn run_topics(ctx: &RunContext, items: Vec<ResearchItem>, concurrency: usize, check: bool) {
    let total = items.len();
    let started = Instant::now();
    println!("{}", "=".repeat(70));
    println!("  weft research pipeline: {} topic(s)", total);
    println!("{}", "=".repeat(70));

    let progress_cancel = CancellationToken::new();
    let progress = spawn_progress(&ctx.events, progress_cancel.clone());

    let results: Vec<TopicResult> = futures::stream::iter(items.into_iter().enumerate())
        .map(move |(index, item)| async move {
            let result = run_topic(ctx, item, check).await;
            print_run(&result, index, total, check);
            result
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    progress_cancel.cancel();
    progress.await.ok();

    println!("\n{}", "=".repeat(70));
    println!(
        "  ALL RUNS COMPLETE: {} topic(s) in {:.1}s",
        total,
        started.elapsed().as_secs_f64()
    );
    println!("{}", "=".repeat(70));
    for r in &results {
        match &r.outcome {
            Ok(done) => {
                println!("  ✅ {}", r.item.topic);
                println!(
                    "     Run: {} | {:.1}s | {} chars | {} steps",
                    r.run_id,
                    r.latency_secs,
                    report_text(&done.state).chars().count(),
                    done.steps
                );
            }
            Err(halted) => {
                println!("  ❌ {}", r.item.topic);
                print!("{}", halted.describe());
            }
        }
    }
    let scored: usize = results
        .iter()
        .filter_map(|r| r.outcome.as_ref().ok())
        .map(|d| d.scores.len())
        .sum();
    if scored > 0 {
        println!("\n  Total scores recorded: {}", scored);
    }
}

async fn run_topic(ctx: &RunContext, item: ResearchItem, check: bool) -> TopicResult {
    let run_id = RunId::new();
    info!(run_id = %run_id, topic = %item.topic, tags = ?item.tags, "Starting run");

    let logger_cancel = CancellationToken::new();
    let logger = ctx.config.pipeline.log_dir().map(|dir| {
        RunLogger::new(dir, ctx.config.pipeline.log_level).spawn(
            &ctx.events,
            run_id.clone(),
            logger_cancel.clone(),
        )
    });

    let mut limits = ctx.config.pipeline.clone();
    if check {
        limits.quality_threshold = item.quality_threshold;
    }
    let deps = PipelineDeps::new(ctx.llm.clone(), &ctx.config.model, limits).with_events(ctx.events.clone());

    let started = Instant::now();
    let outcome = match ReportPipeline::new(deps) {
        Ok(pipeline) => {
            let pipeline = pipeline.with_cancel(ctx.cancel.clone());
            match pipeline.run_with_id(run_id.clone(), &item.topic, &item.topic).await {
                Ok(outcome) => {
                    let latency_secs = started.elapsed().as_secs_f64();
                    let scores = if ctx.evals {
                        let cost_usd = pipeline.deps().meter.cost_usd(
                            ctx.config.evals.input_cost_per_mtok,
                            ctx.config.evals.output_cost_per_mtok,
                        );
                        let suite = EvalSuite::new(
                            Judge::new(ctx.llm.clone(), ctx.config.model.clone()),
                            ctx.config.evals.clone(),
                        )
                        .with_events(ctx.events.clone());
                        let research = outcome.state.research_text();
                        suite
                            .run(
                                &run_id,
                                RunMeasurements {
                                    output: report_text(&outcome.state),
                                    research: &research,
                                    latency_secs,
                                    cost_usd,
                                },
                                &ctx.cancel,
                            )
                            .await
                    } else {
                        Vec::new()
                    };
                    Ok(Finished {
                        steps: outcome.steps.len(),
                        state: outcome.state,
                        scores,
                    })
                }
                Err(failure) => {
                    error!(
                        run_id = %run_id,
                        steps = failure.steps.len(),
                        external = failure.error.is_external(),
                        error = %failure.error,
                        "Run failed"
                    );
                    Err(Halted {
                        error: failure.error.to_string(),
                        partial: Some((failure.state, failure.steps.len())),
                    })
                }
            }
        }
        Err(e) => Err(Halted::before_start(e)),
    };

    logger_cancel.cancel();
    if let Some(handle) = logger {
        if let Ok(Some(path)) = handle.await {
            info!(path = %path.display(), "Run log written");
        }
    }

    TopicResult {
        item,
        run_id,
        latency_secs: started.elapsed().as_secs_f64(),
        outcome,
    }
}

/// The finished report, or the draft when no final output was produced.
fn report_text(state: &ReportState) -> &str {
    if state.final_output.is_empty() {
        &state.draft
    } else {
        &state.final_output
    }
}

fn print_run(result: &TopicResult, index: usize, total: usize, check: bool) {
    let mut out = String::new();
    out.push_str(&format!("\n{}\n", "#".repeat(70)));
    out.push_str(&format!("# RUN {}/{}: {}\n", index + 1, total, result.item.topic));
    out.push_str(&format!("{}\n", "#".repeat(70)));
    out.push_str(&format!("  Run ID: {}\n", result.run_id));
    if !result.item.tags.is_empty() {
        out.push_str(&format!("  Tags:   {}\n", result.item.tags.join(", ")));
    }

    match &result.outcome {
        Ok(done) => {
            let state = &done.state;
            out.push_str("\n  --- Results ---\n");
            out.push_str(&format!("  Draft:        {} chars\n", report_text(state).chars().count()));
            out.push_str(&format!("  Latency:      {:.1}s\n", result.latency_secs));
            out.push_str(&format!("  SEO Keywords: {}\n", state.seo_keywords.join(", ")));
            out.push_str(&format!("  Iterations:   {}\n", state.trace_line()));
            out.push_str(&format!(
                "  Exec Summary: {}...\n",
                truncate_chars(&state.executive_summary, 150)
            ));
            for (lang, text) in [
                ("spanish", &state.translations.spanish),
                ("french", &state.translations.french),
            ] {
                if let Some(text) = text {
                    out.push_str(&format!("  Translation [{}]: {}...\n", lang, truncate_chars(text, 80)));
                }
            }

            if !done.scores.is_empty() {
                out.push_str("\n  --- Evaluations ---\n");
                for score in &done.scores {
                    out.push_str(&format!(
                        "  {} {:<22} {:.2}  {}\n",
                        status(score.value),
                        score.name,
                        score.value,
                        truncate_chars(&score.reason, 80)
                    ));
                }
            }

            if check {
                let checks = check_expected_output(report_text(state), &result.item);
                let passed = checks.iter().filter(|c| c.passed).count();
                out.push_str(&format!("\n  --- Checks ({}/{}) ---\n", passed, checks.len()));
                for c in &checks {
                    out.push_str(&format!("  {} {}\n", if c.passed { "✅" } else { "❌" }, c.name));
                }
                out.push_str(&format!("  Quality score: {:.2}\n", state.quality_score));
            }
        }
        Err(halted) => {
            out.push_str(&format!("\n  --- Halted (run {}) ---\n", index + 1));
            out.push_str(&halted.describe());
        }
    }
    print!("{}", out);
}

fn status(value: f64) -> &'static str {
    if value >= 0.7 {
        "✅"
    } else if value >= 0.4 {
        "⚠️"
    } else {
        "❌"
    }
}

/// Print node progress to stderr while runs are in flight.
fn spawn_progress(events: &Arc<EventBus>, cancel: CancellationToken) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                result = rx.recv() => match result {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            };
            let short = truncate_chars(&event.run_id().0, 8).to_string();
            match event {
                RunEvent::NodeCompleted { node, elapsed_ms, .. } => {
                    eprintln!("[{}] {} ({:.1}s)", short, node, elapsed_ms as f64 / 1000.0);
                }
                RunEvent::RouteChosen {
                    node,
                    label,
                    target,
                    exhausted,
                    ..
                } => {
                    let note = if exhausted { " (retries exhausted)" } else { "" };
                    eprintln!("[{}] {} --[{}]--> {}{}", short, node, label, target, note);
                }
                RunEvent::ToolStart { name, .. } => {
                    eprintln!("[{}]   [tool: {}]", short, name);
                }
                RunEvent::NodeFailed { node, error, .. } => {
                    eprintln!("[{}] {} failed: {}", short, node, error);
                }
                _ => {}
            }
        }
    })
}

async fn react_experiment(
    agent: &ReactAgent,
    llm: &dyn LlmClient,
    model: &ModelConfig,
    path: &Path,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let cases = dataset::load_react_cases(path)?;
    info!(cases = cases.len(), path = %path.display(), "Loaded ReAct dataset");

    let mut total = 0.0;
    for (i, case) in cases.iter().enumerate() {
        let outcome = agent.run(&case.input).await?;
        let score = judge_answer(llm, model, &case.input, &case.expected_output, outcome.answer(), cancel).await;
        total += score;
        println!("{} [{}/{}] {}", status(score), i + 1, cases.len(), case.input);
        println!("     answer: {}", truncate_chars(outcome.answer(), 120));
        println!("     score:  {:.2} ({} model calls)", score, outcome.model_calls());
    }
    if !cases.is_empty() {
        println!("\nAverage correctness: {:.2}", total / cases.len() as f64);
    }
    Ok(())
}

fn print_graph(mermaid: bool) -> anyhow::Result<()> {
    let deps = PipelineDeps::new(
        Arc::new(OpenAiClient::new()),
        &ModelConfig::new("unused"),
        PipelineConfig::default(),
    );
    let graph = build_report_graph(Arc::new(deps))?;
    if mermaid {
        print!("{}", graph.to_mermaid());
    } else {
        print!("{}", graph.describe());
    }
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    if let Some(home) = dirs_home().map(|h| h.join(".weft").join("config.toml")) {
        if home.exists() {
            info!(path = %home.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home)?);
        }
    }
    warn!("No config file found, building one from OPENAI_API_KEY");
    Ok(AppConfig::from_env()?)
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let mut model = ModelConfig::new("gpt-4o-mini");
    model.api_key = Some("${OPENAI_API_KEY}".to_string());
    let config = AppConfig {
        model,
        fallback_models: Vec::new(),
        pipeline: Default::default(),
        react: Default::default(),
        evals: Default::default(),
    };
    std::fs::write(path, config.to_toml()?)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halted_run_shows_partial_artifacts() {
        let mut state = ReportState::new("Edge AI", "edge");
        state.draft = "A draft that never got approved.".into();
        state.iteration_log = vec!["researcher".into(), "writer".into(), "fact_checker_rejected".into()];
        let halted = Halted {
            error: "node 'editor' failed: HTTP 503".into(),
            partial: Some((state, 3)),
        };

        let text = halted.describe();
        assert!(text.contains("Error:        node 'editor' failed: HTTP 503"));
        assert!(text.contains("Steps run:    3"));
        assert!(text.contains("Draft:        32 chars"));
        assert!(text.contains("Iterations:   researcher → writer → fact_checker_rejected"));
    }

    #[test]
    fn test_halted_before_start_has_only_error() {
        let text = Halted::before_start("invalid graph").describe();
        assert_eq!(text, "  Error:        invalid graph\n");
    }
}
