use anyhow::{Context, Result};
use clap::Parser;
use ragent::auth::{AuthPipeline, IpClassifier, OidcValidator};
use ragent::backend::fakes::{DirectoryScanner, FakeChatModel, FakeEmbeddingClient, FakeSearchIndex, FakeVectorStore};
use ragent::cli::{Cli, Commands, ServeArgs, VectorizeArgs};
use ragent::config::Config;
use ragent::error::RagentError;
use ragent::follow::{FollowCoordinator, IpcServer, PidLock};
use ragent::metrics::Metrics;
use ragent::model::{FusionMethod, HybridQuery, LanguageMode, SearchMode, ToolCallResult, ToolDefinition};
use ragent::pipeline::{FingerprintStore, VectorizeOptions, VectorizePipeline};
use ragent::rpc::{SseMultiplexer, ToolHandler, ToolRegistry, ToolServer};
use ragent::search::HybridSearchEngine;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!("configuration loaded successfully");

    let metrics = Arc::new(Metrics::new());

    let cli = Cli::parse();
    match &cli.command {
        Commands::Vectorize(args) => run_vectorize(args, config, metrics).await,
        Commands::Serve(args) => run_serve(args, config, metrics).await,
    }
}

fn fingerprint_path(directory: &str) -> String {
    format!("{}/.ragent-fingerprints.db", directory.trim_end_matches('/'))
}

async fn run_vectorize(args: &VectorizeArgs, config: Config, metrics: Arc<Metrics>) -> Result<()> {
    args.validate().map_err(|e| anyhow::anyhow!(e))?;

    let mut pipeline_config = config.pipeline.clone();
    if let Some(concurrency) = args.concurrency {
        pipeline_config.concurrency = concurrency;
    }

    let fingerprints = Arc::new(FingerprintStore::open(&fingerprint_path(&args.directory))?);
    if args.clear {
        fingerprints.clear()?;
        tracing::info!("cleared existing fingerprints before vectorizing");
    }

    let pipeline = Arc::new(VectorizePipeline {
        scanner: Arc::new(DirectoryScanner {
            root: std::path::PathBuf::from(&args.directory),
            pattern: "**/*".to_string(),
        }),
        embedder: Arc::new(FakeEmbeddingClient { dimension: 8 }),
        vector_store: Arc::new(FakeVectorStore::default()),
        search_index: Arc::new(FakeSearchIndex::default()),
        fingerprints,
        config: pipeline_config,
        metrics,
    });

    let options = VectorizeOptions {
        dry_run: args.dry_run,
        force: args.force,
        prune: args.prune,
    };

    if args.follow {
        return run_follow(pipeline, config, args).await;
    }

    let outcome = pipeline.run(&options, None).await?;
    tracing::info!(
        new = outcome.files_new,
        modified = outcome.files_modified,
        unchanged = outcome.files_unchanged,
        deleted = outcome.files_deleted,
        errors = outcome.errors.total(),
        "vectorization cycle complete"
    );
    for (category, count) in outcome.errors.display_groups() {
        tracing::warn!(category, count, "chunk errors");
    }
    Ok(())
}

async fn run_follow(pipeline: Arc<VectorizePipeline>, config: Config, args: &VectorizeArgs) -> Result<()> {
    let _pid_lock = PidLock::acquire(&config.follow.pid_file_dir).map_err(anyhow_from_ragent)?;

    let coordinator = Arc::new(FollowCoordinator::new(pipeline, config.follow.clone()));
    let ipc = Arc::new(IpcServer::new(coordinator.clone(), config.follow.socket_path.clone()));
    let listener = ipc.bind().await.map_err(anyhow_from_ragent)?;

    let ipc_serve = ipc.clone();
    let serve_handle = tokio::spawn(async move { ipc_serve.serve(listener).await });

    let interval = config.follow.effective_interval(args.interval);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!(?interval, socket = %config.follow.socket_path, "follow mode started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = coordinator.tick().await {
                    tracing::error!(error = %e, "follow-mode cycle failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("follow mode received shutdown signal");
                ipc.stop();
                break;
            }
        }
    }

    let _ = serve_handle.await;
    Ok(())
}

fn anyhow_from_ragent(e: RagentError) -> anyhow::Error {
    anyhow::anyhow!(e.sanitized_message().to_string())
}

async fn run_serve(args: &ServeArgs, config: Config, metrics: Arc<Metrics>) -> Result<()> {
    let capacity = 1000;
    let ttl = Duration::from_secs(300);

    let allowlist = IpClassifier::from_ranges(&config.auth.allowed_ips, capacity, ttl).map_err(|e| anyhow::anyhow!(e))?;
    let trusted_proxies =
        IpClassifier::from_ranges(&config.auth.trusted_proxies, capacity, ttl).map_err(|e| anyhow::anyhow!(e))?;
    let bypass = if config.auth.bypass_ranges.is_empty() {
        None
    } else {
        Some(IpClassifier::from_ranges(&config.auth.bypass_ranges, capacity, ttl).map_err(|e| anyhow::anyhow!(e))?)
    };
    let oidc = config.auth.oidc_issuer.clone().map(|issuer| {
        let audience = config.auth.oidc_client_id.clone().unwrap_or_default();
        let secret = config.auth.oidc_client_secret.clone().unwrap_or_default();
        OidcValidator::new(issuer, audience, secret.as_bytes())
    });

    let auth = Arc::new(AuthPipeline {
        method: config.auth.method,
        allowlist,
        trusted_proxies,
        bypass,
        oidc,
        audit_log: config.auth.bypass_audit_log,
        metrics: metrics.clone(),
    });

    let registry = Arc::new(ToolRegistry::new("ragent_"));
    let engine = Arc::new(HybridSearchEngine::new(
        Arc::new(FakeEmbeddingClient { dimension: 8 }),
        Arc::new(FakeVectorStore::default()),
        Arc::new(FakeSearchIndex::default()),
    ));
    let chat_model = Arc::new(FakeChatModel);
    register_tools(&registry, engine, chat_model, &config);

    let sse = Arc::new(SseMultiplexer::new(
        config.sse.max_clients,
        config.sse.history_size,
        config.sse.buffer_size,
        metrics.clone(),
    ));
    let server = Arc::new(ToolServer::new(
        registry,
        sse,
        auth,
        Duration::from_secs(config.search.default_timeout_seconds),
        config.sse.heartbeat_interval,
        metrics,
    ));

    let bind = args.bind.clone().unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));
    let addr: std::net::SocketAddr = bind.parse().context("invalid bind address")?;
    server.start(addr).await
}

#[derive(Debug, Deserialize, JsonSchema)]
struct HybridSearchArgs {
    /// Free-text query. A bare URL short-circuits to an exact-reference
    /// lookup before falling back to fused BM25+vector search.
    query: String,
    /// Maximum number of results, 1..100.
    #[serde(default)]
    top_k: Option<usize>,
    /// Conjunctive post-filter applied to both branches.
    #[serde(default)]
    filters: HashMap<String, String>,
    /// `hybrid` (default), `bm25`, or `vector`.
    #[serde(default)]
    search_mode: Option<String>,
    #[serde(default)]
    bm25_weight: Option<f32>,
    #[serde(default)]
    vector_weight: Option<f32>,
    #[serde(default)]
    min_score: Option<f32>,
    /// Include raw per-branch responses in the result.
    #[serde(default)]
    include_metadata: Option<bool>,
    /// `weighted_sum` (default) or `rrf`.
    #[serde(default)]
    fusion_method: Option<String>,
    #[serde(default)]
    use_japanese_nlp: Option<bool>,
}

struct HybridSearchTool {
    engine: Arc<HybridSearchEngine>,
    defaults: ragent::config::SearchDefaultsConfig,
}

#[async_trait]
impl ToolHandler for HybridSearchTool {
    async fn call(&self, arguments: serde_json::Value) -> ToolCallResult {
        let args: HybridSearchArgs = match serde_json::from_value(arguments) {
            Ok(a) => a,
            Err(e) => return ToolCallResult::error(format!("invalid arguments: {e}")),
        };

        let top_k = args.top_k.unwrap_or(self.defaults.default_size);
        if top_k == 0 || top_k > 100 {
            return ToolCallResult::error("top_k must be between 1 and 100");
        }

        let fusion_method = match args.fusion_method.as_deref() {
            Some("rrf") => FusionMethod::Rrf,
            _ => FusionMethod::WeightedSum,
        };
        let search_mode = match args.search_mode.as_deref() {
            Some("bm25") => SearchMode::Bm25,
            Some("vector") => SearchMode::Vector,
            _ => SearchMode::Hybrid,
        };
        let language_mode = if args.use_japanese_nlp.unwrap_or(self.defaults.default_use_ja_nlp) {
            LanguageMode::Ja
        } else {
            LanguageMode::Default
        };

        let query = HybridQuery {
            query_text: args.query,
            index_name: self.defaults.index_name.clone(),
            size: top_k,
            bm25_weight: args.bm25_weight.unwrap_or(self.defaults.default_bm25_weight),
            vector_weight: args.vector_weight.unwrap_or(self.defaults.default_vector_weight),
            fusion_method,
            language_mode,
            search_mode,
            timeout: Duration::from_secs(self.defaults.default_timeout_seconds),
            filters: args.filters,
            min_score: args.min_score.unwrap_or(0.0),
            k: 50,
        };

        let outcome = match search_mode {
            SearchMode::Hybrid => self.engine.search(&query).await,
            SearchMode::Bm25 => self.engine.search_bm25_only(&query).await,
            SearchMode::Vector => self.engine.search_vector_only(&query).await,
        };

        match outcome {
            Ok(result) => {
                let mut value = serde_json::to_value(&result).unwrap_or(serde_json::Value::Null);
                if !args.include_metadata.unwrap_or(false) {
                    if let Some(obj) = value.as_object_mut() {
                        obj.remove("raw_bm25_response");
                        obj.remove("raw_vector_response");
                    }
                }
                ToolCallResult::structured(value)
            }
            Err(e) => ToolCallResult::error(e.sanitized_message().to_string()),
        }
    }
}

struct AnswerTool {
    composer: ragent::answer::AnswerComposer,
    engine: Arc<HybridSearchEngine>,
    defaults: ragent::config::SearchDefaultsConfig,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AnswerArgs {
    /// Natural-language question to answer with cited passages.
    question: String,
}

#[async_trait]
impl ToolHandler for AnswerTool {
    async fn call(&self, arguments: serde_json::Value) -> ToolCallResult {
        let args: AnswerArgs = match serde_json::from_value(arguments) {
            Ok(a) => a,
            Err(e) => return ToolCallResult::error(format!("invalid arguments: {e}")),
        };
        let query = HybridQuery {
            query_text: args.question.clone(),
            index_name: self.defaults.index_name.clone(),
            size: self.defaults.default_size,
            bm25_weight: self.defaults.default_bm25_weight,
            vector_weight: self.defaults.default_vector_weight,
            fusion_method: FusionMethod::WeightedSum,
            language_mode: LanguageMode::Default,
            search_mode: SearchMode::Hybrid,
            timeout: Duration::from_secs(self.defaults.default_timeout_seconds),
            filters: Default::default(),
            min_score: 0.0,
            k: 50,
        };
        let result = match self.engine.search(&query).await {
            Ok(r) => r,
            Err(e) => return ToolCallResult::error(e.sanitized_message().to_string()),
        };
        match self.composer.compose(&args.question, &result).await {
            Ok(answer) => ToolCallResult::structured(serde_json::to_value(answer).unwrap_or(serde_json::Value::Null)),
            Err(e) => ToolCallResult::error(e.sanitized_message().to_string()),
        }
    }
}

fn register_tools(
    registry: &Arc<ToolRegistry>,
    engine: Arc<HybridSearchEngine>,
    chat_model: Arc<dyn ragent::backend::ChatModel>,
    config: &Config,
) {
    let search_schema = schemars::schema_for!(HybridSearchArgs);
    registry.register_tool(
        "hybrid_search",
        ToolDefinition {
            name: "hybrid_search".to_string(),
            description: "Search indexed documents with fused BM25 and vector retrieval, with URL short-circuiting.".to_string(),
            input_schema: serde_json::to_value(search_schema).unwrap_or(serde_json::json!({"type": "object"})),
        },
        Arc::new(HybridSearchTool {
            engine: engine.clone(),
            defaults: config.search.clone(),
        }),
        None,
    );

    let answer_schema = schemars::schema_for!(AnswerArgs);
    registry.register_tool(
        "answer",
        ToolDefinition {
            name: "answer".to_string(),
            description: "Answer a question with a grounded, cited response drawn from hybrid search results.".to_string(),
            input_schema: serde_json::to_value(answer_schema).unwrap_or(serde_json::json!({"type": "object"})),
        },
        Arc::new(AnswerTool {
            composer: ragent::answer::AnswerComposer::new(chat_model),
            engine,
            defaults: config.search.clone(),
        }),
        None,
    );
}
