//! Keeva assistant daemon - main entry point.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use keeva::{
    Config,
    agents::{AgentRegistry, HomeAssistantAgent, WebSearchAgent},
    assistant::{ActionGenerator, ActionRouter, ContextBuilder, Dispatcher, Transcript, inbound_queue},
    channels::{SessionRegistry, ws},
    llm::create_llm_provider,
    store::{MemoryStore, MessageStore, PgStore, ProfileStore, TaskStore},
    tasks::Rescheduler,
    tools::{
        ToolRegistry,
        builtin::{AddTaskTool, CompleteTaskTool, ForgetTool, RememberTool, ShortTermMemory},
    },
};

#[derive(Parser, Debug)]
#[command(name = "keeva")]
#[command(about = "Conversational home-automation assistant backend")]
#[command(version)]
struct Args {
    /// Run with an in-memory store instead of PostgreSQL (for testing)
    #[arg(long)]
    no_db: bool,
}

struct Stores {
    tasks: Arc<dyn TaskStore>,
    messages: Arc<dyn MessageStore>,
    profiles: Arc<dyn ProfileStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("keeva=debug,tower_http=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    tracing::info!("starting assistant: {}", config.assistant.name);

    let stores = if args.no_db {
        tracing::warn!("running without database connection");
        let store = Arc::new(MemoryStore::new());
        Stores {
            tasks: store.clone(),
            messages: store.clone(),
            profiles: store,
        }
    } else {
        let store = Arc::new(PgStore::new(&config.database).await?);
        store.run_migrations().await?;
        tracing::info!("database connected and migrations applied");
        Stores {
            tasks: store.clone(),
            messages: store.clone(),
            profiles: store,
        }
    };

    let llm = create_llm_provider(&config.llm)?;
    tracing::info!("LLM provider initialized: {}", llm.model_name());

    let agents = Arc::new(AgentRegistry::new());
    if let Some(ha_config) = config.home_assistant.clone() {
        agents
            .register(Arc::new(HomeAssistantAgent::new(ha_config)))
            .await;
    }
    if let Some(search_config) = config.web_search.clone() {
        agents
            .register(Arc::new(WebSearchAgent::new(search_config)))
            .await;
    }
    tracing::info!("agent registry initialized with {} agent(s)", agents.count().await);

    let memory = ShortTermMemory::new();
    let tools = Arc::new(ToolRegistry::new());
    tools
        .register(Arc::new(RememberTool::new(memory.clone())))
        .await;
    tools
        .register(Arc::new(ForgetTool::new(memory.clone())))
        .await;
    tools
        .register(Arc::new(AddTaskTool::new(stores.tasks.clone())))
        .await;
    tools
        .register(Arc::new(CompleteTaskTool::new(stores.tasks.clone())))
        .await;
    tracing::info!("tool registry initialized with {} tool(s)", tools.count().await);

    let sessions = Arc::new(SessionRegistry::new());
    let transcript = Arc::new(Transcript::new(
        stores.messages.clone(),
        config.assistant.transcript_window,
    ));
    transcript.warm().await;

    let (inbound_tx, inbound_rx) = inbound_queue();

    let context = Arc::new(ContextBuilder::new(
        config.assistant.clone(),
        stores.profiles.clone(),
        stores.tasks.clone(),
        sessions.clone(),
        agents.clone(),
        tools.clone(),
        memory,
        transcript.clone(),
    ));

    let router = ActionRouter::new(
        config.assistant.name.clone(),
        sessions.clone(),
        agents.clone(),
        tools,
        transcript.clone(),
        inbound_tx.clone(),
        config.assistant.tool_timeout,
    );

    let dispatcher = Dispatcher::new(
        config.assistant.name.clone(),
        inbound_rx,
        transcript,
        context,
        ActionGenerator::new(llm, config.assistant.max_generation_attempts),
        router,
        agents,
        config.assistant.failure_backoff,
    );
    tokio::spawn(dispatcher.run());

    let rescheduler = Rescheduler::new(stores.tasks.clone());
    tokio::spawn(rescheduler.run());

    let app = ws::routes(ws::WsState {
        sessions,
        inbound: inbound_tx,
        assistant_name: config.assistant.name.clone(),
    })
    .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
