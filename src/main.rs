use std::{
    io::{self, BufRead, Write},
    path::Path,
    sync::Arc,
};

use adaptive_rag::{
    embeddings::OllamaEmbedder,
    llm::{OllamaCaptioner, OllamaGenerator},
    memory::SessionMemory,
    pipeline::APOLOGY,
    searxng::SearxngSearch,
    settings::{Args, Settings},
    vector_db::QdrantStore,
    AdaptiveRag, QueryRequest,
};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings =
        Settings::load(args.config.as_deref()).context("Problem while loading settings")?;
    settings.validate().context("Invalid settings")?;

    if args.print_config {
        println!("{}", toml::to_string_pretty(&settings)?);
        return Ok(());
    }

    let level: Level = settings.log.level.parse().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let pipeline = build_pipeline(&settings).await?;
    let image = args.image.as_deref().map(read_image).transpose()?;

    if let Some(question) = args.question {
        let mut request = QueryRequest::new(question);
        if let Some(image) = image {
            request = request.with_image(image);
        }
        answer(&pipeline, request).await;
        return Ok(());
    }

    interactive(&pipeline, image).await
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Cannot read image {}", path.display()))
}

async fn build_pipeline(settings: &Settings) -> Result<AdaptiveRag> {
    let embedder = Arc::new(OllamaEmbedder::new(&settings.ollama)?);
    let store = QdrantStore::open(&settings.index, embedder)
        .await
        .context("Problem while opening the knowledge base")?;
    let generator = OllamaGenerator::new(&settings.ollama, &settings.pipeline.model)?;
    let search = SearxngSearch::new(&settings.search)?;
    let captioner = OllamaCaptioner::new(&settings.ollama)?;

    let pipeline = AdaptiveRag::builder()
        .settings(settings.pipeline.clone())
        .generator(Arc::new(generator))
        .store(Arc::new(store))
        .search(Arc::new(search))
        .captioner(Arc::new(captioner))
        .build()?;
    info!(
        model = %settings.pipeline.model,
        collection = %settings.index.collection,
        "Pipeline ready"
    );
    Ok(pipeline)
}

/// Reads questions until `exit`, keeping the conversation between turns.
/// `clear` forgets the conversation so far.
///
/// An image given on the command line is attached to the first question.
async fn interactive(pipeline: &AdaptiveRag, mut image: Option<Vec<u8>>) -> Result<()> {
    let mut memory = SessionMemory::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("Enter your question (or 'exit' to quit): ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let question = line?;
        let question = question.trim();
        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.eq_ignore_ascii_case("clear") {
            memory.clear();
            info!(session = %memory.session_id(), "Conversation cleared");
            continue;
        }
        if question.is_empty() && image.is_none() {
            continue;
        }

        let mut request = QueryRequest::new(question).with_history(memory.history());
        if let Some(image) = image.take() {
            request = request.with_image(image);
        }
        let response = answer(pipeline, request).await;
        memory.add_exchange(question, &response);
    }

    info!(session = %memory.session_id(), turns = memory.messages().len(), "Session ended");
    Ok(())
}

async fn answer(pipeline: &AdaptiveRag, request: QueryRequest) -> String {
    match pipeline.run(request).await {
        Ok(result) => {
            println!("\n{result}");
            result.final_response
        }
        Err(e) => {
            error!(error = %e, "Query failed");
            println!("\n{APOLOGY}");
            APOLOGY.to_string()
        }
    }
}
