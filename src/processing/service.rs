//! Pipeline service coordinating ingestion, corpus publication, and question answering.

use crate::{
    answer::{AnswerError, AnswerGenerator, ExtractiveAnswerGenerator, SummarizingAnswerGenerator},
    config::Config,
    embedding::{EmbeddingClient, embed_texts, get_embedding_client},
    index::{
        ActiveCorpus, CorpusSnapshot, FlatIpIndex, MetadataStore, load_index_and_store,
        save_index_and_store,
    },
    memory::{ConversationMemory, EvictionPolicy, infer_topic},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::build_corpus,
        pdf::read_pdf_with_pages,
        types::{
            AnswerStrategy, AskOutcome, AskRequest, IngestError, IngestOutcome, Page,
            PipelineError,
        },
    },
    retriever::Retriever,
    summarization::{SummarizationClient, get_summarization_client},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Coordinates ingestion and querying over a single active corpus.
///
/// The pipeline owns the embedding client, the active corpus handle, conversation memory, and the
/// answer generators so that the HTTP surface and the CLI share the same components. Construct it
/// once near process start and share it through an `Arc`.
pub struct DocumentPipeline {
    config: Config,
    embedder: Arc<dyn EmbeddingClient>,
    corpus: ActiveCorpus,
    memory: ConversationMemory,
    extractive: ExtractiveAnswerGenerator,
    summarizer: Result<SummarizingAnswerGenerator, String>,
    metrics: PipelineMetrics,
    ingest_lock: Mutex<()>,
}

/// Abstraction over the pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Extract, chunk, embed, and index the PDF at `path`, replacing the active corpus.
    async fn ingest_pdf(&self, path: &Path) -> Result<IngestOutcome, PipelineError>;

    /// Answer a question against the active corpus.
    async fn ask(&self, request: AskRequest) -> Result<AskOutcome, PipelineError>;

    /// Directory uploaded documents are stored in.
    fn upload_dir(&self) -> PathBuf;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl DocumentPipeline {
    /// Build a pipeline with the collaborators selected by `config`.
    ///
    /// A misconfigured summarization provider does not fail construction; summarized answers are
    /// reported as unavailable instead while extractive answers keep working.
    pub fn new(config: Config) -> Self {
        tracing::info!(
            provider = ?config.embedding_provider,
            model = %config.embedding_model,
            "Initializing embedding client"
        );
        let embedder: Arc<dyn EmbeddingClient> = Arc::from(get_embedding_client(&config));
        let summarizer: Option<Arc<dyn SummarizationClient>> =
            match get_summarization_client(&config) {
                Ok(client) => Some(Arc::from(client)),
                Err(error) => {
                    tracing::info!(%error, "Summarized answers disabled");
                    None
                }
            };
        Self::with_clients(config, embedder, summarizer)
    }

    /// Build a pipeline around explicit collaborators.
    pub fn with_clients(
        config: Config,
        embedder: Arc<dyn EmbeddingClient>,
        summarizer: Option<Arc<dyn SummarizationClient>>,
    ) -> Self {
        let summarizer = summarizer
            .map(|client| {
                SummarizingAnswerGenerator::new(
                    client,
                    config.summarization_model.clone(),
                    config.summarization_max_tokens,
                    config.summarization_timeout(),
                )
            })
            .ok_or_else(|| {
                "configure SUMMARIZATION_PROVIDER and its credentials to enable them".to_string()
            });
        let memory = ConversationMemory::with_policy(EvictionPolicy {
            idle_ttl: config.session_idle_ttl(),
            max_entries: config.session_max_entries,
        });

        Self {
            config,
            embedder,
            corpus: ActiveCorpus::new(),
            memory,
            extractive: ExtractiveAnswerGenerator,
            summarizer,
            metrics: PipelineMetrics::new(),
            ingest_lock: Mutex::new(()),
        }
    }

    /// Configuration the pipeline was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Conversation memory shared by all queries.
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Currently published corpus, if any.
    pub fn active_corpus(&self) -> Option<Arc<CorpusSnapshot>> {
        self.corpus.current()
    }

    /// Publish the corpus persisted under the configured index directory, if present.
    ///
    /// Returns `Ok(false)` when neither artifact exists. A lone artifact, a length mismatch, or a
    /// checksum mismatch is an error.
    pub async fn load_existing(&self) -> Result<bool, PipelineError> {
        let index_path = self.config.index_path();
        let store_path = self.config.store_path();
        if !index_path.exists() && !store_path.exists() {
            tracing::info!(index_path = %index_path.display(), "No persisted corpus found");
            return Ok(false);
        }

        let snapshot = load_index_and_store(&index_path, &store_path).await?;
        self.corpus.publish(Arc::new(snapshot));
        Ok(true)
    }

    /// Extract, chunk, embed, and index the PDF at `path`, replacing the active corpus.
    pub async fn ingest_pdf(&self, path: &Path) -> Result<IngestOutcome, PipelineError> {
        tracing::info!(path = %path.display(), "Ingesting PDF");
        if !path.exists() {
            return Err(IngestError::NotFound(path.to_path_buf()).into());
        }

        let owned = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || read_pdf_with_pages(&owned))
            .await
            .map_err(|error| IngestError::Unreadable {
                path: path.to_path_buf(),
                reason: error.to_string(),
            })??;
        self.ingest_pages(pages).await
    }

    /// Chunk, embed, and index already extracted pages, replacing the active corpus.
    ///
    /// The new index and store are built completely, persisted, and only then published, so
    /// concurrent queries see either the previous corpus or this one.
    pub async fn ingest_pages(&self, pages: Vec<Page>) -> Result<IngestOutcome, PipelineError> {
        if pages.is_empty() {
            return Err(IngestError::NoText.into());
        }
        let corpus = build_corpus(&pages, self.config.chunk_size, self.config.chunk_overlap)?;
        if corpus.is_empty() {
            return Err(IngestError::NoText.into());
        }

        let texts = corpus.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = embed_texts(self.embedder.as_ref(), texts).await?;
        let index = FlatIpIndex::build(self.embedder.dimension(), &vectors)?;
        let store = MetadataStore::new(self.embedder.model_name(), self.embedder.dimension(), corpus);
        let snapshot = CorpusSnapshot::new(index, store)?;
        let chunks = snapshot.len();

        let index_path = self.config.index_path();
        let store_path = self.config.store_path();
        {
            let _guard = self.ingest_lock.lock().await;
            save_index_and_store(&snapshot, &index_path, &store_path).await?;
            self.corpus.publish(Arc::new(snapshot));
        }
        self.metrics.record_document(chunks as u64);
        tracing::info!(pages = pages.len(), chunks, "Published new corpus");

        Ok(IngestOutcome {
            chunks,
            pages: pages.len(),
            index_path,
            store_path,
        })
    }

    /// Answer a question against the active corpus.
    ///
    /// Contextualization, retrieval, and the memory update run while holding the session lock,
    /// so repeated submissions on one session apply in order. Answer generation runs after the
    /// lock is released.
    pub async fn ask(&self, request: AskRequest) -> Result<AskOutcome, PipelineError> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "question must not be empty".into(),
            ));
        }
        let snapshot = self.corpus.current().ok_or(PipelineError::NoCorpus)?;
        let retriever = Retriever::new(snapshot, Arc::clone(&self.embedder))?;
        let top_k = self.resolve_top_k(request.top_k);

        let (contextualized_question, results) = {
            let mut session = self.memory.session(&request.session_id).await;
            let contextualized = session.contextualize(question);
            let results = retriever.search(&contextualized, top_k).await?;
            session.update(question, &infer_topic(question));
            (contextualized, results)
        };
        tracing::debug!(
            session_id = %request.session_id,
            contextualized = %contextualized_question,
            top_k,
            results = results.len(),
            strategy = ?request.strategy,
            "Retrieved results"
        );

        let answer = match request.strategy {
            AnswerStrategy::Extractive => self.extractive.generate(question, &results).await?,
            AnswerStrategy::Summarize => match &self.summarizer {
                Ok(generator) => generator.generate(question, &results).await?,
                Err(reason) => return Err(AnswerError::Unavailable(reason.clone()).into()),
            },
        };
        self.metrics.record_question();

        Ok(AskOutcome {
            answer,
            results,
            contextualized_question,
        })
    }

    /// Directory uploaded documents are stored in.
    pub fn upload_dir(&self) -> PathBuf {
        self.config.data_dir.clone()
    }

    /// Retrieve the current metrics snapshot for diagnostics.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn resolve_top_k(&self, requested: Option<usize>) -> usize {
        requested
            .filter(|top_k| *top_k > 0)
            .unwrap_or(self.config.top_k)
            .min(self.config.max_top_k)
    }
}

#[async_trait]
impl PipelineApi for DocumentPipeline {
    async fn ingest_pdf(&self, path: &Path) -> Result<IngestOutcome, PipelineError> {
        DocumentPipeline::ingest_pdf(self, path).await
    }

    async fn ask(&self, request: AskRequest) -> Result<AskOutcome, PipelineError> {
        DocumentPipeline::ask(self, request).await
    }

    fn upload_dir(&self) -> PathBuf {
        DocumentPipeline::upload_dir(self)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        DocumentPipeline::metrics_snapshot(self)
    }
}
