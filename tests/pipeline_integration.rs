use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use docqa::{
    api::create_router,
    config::{Config, EmbeddingProvider, SummarizationProvider},
    processing::{AnswerStrategy, AskRequest, DocumentPipeline, ErrorKind, Page},
};
use httpmock::{Method::POST, MockServer};
use lopdf::{
    Document, Object, Stream,
    content::{Content, Operation},
    dictionary,
};
use serde_json::{Value, json};
use tower::ServiceExt;

fn set_env(key: &str, value: &str) {
    // SAFETY: Only this test mutates the environment and nothing else reads these keys.
    unsafe { std::env::set_var(key, value) }
}

fn config_in(dir: &Path) -> Config {
    Config {
        chunk_size: 200,
        chunk_overlap: 40,
        index_dir: dir.join("models"),
        data_dir: dir.join("data"),
        embedding_dimension: 256,
        ..Config::default()
    }
}

fn budget_pages() -> Vec<Page> {
    vec![
        Page::new(1, "The national budget allocates funds to schools and hospitals."),
        Page::new(2, "Public debt rose after the infrastructure loan program."),
        Page::new(3, "Tax revenue from corporate income exceeded projections."),
    ]
}

fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("save pdf");
}

async fn send(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .expect("request"),
        )
        .await
        .expect("router response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, serde_json::from_slice(&body).expect("json body"))
}

#[tokio::test]
async fn pdf_ingested_over_http_answers_questions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pdf_path = dir.path().join("policy.pdf");
    write_pdf(
        &pdf_path,
        &[
            "The deficit narrowed because grant spending fell.",
            "Infrastructure loans were refinanced at lower rates.",
        ],
    );
    let app = create_router(Arc::new(DocumentPipeline::new(config_in(dir.path()))));

    let (status, body) = send(&app, "/ingest", json!({ "pdf_path": pdf_path })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["chunks"], 2);
    assert!(dir.path().join("models/index.faiss").exists());
    assert!(dir.path().join("models/store.json").exists());

    let (status, body) = send(
        &app,
        "/ask",
        json!({ "session_id": "web", "question": "How were infrastructure loans refinanced?", "top_k": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["results"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["results"][0]["page"], 2);
    assert!(
        body["answer"]
            .as_str()
            .is_some_and(|answer| answer.contains("Top matches:"))
    );
}

#[tokio::test]
async fn missing_pdf_path_is_reported_as_bad_request() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = create_router(Arc::new(DocumentPipeline::new(config_in(dir.path()))));

    let (status, body) = send(
        &app,
        "/ingest",
        json!({ "pdf_path": dir.path().join("nope.pdf") }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["detail"]
            .as_str()
            .is_some_and(|detail| detail.starts_with("PDF not found"))
    );
}

#[tokio::test]
async fn summarized_answers_come_from_the_remote_model() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key")
                .body_contains("(Page 2) Public debt rose");
            then.status(200).json_body(json!({
                "choices": [{ "message": { "content": "Debt rose because of the loan program (page 2)." } }]
            }));
        })
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config {
        summarization_provider: SummarizationProvider::OpenAI,
        summarization_url: Some(server.url("/v1/chat/completions")),
        summarization_api_key: Some("test-key".into()),
        ..config_in(dir.path())
    };
    let pipeline = Arc::new(DocumentPipeline::new(config));
    pipeline.ingest_pages(budget_pages()).await.expect("ingest");
    let app = create_router(pipeline);

    let (status, body) = send(
        &app,
        "/ask",
        json!({
            "session_id": "s",
            "question": "Public debt rose after the infrastructure loan program.",
            "top_k": 1,
            "use_llm": true
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    mock.assert_async().await;
    let answer = body["answer"].as_str().expect("answer");
    assert!(answer.starts_with("Debt rose because of the loan program (page 2)."));
    assert!(answer.ends_with("---\nSources:\n- Page 2, score 1.000"));
}

#[tokio::test]
async fn failing_remote_model_is_a_bad_gateway() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(503).body("overloaded");
        })
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config {
        summarization_provider: SummarizationProvider::OpenAI,
        summarization_url: Some(server.url("/v1/chat/completions")),
        summarization_api_key: Some("test-key".into()),
        ..config_in(dir.path())
    };
    let pipeline = Arc::new(DocumentPipeline::new(config));
    pipeline.ingest_pages(budget_pages()).await.expect("ingest");
    let app = create_router(pipeline);

    let (status, _) = send(
        &app,
        "/ask",
        json!({ "session_id": "s", "question": "debt?", "use_llm": true }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, _) = send(
        &app,
        "/ask",
        json!({ "session_id": "s", "question": "debt?" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn switching_embedding_models_requires_reingestion() {
    let dir = tempfile::tempdir().expect("tempdir");
    DocumentPipeline::new(Config {
        embedding_model: "model-a".into(),
        ..config_in(dir.path())
    })
    .ingest_pages(budget_pages())
    .await
    .expect("ingest");

    let restarted = DocumentPipeline::new(Config {
        embedding_model: "model-b".into(),
        ..config_in(dir.path())
    });
    assert!(restarted.load_existing().await.expect("load"));
    let app = create_router(Arc::new(restarted));

    let (status, body) = send(
        &app,
        "/ask",
        json!({ "session_id": "s", "question": "budget" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(
        body["detail"]
            .as_str()
            .is_some_and(|detail| detail.contains("re-ingest"))
    );
}

#[tokio::test]
async fn switching_embedding_providers_under_one_model_name_requires_reingestion() {
    let server = MockServer::start_async().await;
    let embed = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/embed");
            then.status(200)
                .json_body(json!({ "embeddings": [[0.5, 0.5, 0.5, 0.5]] }));
        })
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let hashed = Config {
        embedding_dimension: 4,
        ..config_in(dir.path())
    };
    DocumentPipeline::new(hashed.clone())
        .ingest_pages(budget_pages())
        .await
        .expect("ingest");

    let restarted = DocumentPipeline::new(Config {
        embedding_provider: EmbeddingProvider::Ollama,
        ollama_url: Some(server.base_url()),
        ..hashed.clone()
    });
    assert!(restarted.load_existing().await.expect("load"));
    assert_eq!(
        restarted
            .active_corpus()
            .expect("corpus")
            .embedding_model(),
        Some(format!("hashing:{}", hashed.embedding_model).as_str())
    );

    let error = restarted
        .ask(AskRequest {
            session_id: "s".into(),
            question: "budget".into(),
            top_k: None,
            strategy: AnswerStrategy::Extractive,
        })
        .await
        .expect_err("mixed providers");
    assert_eq!(error.kind(), ErrorKind::ModelMismatch);
    embed.assert_hits_async(0).await;
}

#[tokio::test]
async fn environment_configures_the_pipeline() {
    let dir = tempfile::tempdir().expect("tempdir");
    set_env("INDEX_DIR", &dir.path().join("env-models").display().to_string());
    set_env("CHUNK_SIZE", "64");
    set_env("CHUNK_OVERLAP", "8");
    set_env("EMBEDDING_DIMENSION", "96");

    let config = Config::from_env().expect("config");
    assert_eq!(config.chunk_size, 64);
    assert_eq!(config.embedding_dimension, 96);

    let pipeline = DocumentPipeline::new(config);
    let outcome = pipeline.ingest_pages(budget_pages()).await.expect("ingest");
    assert_eq!(outcome.index_path, dir.path().join("env-models/index.faiss"));
    assert_eq!(
        pipeline.active_corpus().expect("corpus").index().dimension(),
        96
    );
}
