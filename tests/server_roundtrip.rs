use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use peel_tutor::config::Config;
use peel_tutor::error::{AppError, ValidationError};
use peel_tutor::infrastructure::{DocumentStore, GenerationRequest, Generator, TextStream};
use peel_tutor::models::prompts::{EXPLANATION_INSTRUCTIONS, POINTS_INSTRUCTIONS};
use peel_tutor::models::wire::ErrorBody;
use peel_tutor::models::{AttachmentRef, ChatRequest, EvidenceChoice, PointsRequest, Stage};
use peel_tutor::orchestrator::routes::UPSTREAM_FAILED_MESSAGE;
use peel_tutor::{router, AppResult, AppState, HttpTutorApi, TutorApi, TutorFlow};

const QUESTION: &str = "How far was the USA responsible for the Cold War?";

/// 按系统指令分派的假生成器
#[derive(Default)]
struct StubGenerator {
    requests: Mutex<Vec<GenerationRequest>>,
}

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, request: GenerationRequest) -> AppResult<String> {
        let reply = if request.instructions == POINTS_INSTRUCTIONS {
            "1. **Truman Doctrine**: the USA pledged to contain communism.\n\
             2. **Marshall Plan**: economic aid tied Western Europe to the USA."
        } else if request.instructions == EXPLANATION_INSTRUCTIONS {
            "**Great job!** You clearly link the aid to Soviet fears."
        } else {
            "🔸 **Option A (Weak):** The USA gave money to Europe.\n\
             🔹 **Option B (Strong):** In 1948 Congress approved $13 billion of Marshall aid."
        };
        self.requests.lock().unwrap().push(request);
        Ok(reply.to_string())
    }

    async fn generate_stream(&self, request: GenerationRequest) -> AppResult<TextStream> {
        self.requests.lock().unwrap().push(request);
        let pieces = vec!["Containment ", "meant ", "stopping 共产主义 spreading."];
        Ok(futures::stream::iter(pieces.into_iter().map(|p| Ok(p.to_string()))).boxed())
    }
}

/// 永远返回上游错误的生成器，错误里带着不该外泄的细节
struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _request: GenerationRequest) -> AppResult<String> {
        Err(AppError::bad_status(
            "https://api.openai.com/v1/responses",
            401,
            "Incorrect API key provided: sk-live-abcd1234",
        ))
    }

    async fn generate_stream(&self, request: GenerationRequest) -> AppResult<TextStream> {
        self.generate(request).await.map(|_| futures::stream::empty().boxed())
    }
}

#[derive(Default)]
struct CountingStore {
    calls: AtomicUsize,
}

#[async_trait]
impl DocumentStore for CountingStore {
    async fn store(&self, _file_name: &str, _bytes: Vec<u8>, _mime: &str) -> AppResult<AttachmentRef> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AttachmentRef::new(format!("file-{}", n)))
    }
}

struct TestServer {
    addr: SocketAddr,
    generator: Arc<StubGenerator>,
    store: Arc<CountingStore>,
}

impl TestServer {
    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

fn test_config() -> Config {
    Config {
        max_upload_bytes: 1024,
        ..Config::default()
    }
}

async fn serve(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}

async fn spawn_server() -> TestServer {
    let generator = Arc::new(StubGenerator::default());
    let store = Arc::new(CountingStore::default());
    let addr = serve(AppState::new(generator.clone(), store.clone(), &test_config())).await;

    TestServer {
        addr,
        generator,
        store,
    }
}

/// 断言响应是 400 且带 JSON `{error}`，返回错误文字
async fn expect_json_400(response: reqwest::Response) -> String {
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("application/json"), "got {}", content_type);
    let body: ErrorBody = response.json().await.unwrap();
    assert!(!body.error.is_empty());
    body.error
}

fn create_test_flow(server: &TestServer) -> TutorFlow<HttpTutorApi> {
    TutorFlow::new(HttpTutorApi::new(server.url()).unwrap(), &test_config())
        .with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn test_health() {
    let server = spawn_server().await;
    let body = reqwest::get(format!("{}/health", server.url()))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_paragraph_over_http() {
    let server = spawn_server().await;
    let flow = create_test_flow(&server);

    flow.begin().unwrap();
    let session = flow
        .attach("notes.pdf", b"%PDF-1.7 cold war notes".to_vec(), "application/pdf")
        .await
        .unwrap();
    assert_eq!(session.attachments(), &[AttachmentRef::new("file-1")]);

    let session = flow.generate_points(QUESTION).await.unwrap();
    assert_eq!(session.points().len(), 2);
    assert!(session.points()[0].starts_with("**Truman Doctrine**"));

    let session = flow.select_point(1).await.unwrap();
    let evidence = session.evidence().unwrap();
    assert_eq!(evidence.weak, "The USA gave money to Europe.");
    assert!(evidence.strong.contains("$13 billion"));

    flow.select_evidence(EvidenceChoice::Strong).unwrap();
    let session = flow
        .submit_explanation("The aid made Stalin fear American influence.")
        .await
        .unwrap();
    assert_eq!(session.stage(), Stage::Done);
    assert_eq!(session.transcript().len(), 6);

    // 每次生成都带上附件
    let requests = server.generator.requests.lock().unwrap();
    assert_eq!(requests.len(), 3);
    assert!(requests
        .iter()
        .all(|r| r.attachments == vec![AttachmentRef::new("file-1")]));
}

#[tokio::test]
async fn test_server_rejects_non_pdf_before_storing() {
    let server = spawn_server().await;
    let api = HttpTutorApi::new(server.url()).unwrap();

    let result = api.upload("notes.txt", b"plain".to_vec(), "text/plain").await;

    assert!(matches!(
        result,
        Err(AppError::Validation(ValidationError::Rejected(_)))
    ));
    assert_eq!(server.store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_blank_question_is_400() {
    let server = spawn_server().await;
    let api = HttpTutorApi::new(server.url()).unwrap();

    let result = api
        .generate_points(&PointsRequest {
            question: " ".to_string(),
            file_ids: vec![],
        })
        .await;

    assert!(matches!(
        result,
        Err(AppError::Validation(ValidationError::Rejected(_)))
    ));
    assert!(server.generator.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_streams_plain_text() {
    let server = spawn_server().await;
    let api = HttpTutorApi::new(server.url()).unwrap();

    let stream = api
        .chat(&ChatRequest {
            content: "What was containment?".to_string(),
            mode: Some("topic".to_string()),
            file_ids: vec![],
        })
        .await
        .unwrap();
    let text: Vec<String> = stream.map(|r| r.unwrap()).collect().await;

    assert_eq!(text.concat(), "Containment meant stopping 共产主义 spreading.");
    let requests = server.generator.requests.lock().unwrap();
    assert_eq!(requests[0].mode.as_deref(), Some("topic"));
}

#[tokio::test]
async fn test_upstream_failure_body_is_generic() {
    let store = Arc::new(CountingStore::default());
    let addr = serve(AppState::new(Arc::new(FailingGenerator), store, &test_config())).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/generate-points", addr))
        .json(&PointsRequest {
            question: QUESTION.to_string(),
            file_ids: vec![],
        })
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    let text = response.text().await.unwrap();
    assert!(!text.contains("sk-live"), "{}", text);
    assert!(!text.contains("api.openai.com"), "{}", text);
    let body: ErrorBody = serde_json::from_str(&text).unwrap();
    assert_eq!(body.error, UPSTREAM_FAILED_MESSAGE);
}

#[tokio::test]
async fn test_malformed_json_is_400_with_error_body() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/generate-points", server.url()))
        .json(&serde_json::json!({ "question": 5 }))
        .send()
        .await
        .unwrap();
    expect_json_400(response).await;

    let response = client
        .post(format!("{}/api/generate-evidence", server.url()))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    expect_json_400(response).await;

    assert!(server.generator.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_without_multipart_is_400_with_error_body() {
    let server = spawn_server().await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/upload", server.url()))
        .header(reqwest::header::CONTENT_TYPE, "text/plain")
        .body("%PDF-1.7")
        .send()
        .await
        .unwrap();

    expect_json_400(response).await;
    assert_eq!(server.store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_vision_without_image_is_400() {
    let server = spawn_server().await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/vision", server.url()))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();

    let message = expect_json_400(response).await;
    assert_eq!(message, ValidationError::MissingImage.to_string());
}

#[tokio::test]
async fn test_oversized_pdf_is_rejected_before_storing() {
    let server = spawn_server().await;
    let api = HttpTutorApi::new(server.url()).unwrap();
    let mut pdf = b"%PDF-1.7 ".to_vec();
    pdf.resize(1500, b'x');

    let result = api.upload("big.pdf", pdf, "application/pdf").await;

    match result {
        Err(AppError::Validation(ValidationError::Rejected(message))) => {
            let expected = ValidationError::FileTooLarge { size: 1500, max: 1024 }.to_string();
            assert_eq!(message, expected);
        }
        other => panic!("expected a size rejection, got {:?}", other),
    }
    assert_eq!(server.store.calls.load(Ordering::SeqCst), 0);
}
