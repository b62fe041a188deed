//! REST API Route Tests
//!
//! Exercises the HTTP surface through `create_app` with a scripted provider,
//! an in-memory object store and an outbox standing in for the mail API.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use object_store::memory::InMemory;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tower::util::ServiceExt;

use parley_gateway::core::email::{EmailResult, EmailSender};
use parley_gateway::core::storage::ObjectStoreUploader;
use parley_gateway::{
    ChatTurn, LanguageModel, ProviderResult, ServerConfig, SpeechSynthesizer, Transcriber, routes,
    state::AppState,
};

// =============================================================================
// Fakes
// =============================================================================

/// Deterministic provider whose answers echo their inputs.
struct ScriptedProvider;

#[async_trait]
impl LanguageModel for ScriptedProvider {
    async fn chat(&self, history: &[ChatTurn], message: &str) -> ProviderResult<String> {
        Ok(format!("reply({}) to {message}", history.len()))
    }

    async fn translate(&self, text: &str, target_language: &str) -> ProviderResult<String> {
        Ok(format!("[{target_language}] {text}"))
    }

    async fn generate_title(&self, texts: &[String], language: &str) -> ProviderResult<String> {
        Ok(format!("{language}:{}", texts.join("|")))
    }
}

#[async_trait]
impl Transcriber for ScriptedProvider {
    async fn transcribe(&self, audio: Bytes, file_name: &str) -> ProviderResult<String> {
        Ok(format!("{} bytes from {file_name}", audio.len()))
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedProvider {
    async fn synthesize(&self, text: &str) -> ProviderResult<Bytes> {
        Ok(Bytes::from(format!("mp3:{text}")))
    }
}

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<(String, String)>>,
}

impl Outbox {
    /// The six-digit code in the latest message to `to`.
    fn last_code(&self, to: &str) -> String {
        let sent = self.sent.lock();
        let (_, body) = sent
            .iter()
            .rev()
            .find(|(recipient, _)| recipient == to)
            .expect("a message was sent");
        body.split_whitespace()
            .map(|word| word.trim_end_matches('.'))
            .find(|word| word.len() == 6 && word.chars().all(|c| c.is_ascii_digit()))
            .expect("message contains a code")
            .to_string()
    }
}

#[async_trait]
impl EmailSender for Outbox {
    async fn send_text(&self, to: &str, _subject: &str, body: &str) -> EmailResult<()> {
        self.sent.lock().push((to.to_string(), body.to_string()));
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct TestApp {
    router: Router,
    outbox: Arc<Outbox>,
}

fn test_app(with_uploader: bool) -> TestApp {
    let outbox = Arc::new(Outbox::default());
    let mut builder = AppState::builder(ServerConfig::for_testing())
        .with_provider(Arc::new(ScriptedProvider))
        .with_email(outbox.clone());
    if with_uploader {
        builder = builder.with_uploader(Arc::new(ObjectStoreUploader::new(
            Arc::new(InMemory::new()),
            "audio",
            "https://cdn.example.com/",
        )));
    }
    let state = builder.build().unwrap();
    TestApp {
        router: routes::create_app(state),
        outbox,
    }
}

impl TestApp {
    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Sign up, log in and verify the emailed code. Returns `(user_id, token)`.
    async fn sign_in(&self, email: &str) -> (String, String) {
        let (status, _) = self
            .call(
                "POST",
                "/api/auth/signup",
                None,
                Some(json!({"name": "Aki", "email": email, "password": "s3cret-pass"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = self
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"email": email, "password": "s3cret-pass"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let user_id = body["data"]["user_id"].as_str().unwrap().to_string();

        let otp = self.outbox.last_code(email);
        let (status, body) = self
            .call(
                "POST",
                "/api/auth/verify-otp",
                None,
                Some(json!({"user_id": user_id, "otp": otp})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["token_type"], "Bearer");
        let token = body["data"]["access_token"].as_str().unwrap().to_string();
        (user_id, token)
    }
}

// =============================================================================
// Auth
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = test_app(false);
    let (status, body) = app.call("GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "OK"}));
}

#[tokio::test]
async fn test_signup_login_verify_and_me() {
    let app = test_app(false);
    let (user_id, token) = app.sign_in("aki@example.com").await;

    let (status, body) = app.call("GET", "/api/auth/auth-me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], user_id.as_str());
    assert_eq!(body["data"]["email"], "aki@example.com");

    let (status, body) = app
        .call("POST", "/api/auth/refresh-token", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["access_token"].as_str().is_some());
}

#[tokio::test]
async fn test_duplicate_signup_is_rejected() {
    let app = test_app(false);
    let signup = json!({"name": "Aki", "email": "dup@example.com", "password": "s3cret-pass"});
    let (status, _) = app
        .call("POST", "/api/auth/signup", None, Some(signup.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.call("POST", "/api/auth/signup", None, Some(signup)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email already registered");
}

#[tokio::test]
async fn test_wrong_password_and_reused_code() {
    let app = test_app(false);
    let (user_id, _) = app.sign_in("reuse@example.com").await;

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "reuse@example.com", "password": "wrong-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The code from sign_in was consumed.
    let used = app.outbox.last_code("reuse@example.com");
    let (status, _) = app
        .call(
            "POST",
            "/api/auth/verify-otp",
            None,
            Some(json!({"user_id": user_id, "otp": used})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_body_is_unprocessable() {
    let app = test_app(false);
    let (status, body) = app
        .call("POST", "/api/auth/signup", None, Some(json!({"email": "x@example.com"})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], 422);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = test_app(false);
    for (method, uri) in [
        ("GET", "/api/auth/auth-me"),
        ("GET", "/api/user/get-settings"),
        ("POST", "/chat"),
        ("GET", "/user-conversations?user_id=00000000-0000-0000-0000-000000000000"),
    ] {
        let (status, _) = app.call(method, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
    }

    let (status, _) = app
        .call("GET", "/api/auth/auth-me", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Settings
// =============================================================================

#[tokio::test]
async fn test_settings_roundtrip() {
    let app = test_app(false);
    let (_, token) = app.sign_in("settings@example.com").await;

    let (status, body) = app
        .call("GET", "/api/user/get-settings", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"name": "Aki", "preferred_language": "ja"}));

    let (status, _) = app
        .call(
            "PUT",
            "/api/user/update-settings",
            Some(&token),
            Some(json!({"preferred_language": "en"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            "PUT",
            "/api/user/update-settings",
            Some(&token),
            Some(json!({"preferred_language": "  "})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, body) = app
        .call("GET", "/api/user/get-settings", Some(&token), None)
        .await;
    assert_eq!(body["data"]["preferred_language"], "en");
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_history_with_generated_title() {
    let app = test_app(false);
    let (user_id, token) = app.sign_in("history@example.com").await;

    let (status, body) = app
        .call(
            "POST",
            "/history",
            Some(&token),
            Some(json!({
                "userId": user_id,
                "messages": [
                    {"role": "user", "content": "konnichiwa"},
                    {"role": "assistant", "content": "hello", "translatedContent": "konnichiwa"},
                    {"role": "user", "content": "genki?"}
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let conversation_id = body["data"]["conversation_id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call("GET", &format!("/history/{user_id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let history = body["data"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["title"], "ja:konnichiwa|genki?");
    assert_eq!(history[0]["messages"].as_array().unwrap().len(), 3);
    assert_eq!(history[0]["messages"][1]["translatedContent"], "konnichiwa");

    let (status, _) = app
        .call(
            "POST",
            "/save-messages",
            Some(&token),
            Some(json!({
                "conversationId": conversation_id,
                "messages": [{"role": "assistant", "content": "genki desu"}]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(
            "GET",
            &format!("/conversation-messages?conversation_id={conversation_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(contents, vec!["konnichiwa", "hello", "genki?", "genki desu"]);
}

#[tokio::test]
async fn test_conversations_listed_newest_first() {
    let app = test_app(false);
    let (user_id, token) = app.sign_in("list@example.com").await;

    for title in ["first", "second"] {
        let (status, _) = app
            .call(
                "POST",
                "/history",
                Some(&token),
                Some(json!({"userId": user_id, "title": title, "messages": []})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app
        .call(
            "GET",
            &format!("/user-conversations?user_id={user_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["second", "first"]);
}

#[tokio::test]
async fn test_history_ownership_and_invalid_ids() {
    let app = test_app(false);
    let (owner_id, owner_token) = app.sign_in("owner@example.com").await;
    let (_, other_token) = app.sign_in("other@example.com").await;

    let (status, _) = app
        .call("GET", &format!("/history/{owner_id}"), Some(&other_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            "POST",
            "/history",
            Some(&other_token),
            Some(json!({"userId": owner_id, "title": "t", "messages": []})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            "POST",
            "/save-messages",
            Some(&owner_token),
            Some(json!({"conversationId": "not-a-uuid", "messages": []})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid conversationId");

    let (status, _) = app
        .call(
            "POST",
            "/save-messages",
            Some(&owner_token),
            Some(json!({
                "conversationId": "6f1c1f8e-0000-4000-8000-000000000000",
                "messages": []
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            "GET",
            "/conversation-messages?conversation_id=6f1c1f8e-0000-4000-8000-000000000000",
            Some(&owner_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));

    let (status, _) = app
        .call("GET", "/user-conversations?user_id=nope", Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app
        .call(
            "POST",
            "/history",
            Some(&owner_token),
            Some(json!({"userId": owner_id, "messages": [{"role": "system", "content": "x"}]})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// =============================================================================
// Assistant
// =============================================================================

#[tokio::test]
async fn test_chat_and_translate() {
    let app = test_app(false);
    let (_, token) = app.sign_in("chat@example.com").await;

    let (status, body) = app
        .call(
            "POST",
            "/chat",
            Some(&token),
            Some(json!({
                "message": "how are you?",
                "history": [{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reply"], "reply(2) to how are you?");

    let (status, body) = app
        .call(
            "POST",
            "/translate",
            Some(&token),
            Some(json!({"text": "good morning", "target_language": "ja"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["translated_text"], "[ja] good morning");
}

#[tokio::test]
async fn test_transcribe_multipart() {
    let app = test_app(false);
    let (_, token) = app.sign_in("stt@example.com").await;

    let boundary = "parley-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"clip.webm\"\r\n\
         Content-Type: audio/webm\r\n\r\n\
         abcdef\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/transcribe")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["text"], "6 bytes from clip.webm");
}

#[tokio::test]
async fn test_transcribe_rejects_non_multipart_body() {
    let app = test_app(false);
    let (_, token) = app.sign_in("stt-json@example.com").await;

    let (status, body) = app
        .call("POST", "/transcribe", Some(&token), Some(json!({"file": "abc"})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], 422);
}

#[tokio::test]
async fn test_text_chat_translates_and_uploads_speech() {
    let app = test_app(true);
    let (_, token) = app.sign_in("textchat@example.com").await;

    let (status, body) = app
        .call(
            "POST",
            "/text-chat",
            Some(&token),
            Some(json!({"message": "hello", "language": "en"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "assistant");
    assert_eq!(body["data"]["content"], "reply(0) to hello");
    assert_eq!(body["data"]["translatedContent"], "[en] reply(0) to hello");
    let audio_url = body["data"]["audioUrl"].as_str().unwrap();
    assert!(audio_url.starts_with("https://cdn.example.com/audio/"));
    assert!(audio_url.ends_with(".mp3"));
}

#[tokio::test]
async fn test_upload_routes_without_storage() {
    let app = test_app(false);
    let (_, token) = app.sign_in("nostorage@example.com").await;

    let (status, _) = app
        .call("POST", "/text-chat", Some(&token), Some(json!({"message": "hi"})))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = app
        .call("POST", "/tts-api", Some(&token), Some(json!({"text": "hi"})))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_tts_returns_audio() {
    let app = test_app(true);
    let (_, token) = app.sign_in("tts@example.com").await;

    let request = Request::builder()
        .method("POST")
        .uri("/tts")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"text": "arigatou"}).to_string()))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    let audio = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&audio[..], b"mp3:arigatou");

    let (status, body) = app
        .call("POST", "/tts-api", Some(&token), Some(json!({"text": "arigatou"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["audio_url"].as_str().unwrap().ends_with(".mp3"));

    let (status, _) = app
        .call("POST", "/tts", Some(&token), Some(json!({"text": "   "})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
