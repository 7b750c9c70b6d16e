//! API integration tests
//!
//! Each test drives the full router over the in-memory store.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use library_server::{
    api::create_router,
    config::{AppConfig, StorageBackend},
    repository::Repository,
    services::Services,
    AppState,
};

const ADMIN_EMAIL: &str = "admin@library.test";
const ADMIN_PASSWORD: &str = "admin-secret";

struct TestApp {
    router: Router,
}

impl TestApp {
    async fn new() -> Self {
        let mut config = AppConfig::default();
        config.database.backend = StorageBackend::Memory;
        config.auth.jwt_secret = "integration-secret".to_string();
        config.auth.admin_email = Some(ADMIN_EMAIL.to_string());
        config.auth.admin_password = Some(ADMIN_PASSWORD.to_string());

        let services = Services::new(Repository::in_memory(), &config);
        services.auth.ensure_admin().await.expect("Failed to seed admin");

        let state = AppState {
            config: Arc::new(config),
            services: Arc::new(services),
        };
        Self {
            router: create_router(state),
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Failed to parse response")
        };
        (status, body)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, token, Some(body)).await
    }

    async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, token, None).await
    }

    /// Register a reader and return its token
    async fn register(&self, name: &str, email: &str) -> String {
        let (status, body) = self
            .post(
                "/auth/register",
                None,
                json!({ "name": name, "email": email, "password": "password123" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"]["token"].as_str().expect("No token in response").to_string()
    }

    async fn admin_token(&self) -> String {
        let (status, body) = self
            .post(
                "/auth/login",
                None,
                json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["data"]["token"].as_str().expect("No token in response").to_string()
    }

    /// Create a book as admin and return its id
    async fn create_book(&self, admin: &str, title: &str, stock: i32) -> i64 {
        let (status, body) = self
            .post(
                "/books",
                Some(admin),
                json!({ "title": title, "author": "Ursula K. Le Guin", "year": 1969, "stock": stock }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"]["id"].as_i64().expect("No book id")
    }

    async fn user_id(&self, admin: &str, email: &str) -> i64 {
        let (_, body) = self.get("/users", Some(admin)).await;
        body["data"]["users"]
            .as_array()
            .expect("No users array")
            .iter()
            .find(|u| u["email"] == email)
            .and_then(|u| u["id"].as_i64())
            .expect("User not listed")
    }

    async fn stock(&self, book_id: i64) -> i64 {
        let (_, body) = self.get(&format!("/books/{}", book_id), None).await;
        body["data"]["stock"].as_i64().expect("No stock")
    }
}

#[tokio::test]
async fn test_health_and_info() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.get("/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    let (status, body) = app.get("/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "library-server");
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn test_register_and_login() {
    let app = TestApp::new().await;
    app.register("Ged", "ged@earthsea.test").await;

    let (status, body) = app
        .post(
            "/auth/login",
            None,
            json!({ "email": "ged@earthsea.test", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["data"]["token"].is_string());
}

#[tokio::test]
async fn test_duplicate_email_is_rejected() {
    let app = TestApp::new().await;
    app.register("Ged", "ged@earthsea.test").await;

    let (status, body) = app
        .post(
            "/auth/register",
            None,
            json!({ "name": "Sparrowhawk", "email": "ged@earthsea.test", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let admin = app.admin_token().await;
    let (_, body) = app.get("/users", Some(&admin)).await;
    let matching = body["data"]["users"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|u| u["email"] == "ged@earthsea.test")
        .count();
    assert_eq!(matching, 1);
}

#[tokio::test]
async fn test_register_validation() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(
            "/auth/register",
            None,
            json!({ "name": "Tenar", "email": "not-an-email", "password": "123" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation");

    let (status, _) = app.post("/auth/register", None, json!({ "name": "Tenar" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_failures() {
    let app = TestApp::new().await;
    app.register("Ged", "ged@earthsea.test").await;

    let (status, body) = app
        .post(
            "/auth/login",
            None,
            json!({ "email": "ged@earthsea.test", "password": "wrong-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = app
        .post(
            "/auth/login",
            None,
            json!({ "email": "nobody@earthsea.test", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_users_requires_admin() {
    let app = TestApp::new().await;
    let reader = app.register("Ged", "ged@earthsea.test").await;
    let admin = app.admin_token().await;

    let (status, _) = app.get("/users", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/users", Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/users", Some(&reader)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.get("/users", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["users"].as_array().unwrap().len(), 2);
    assert!(body["data"]["users"][0].get("password").is_none());
}

#[tokio::test]
async fn test_users_access_own_record_only() {
    let app = TestApp::new().await;
    let ged = app.register("Ged", "ged@earthsea.test").await;
    let tenar = app.register("Tenar", "tenar@earthsea.test").await;
    let admin = app.admin_token().await;
    let ged_id = app.user_id(&admin, "ged@earthsea.test").await;
    let admin_id = app.user_id(&admin, ADMIN_EMAIL).await;

    let uri = format!("/users/{}", ged_id);

    let (status, body) = app.get(&uri, Some(&ged)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["name"], "Ged");

    let (status, _) = app.get(&uri, Some(&tenar)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get(&uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);

    // Updates and deletes are self-only, admins included
    let (status, _) = app.put(&uri, Some(&tenar), json!({ "name": "Not Ged" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.put(&uri, Some(&admin), json!({ "name": "Not Ged" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.delete(&uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.put(&uri, Some(&ged), json!({ "name": "Sparrowhawk" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["name"], "Sparrowhawk");

    let (status, _) = app
        .put(
            &format!("/users/{}", admin_id),
            Some(&admin),
            json!({ "name": "Archmage" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/users/9999", Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_to_taken_email_is_rejected() {
    let app = TestApp::new().await;
    let ged = app.register("Ged", "ged@earthsea.test").await;
    app.register("Tenar", "tenar@earthsea.test").await;
    let admin = app.admin_token().await;
    let ged_id = app.user_id(&admin, "ged@earthsea.test").await;

    let (status, _) = app
        .put(
            &format!("/users/{}", ged_id),
            Some(&ged),
            json!({ "email": "tenar@earthsea.test" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deleted_user_token_is_rejected() {
    let app = TestApp::new().await;
    let ged = app.register("Ged", "ged@earthsea.test").await;
    let admin = app.admin_token().await;
    let ged_id = app.user_id(&admin, "ged@earthsea.test").await;

    let (status, body) = app.delete(&format!("/users/{}", ged_id), Some(&ged)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("data").is_none());

    let (status, _) = app.get(&format!("/users/{}", ged_id), Some(&ged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/auth/login",
            None,
            json!({ "email": "ged@earthsea.test", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The email is free again
    app.register("Ged", "ged@earthsea.test").await;
}

#[tokio::test]
async fn test_books_are_public_and_admin_managed() {
    let app = TestApp::new().await;
    let reader = app.register("Ged", "ged@earthsea.test").await;
    let admin = app.admin_token().await;
    let book = json!({ "title": "A Wizard of Earthsea", "author": "Ursula K. Le Guin", "stock": 2 });

    let (status, _) = app.post("/books", None, book.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.post("/books", Some(&reader), book.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.post("/books", Some(&admin), book).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = app.get("/books", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let uri = format!("/books/{}", id);
    let (status, body) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "A Wizard of Earthsea");

    let (status, _) = app.put(&uri, Some(&reader), json!({ "stock": 10 })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app.put(&uri, Some(&admin), json!({ "stock": 10 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stock"], 10);

    let (status, _) = app.delete(&uri, Some(&reader)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.delete(&uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_id_uses_error_envelope() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    for uri in ["/books/abc", "/users/abc", "/transactions/1.5"] {
        let (status, body) = app.get(uri, Some(&admin)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Validation");
        assert!(body["message"].is_string());
    }
}

#[tokio::test]
async fn test_negative_stock_is_rejected() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let (status, _) = app
        .post(
            "/books",
            Some(&admin),
            json!({ "title": "Tehanu", "author": "Ursula K. Le Guin", "stock": -1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_cannot_borrow() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let book_id = app.create_book(&admin, "The Tombs of Atuan", 3).await;

    let (status, _) = app
        .post("/transactions", Some(&admin), json!({ "book_id": book_id }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.stock(book_id).await, 3);
}

#[tokio::test]
async fn test_borrow_decrements_stock() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let reader = app.register("Ged", "ged@earthsea.test").await;
    let book_id = app.create_book(&admin, "The Farthest Shore", 3).await;

    let (status, body) = app
        .post("/transactions", Some(&reader), json!({ "book_id": book_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let transaction = &body["data"]["transaction"];
    assert_eq!(transaction["book"]["title"], "The Farthest Shore");
    assert_eq!(transaction["status"], "active");
    assert!(transaction["deadline"].is_string());
    assert_eq!(app.stock(book_id).await, 2);

    // A second active loan of the same book is refused
    let (status, _) = app
        .post("/transactions", Some(&reader), json!({ "book_id": book_id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.stock(book_id).await, 2);
}

#[tokio::test]
async fn test_borrow_failures() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let ged = app.register("Ged", "ged@earthsea.test").await;
    let tenar = app.register("Tenar", "tenar@earthsea.test").await;
    let tenar_id = app.user_id(&admin, "tenar@earthsea.test").await;
    let book_id = app.create_book(&admin, "Tehanu", 1).await;

    let (status, _) = app
        .post("/transactions", Some(&ged), json!({ "book_id": 9999 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post(
            "/transactions",
            Some(&ged),
            json!({ "book_id": book_id, "user_id": tenar_id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post("/transactions", Some(&tenar), json!({ "book_id": book_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .post("/transactions", Some(&ged), json!({ "book_id": book_id }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "OutOfStock");
    assert_eq!(app.stock(book_id).await, 0);
}

#[tokio::test]
async fn test_concurrent_borrows_never_oversell() {
    let app = Arc::new(TestApp::new().await);
    let admin = app.admin_token().await;
    let book_id = app.create_book(&admin, "The Other Wind", 2).await;

    let mut readers = Vec::new();
    for i in 0..5 {
        readers.push(app.register("Reader", &format!("reader{}@earthsea.test", i)).await);
    }

    let handles: Vec<_> = readers
        .into_iter()
        .map(|token| {
            let app = Arc::clone(&app);
            tokio::spawn(async move {
                app.post("/transactions", Some(&token), json!({ "book_id": book_id }))
                    .await
                    .0
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            status => assert_eq!(status, StatusCode::CONFLICT),
        }
    }
    assert_eq!(created, 2);
    assert_eq!(app.stock(book_id).await, 0);
}

#[tokio::test]
async fn test_transactions_are_scoped_to_owner() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let ged = app.register("Ged", "ged@earthsea.test").await;
    let tenar = app.register("Tenar", "tenar@earthsea.test").await;
    let book_id = app.create_book(&admin, "Tales from Earthsea", 5).await;

    let (_, body) = app
        .post("/transactions", Some(&ged), json!({ "book_id": book_id }))
        .await;
    let ged_tx = body["data"]["transaction"]["id"].as_i64().unwrap();
    app.post("/transactions", Some(&tenar), json!({ "book_id": book_id }))
        .await;

    let (status, body) = app.get("/transactions", Some(&ged)).await;
    assert_eq!(status, StatusCode::OK);
    let mine = body["data"]["transactions"].as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["id"], ged_tx);

    let (_, body) = app.get("/transactions", Some(&admin)).await;
    assert_eq!(body["data"]["transactions"].as_array().unwrap().len(), 2);

    let uri = format!("/transactions/{}", ged_tx);
    let (status, body) = app.get(&uri, Some(&ged)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["transaction"]["book"]["title"], "Tales from Earthsea");
    assert!(body["data"]["transaction"]["created_at"].is_string());

    let (status, _) = app.get(&uri, Some(&tenar)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get(&uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/transactions", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.get("/transactions/9999", Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .put(&uri, Some(&tenar), json!({ "deadline": null }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_return_restocks_once() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let reader = app.register("Ged", "ged@earthsea.test").await;
    let book_id = app.create_book(&admin, "The Farthest Shore", 1).await;

    let (_, body) = app
        .post("/transactions", Some(&reader), json!({ "book_id": book_id }))
        .await;
    let uri = format!("/transactions/{}", body["data"]["transaction"]["id"]);
    assert_eq!(app.stock(book_id).await, 0);

    let (status, body) = app.put(&uri, Some(&reader), json!({ "deadline": null })).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let transaction = &body["data"]["transaction"];
    assert_eq!(transaction["status"], "returned");
    assert!(transaction["deadline"].is_null());
    assert!(transaction["returned_at"].is_string());
    assert_eq!(app.stock(book_id).await, 1);

    let (status, _) = app
        .put(&uri, Some(&reader), json!({ "status": "returned" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.stock(book_id).await, 1);

    // The same book can be borrowed again once returned
    let (status, _) = app
        .post("/transactions", Some(&reader), json!({ "book_id": book_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_admin_returns_readers_loan() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let reader = app.register("Tenar", "tenar@earthsea.test").await;
    let book_id = app.create_book(&admin, "Tehanu", 1).await;

    let (_, body) = app
        .post("/transactions", Some(&reader), json!({ "book_id": book_id }))
        .await;
    let uri = format!("/transactions/{}", body["data"]["transaction"]["id"]);
    assert_eq!(app.stock(book_id).await, 0);

    let (status, body) = app.put(&uri, Some(&admin), json!({ "deadline": null })).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let transaction = &body["data"]["transaction"];
    assert_eq!(transaction["status"], "returned");
    assert!(transaction["deadline"].is_null());
    assert_eq!(app.stock(book_id).await, 1);

    // The reader sees the loan as returned too
    let (status, body) = app.get(&uri, Some(&reader)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["transaction"]["status"], "returned");
}

#[tokio::test]
async fn test_admin_extends_deadline() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let reader = app.register("Ged", "ged@earthsea.test").await;
    let book_id = app.create_book(&admin, "The Tombs of Atuan", 1).await;

    let (_, body) = app
        .post("/transactions", Some(&reader), json!({ "book_id": book_id }))
        .await;
    let uri = format!("/transactions/{}", body["data"]["transaction"]["id"]);

    let (status, body) = app
        .put(&uri, Some(&admin), json!({ "deadline": "2999-01-01T00:00:00Z" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["data"]["transaction"]["deadline"]
        .as_str()
        .unwrap()
        .starts_with("2999-01-01"));

    let (status, _) = app
        .put(&uri, Some(&reader), json!({ "deadline": "2000-01-01T00:00:00Z" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.put(&uri, Some(&reader), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_user_with_loans_cannot_be_deleted() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let reader = app.register("Ged", "ged@earthsea.test").await;
    let ged_id = app.user_id(&admin, "ged@earthsea.test").await;
    let book_id = app.create_book(&admin, "A Wizard of Earthsea", 1).await;

    app.post("/transactions", Some(&reader), json!({ "book_id": book_id }))
        .await;

    let (status, _) = app.delete(&format!("/users/{}", ged_id), Some(&reader)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Books with lending history stay
    let (status, _) = app.delete(&format!("/books/{}", book_id), Some(&admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
