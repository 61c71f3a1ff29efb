use std::sync::Arc;

use foodgram::{
    jwt::SessionKeys,
    media::MediaStorage,
    memory::MemoryStore,
    routes::{routes, AppContext},
    schema::{User, UserRole},
};
use serde_json::{json, Value};
use tempfile::TempDir;
use warp::{http::StatusCode, Filter, Reply};

const BASE_URL: &str = "http://localhost:8000";

struct Server {
    store: Arc<MemoryStore>,
    keys: SessionKeys,
    chef: User,
    guest: User,
    media_dir: TempDir,
}

impl Server {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let chef = store
            .add_user("chef@example.com", "chef", "Julia", "Child", UserRole::User)
            .await;
        let guest = store
            .add_user("guest@example.com", "guest", "Anton", "Ego", UserRole::User)
            .await;
        store.add_tag("Breakfast", "breakfast").await;
        store.add_tag("Lunch", "lunch").await;
        store.add_ingredient("flour", "g").await;
        store.add_ingredient("milk", "ml").await;
        store.add_ingredient("egg", "pcs").await;

        Self {
            store,
            keys: SessionKeys::new("test-secret", 1).unwrap(),
            chef,
            guest,
            media_dir: tempfile::tempdir().unwrap(),
        }
    }

    fn filter(
        &self,
    ) -> impl Filter<Extract = impl Reply, Error = std::convert::Infallible> + Clone {
        routes(AppContext::new(
            self.store.clone(),
            MediaStorage::new(self.media_dir.path(), BASE_URL),
            self.keys.clone(),
        ))
    }

    fn token(&self, user: &User) -> String {
        format!("Token {}", self.keys.generate_jwt_session(user).unwrap())
    }

    async fn send(
        &self,
        method: &str,
        path: &str,
        user: Option<&User>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = warp::test::request().method(method).path(path);
        if let Some(user) = user {
            request = request.header("authorization", self.token(user));
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.reply(&self.filter()).await;
        let status = response.status();
        let body = if response.body().is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(response.body()).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn create_recipe(&self, name: &str, tags: Value, ingredients: Value) -> Value {
        let (status, body) = self
            .send(
                "POST",
                "/api/recipes/",
                Some(&self.chef),
                Some(json!({
                    "tags": tags,
                    "ingredients": ingredients,
                    "name": name,
                    "text": "Mix and bake",
                    "cooking_time": 15,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

#[tokio::test]
async fn catalogs_are_public() {
    let server = Server::new().await;

    let (status, body) = server.send("GET", "/api/tags/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = server
        .send("GET", "/api/ingredients/?name=MI", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "milk");
    assert_eq!(body[0]["measurement_unit"], "ml");

    let (status, body) = server.send("GET", "/api/tags/99/", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn create_recipe_returns_nested_representation() {
    let server = Server::new().await;

    let body = server
        .create_recipe(
            "Pancakes",
            json!([1, 2]),
            json!([{"id": 1, "amount": 2}, {"id": 3, "amount": 1}]),
        )
        .await;

    assert_eq!(body["author"]["username"], "chef");
    assert_eq!(body["author"]["is_subscribed"], false);
    assert_eq!(body["cooking_time"], 15);
    assert_eq!(body["tags"].as_array().unwrap().len(), 2);
    assert_eq!(body["tags"][0]["slug"], "breakfast");
    assert_eq!(body["ingredients"][0]["name"], "egg");
    assert_eq!(body["ingredients"][1]["amount"], 2);
    assert_eq!(body["is_favorited"], false);
    assert_eq!(body["image"], Value::Null);
}

#[tokio::test]
async fn invalid_payloads_are_bad_requests() {
    let server = Server::new().await;

    let (status, body) = server
        .send(
            "POST",
            "/api/recipes/",
            Some(&server.chef),
            Some(json!({
                "tags": [],
                "ingredients": [{"id": 1, "amount": 1}],
                "name": "Bread",
                "text": "Bake",
                "cooking_time": 30,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
    assert_eq!(body["field"], "tags");

    let (status, _) = server
        .send(
            "POST",
            "/api/recipes/",
            Some(&server.chef),
            Some(json!({"tags": "lunch"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn writes_require_authentication() {
    let server = Server::new().await;

    let (status, body) = server
        .send("POST", "/api/recipes/", None, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = server.send("GET", "/api/users/me/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = server
        .send("GET", "/api/users/me/", Some(&server.guest), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "guest@example.com");
}

#[tokio::test]
async fn strangers_cannot_delete_recipes() {
    let server = Server::new().await;
    let recipe = server
        .create_recipe("Soup", json!([2]), json!([{"id": 2, "amount": 500}]))
        .await;
    let path = format!("/api/recipes/{}/", recipe["id"]);

    let (status, body) = server
        .send("DELETE", &path, Some(&server.guest), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, _) = server.send("DELETE", &path, Some(&server.chef), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = server.send("GET", &path, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn favorite_toggle_statuses() {
    let server = Server::new().await;
    let recipe = server
        .create_recipe("Toast", json!([1]), json!([{"id": 1, "amount": 50}]))
        .await;
    let path = format!("/api/recipes/{}/favorite/", recipe["id"]);

    let (status, body) = server.send("POST", &path, Some(&server.guest), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Toast");
    assert_eq!(body["cooking_time"], 15);

    let (status, body) = server.send("POST", &path, Some(&server.guest), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");

    let (status, _) = server.send("DELETE", &path, Some(&server.guest), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = server.send("DELETE", &path, Some(&server.guest), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn catalog_filters_and_paginates() {
    let server = Server::new().await;
    for n in 0..7 {
        let tag = if n % 2 == 0 { 1 } else { 2 };
        server
            .create_recipe(&format!("Dish {n}"), json!([tag]), json!([{"id": 3, "amount": 1}]))
            .await;
    }

    let (status, body) = server.send("GET", "/api/recipes/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 7);
    assert_eq!(body["results"].as_array().unwrap().len(), 6);
    assert_eq!(body["next"], "/api/recipes/?page=2&limit=6");
    assert_eq!(body["previous"], Value::Null);

    let (_, body) = server
        .send("GET", "/api/recipes/?tags=lunch&limit=10", None, None)
        .await;
    assert_eq!(body["count"], 3);

    let (_, body) = server
        .send("GET", "/api/recipes/?tags=lunch&tags=breakfast&limit=2&page=4", None, None)
        .await;
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["next"], Value::Null);

    let (status, _) = server
        .send("GET", "/api/recipes/?page=5&limit=2", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn huge_page_numbers_are_not_found() {
    let server = Server::new().await;
    server
        .create_recipe("Bread", json!([1]), json!([{"id": 1, "amount": 500}]))
        .await;

    let (status, body) = server
        .send("GET", "/api/recipes/?page=9223372036854775807", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
    assert_eq!(body["field"], "page");

    let (status, _) = server
        .send("GET", "/api/users/?page=9223372036854775807&limit=100", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn shopping_cart_downloads_as_text() {
    let server = Server::new().await;
    let bread = server
        .create_recipe("Bread", json!([2]), json!([{"id": 1, "amount": 200}]))
        .await;
    let pie = server
        .create_recipe(
            "Pie",
            json!([2]),
            json!([{"id": 1, "amount": 300}, {"id": 2, "amount": 100}]),
        )
        .await;
    for recipe in [&bread, &pie] {
        let path = format!("/api/recipes/{}/shopping_cart/", recipe["id"]);
        let (status, _) = server.send("POST", &path, Some(&server.guest), None).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let response = warp::test::request()
        .method("GET")
        .path("/api/recipes/download_shopping_cart/")
        .header("authorization", server.token(&server.guest))
        .reply(&server.filter())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"shopping_list.txt\""
    );
    assert_eq!(
        std::str::from_utf8(response.body()).unwrap(),
        "Shopping list\n\nflour (g) - 500\nmilk (ml) - 100\n"
    );
}

#[tokio::test]
async fn short_link_redirects_to_recipe() {
    let server = Server::new().await;
    let recipe = server
        .create_recipe("Omelette", json!([1]), json!([{"id": 3, "amount": 3}]))
        .await;

    let (status, body) = server
        .send("GET", &format!("/api/recipes/{}/get-link/", recipe["id"]), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let link = body["short-link"].as_str().unwrap();
    let path = link.strip_prefix(BASE_URL).unwrap();

    let response = warp::test::request()
        .method("GET")
        .path(path)
        .reply(&server.filter())
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()["location"],
        format!("{BASE_URL}/recipes/{}/", recipe["id"]).as_str()
    );

    let (status, _) = server.send("GET", "/s/zzzzzz/", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn subscriptions_roundtrip() {
    let server = Server::new().await;
    server
        .create_recipe("Stew", json!([2]), json!([{"id": 3, "amount": 2}]))
        .await;
    server
        .create_recipe("Salad", json!([2]), json!([{"id": 2, "amount": 1}]))
        .await;
    let path = format!("/api/users/{}/subscribe/?recipes_limit=1", server.chef.id);

    let (status, body) = server.send("POST", &path, Some(&server.guest), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_subscribed"], true);
    assert_eq!(body["recipes"].as_array().unwrap().len(), 1);
    assert_eq!(body["recipes_count"], 2);

    let (status, _) = server.send("POST", &path, Some(&server.guest), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let self_path = format!("/api/users/{}/subscribe/", server.chef.id);
    let (status, _) = server.send("POST", &self_path, Some(&server.chef), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = server
        .send(
            "GET",
            "/api/users/subscriptions/?recipes_limit=oops",
            Some(&server.guest),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["recipes"].as_array().unwrap().len(), 2);

    let (status, _) = server
        .send("DELETE", &self_path, Some(&server.guest), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn unknown_routes_share_error_shape() {
    let server = Server::new().await;

    let (status, body) = server.send("GET", "/api/nothing/", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
    assert!(body["detail"].is_string());

    let (status, body) = server.send("PUT", "/api/tags/", None, None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["code"], "method_not_allowed");
}
