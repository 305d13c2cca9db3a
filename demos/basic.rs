//! Minimal jsonrest example: CRUD-style JSON endpoints behind one group.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl http://localhost:3000/users/7
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:3000/users/42
//!   curl -u admin:admin http://localhost:3000/admin/stats

use jsonrest::{
    Endpoint, Error, HttpError, Json, Reply, Request, RouteOption, Router, Server, StatusCode,
    middleware,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct User {
    id: u64,
    name: String,
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let app = Router::with_options([RouteOption::compression(6)]);
    app.use_middleware(middleware::trace());

    app.get("/users/{id}", get_user)
        .post("/users", create_user)
        .delete("/users/{id}", delete_user);

    let admin = app.group_with([RouteOption::DisableIndent]);
    admin.use_middleware(middleware::from_fn(require_admin));
    admin.get("/admin/stats", stats);

    if let Err(e) = Server::bind("0.0.0.0:3000").serve(app).await {
        tracing::error!("server error: {e}");
    }
}

// GET /users/{id}
async fn get_user(req: Request) -> Result<Json<User>, Error> {
    let id: u64 = req
        .param("id")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| HttpError::bad_request("id must be a number"))?;

    if id != 42 {
        return Err(HttpError::new(StatusCode::NOT_FOUND, "user_not_found", "user not found").into());
    }
    Ok(Json(User { id, name: "alice".into() }))
}

// POST /users → 201 Created
async fn create_user(req: Request) -> Result<Reply, Error> {
    let input: NewUser = req.bind_body()?;
    if input.name.is_empty() {
        return Err(HttpError::unprocessable_entity("name is required").into());
    }
    Ok(Reply::with_status(StatusCode::CREATED, User { id: 99, name: input.name }))
}

// DELETE /users/{id} → 204 No Content
async fn delete_user(_req: Request) -> Result<Reply, Error> {
    Ok(Reply::status(StatusCode::NO_CONTENT))
}

async fn require_admin(req: Request, next: Endpoint) -> Result<Reply, Error> {
    match req.basic_auth() {
        Some((user, password)) if user == "admin" && password == "admin" => next.call(req).await,
        _ => Err(HttpError::unauthorized("admin only").into()),
    }
}

async fn stats(_req: Request) -> Result<Json<serde_json::Value>, Error> {
    Ok(Json(serde_json::json!({"users": 1, "uptime_secs": 0})))
}
