use citadel_core::config::CitadelConfig;
use citadel_core::context::ServerContext;
use citadel_core::http::build_rocket;
use citadel_core::pool::SessionPool;
use rocket::local::blocking::Client;
use std::sync::Arc;

/// Spin up a fresh in-memory-backed gateway per test, mirroring the
/// teacher's per-test temp-db `TestClient` but without a file to clean up.
pub fn test_client() -> Client {
    let ctx = Arc::new(ServerContext::new_in_memory(CitadelConfig::default()));
    let rocket = build_rocket(ctx, SessionPool::new());
    Client::tracked(rocket).expect("valid rocket instance")
}

/// Same, but returns the `ServerContext` too so a test can seed users
/// and rooms through the same path the line protocol would use.
pub fn test_client_with_ctx() -> (Client, Arc<ServerContext>) {
    let ctx = Arc::new(ServerContext::new_in_memory(CitadelConfig::default()));
    let rocket = build_rocket(ctx.clone(), SessionPool::new());
    let client = Client::tracked(rocket).expect("valid rocket instance");
    (client, ctx)
}

/// Basic-auth header value for `user:password`.
pub fn basic_auth(user: &str, password: &str) -> String {
    use base64::Engine;
    let raw = format!("{user}:{password}");
    format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(raw))
}
