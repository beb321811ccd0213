//! C7's HTTP face: thin REST/WebDAV routes under `/ctdl/` that bind each
//! request to a pool record and drive the same `ServerContext`/
//! `MessageStore` the line protocol uses (spec §4.7, §6 HTTP surface).
//!
//! Grounded on the teacher's `routes/mod.rs` (shared `FromRequest`
//! guards + per-domain submodules) and `original_source/webcit-ng`'s
//! "HTTP handler looks up or opens a pooled session before doing
//! anything else" shape. The `wcauth` cookie contract and no-cache
//! response headers follow `original_source/webcit-ng`'s own session
//! cookie handling (spec §6: "Basic or a `wcauth` cookie... refreshed on
//! every authenticated response").

mod dav;
mod messages;
mod rooms;

pub use dav::{acme_challenge, room_options, room_propfind_report};
pub use messages::{delete_object, fetch_object_json, fetch_room_item, move_or_copy_object, put_object};
pub use rooms::{list_rooms, room_info};

use crate::context::ServerContext;
use crate::model::User;
use crate::pool::SessionPool;
use base64::Engine;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::Json;
use rocket::{catch, Response, State};
use std::sync::Arc;

/// `Some(base64 "user:password")` once a request has authenticated,
/// cached so the response fairing can refresh the `wcauth` cookie
/// without re-deriving the credential.
#[derive(Clone)]
struct WcAuthCookie(Option<String>);

/// An authenticated caller, bound to a pool record for the lifetime of
/// the request (spec §4.7: "acquire on request entry, release on
/// response"). The lease is dropped via Rocket's request-local cache
/// teardown, mirroring `PoolLease`'s `Drop`-based release.
pub struct AuthenticatedUser {
    pub user: User,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let encoded = basic_auth_token(req).or_else(|| req.cookies().get("wcauth").map(|c| c.value().to_string()));
        let Some(encoded) = encoded else {
            return Outcome::Forward(Status::Unauthorized);
        };
        let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(&encoded) else {
            return Outcome::Forward(Status::Unauthorized);
        };
        let Ok(creds) = String::from_utf8(decoded) else {
            return Outcome::Forward(Status::Unauthorized);
        };
        let Some((name, secret)) = creds.split_once(':') else {
            return Outcome::Forward(Status::Unauthorized);
        };

        let Some(ctx) = req.rocket().state::<Arc<ServerContext>>() else {
            return Outcome::Forward(Status::InternalServerError);
        };
        let Some(user) = ctx.load_user(name) else {
            return Outcome::Forward(Status::Unauthorized);
        };
        if user.password_hash != secret || user.is_deleted() {
            return Outcome::Forward(Status::Unauthorized);
        }

        if let Some(pool) = req.rocket().state::<SessionPool>() {
            let auth = format!("{name}:{secret}");
            let lease = req.local_cache(|| pool.acquire(&auth));
            pool.canonicalize_auth(lease, auth.clone(), user.name.clone());
        }
        req.local_cache(|| WcAuthCookie(Some(encoded)));

        Outcome::Success(AuthenticatedUser { user })
    }
}

fn basic_auth_token(req: &Request<'_>) -> Option<String> {
    req.headers().get_one("Authorization")?.strip_prefix("Basic ").map(str::to_string)
}

pub fn json_error(status: Status, message: impl Into<String>) -> (Status, Json<serde_json::Value>) {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

#[rocket::get("/ctdl/health")]
pub fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "citadel-core" }))
}

#[catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": "not found" }))
}

#[catch(401)]
pub fn unauthorized() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": "authentication required" }))
}

/// Refreshes the `wcauth` cookie on every authenticated response and
/// marks every dynamic `/ctdl/` response as non-cacheable (spec §6),
/// mirroring the teacher's CORS fairing's shape (one `Fairing` impl,
/// attached once in `build_rocket`). Static assets under `/ctdl/s/` are
/// left alone so `FileServer`'s own caching headers apply.
pub struct CtdlResponseFairing;

#[rocket::async_trait]
impl Fairing for CtdlResponseFairing {
    fn info(&self) -> Info {
        Info {
            name: "ctdl cookie refresh + no-cache",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let path = req.uri().path();
        if path.starts_with("/ctdl/s/") {
            return;
        }
        res.set_header(Header::new("Cache-Control", "no-cache, no-store, must-revalidate"));
        res.set_header(Header::new("Pragma", "no-cache"));

        let cached = req.local_cache(|| WcAuthCookie(None));
        if let Some(encoded) = &cached.0 {
            let expires = (chrono::Utc::now() + chrono::Duration::days(30)).to_rfc2822();
            res.set_header(Header::new("Set-Cookie", format!("wcauth={encoded}; Path=/ctdl/; Expires={expires}")));
        }
    }
}

/// Assemble the HTTP gateway (spec §6): managed `ServerContext`/
/// `SessionPool` state, CORS (teacher's `rocket_cors` default policy),
/// the `/ctdl/` route table, and static/ACME surfaces.
pub fn build_rocket(ctx: Arc<ServerContext>, pool: SessionPool) -> rocket::Rocket<rocket::Build> {
    let cors = rocket_cors::CorsOptions::default()
        .to_cors()
        .expect("failed to build CORS fairing");

    let figment = rocket::Config::figment().merge(("port", ctx.config.http_port));
    let static_dir = ctx.config.static_dir.clone();

    rocket::custom(figment)
        .manage(ctx)
        .manage(pool)
        .attach(cors)
        .attach(CtdlResponseFairing)
        .register("/", rocket::catchers![not_found, unauthorized])
        .mount(
            "/",
            rocket::routes![
                health,
                rooms::list_rooms,
                rooms::room_info,
                dav::room_options,
                dav::room_propfind_report,
                dav::acme_challenge,
                messages::fetch_room_item,
                messages::fetch_object_json,
                messages::put_object,
                messages::delete_object,
                messages::move_or_copy_object,
            ],
        )
        .mount("/ctdl/s", rocket::fs::FileServer::from(static_dir).rank(5))
}
