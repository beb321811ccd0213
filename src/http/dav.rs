//! WebDAV/CalDAV surface stubs for `/ctdl/r/<room>` (spec §6): class
//! advertisement via `OPTIONS`, and minimal multistatus bodies for
//! `PROPFIND`/`REPORT`.
//!
//! Rocket's `rocket::http::Method` is a closed enum over the nine
//! standard HTTP methods and has no `PROPFIND`/`REPORT`/`MOVE`/`COPY`
//! variants, so those verbs cannot be registered directly as route
//! methods. Real clients reach them the same way a browser reaches
//! `PUT`/`DELETE` through an HTML form per Rocket's own documented
//! method-override pattern: a `POST` carrying `X-HTTP-Method-Override:
//! PROPFIND` (or `REPORT`, `MOVE`, `COPY`). See `DESIGN.md`'s "HTTP
//! gateway topology" entry for the full rationale.

use super::{json_error, AuthenticatedUser};
use crate::context::ServerContext;
use crate::model::RoomFlags;
use crate::store::MsgsKind;
use rocket::http::{Header, Status};
use rocket::response::content::RawXml;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::{options, post, Request, State};
use std::sync::Arc;

const DAV_CLASS: &str = "1, calendar-access";
const ALLOWED_METHODS: &str = "OPTIONS, GET, PUT, DELETE, PROPFIND, REPORT, MOVE, COPY";

/// `200 OK` with `Allow`/`DAV` headers and no body, in place of a plain
/// `(Status, R)` tuple responder so both headers can be set at once.
struct DavOptions;

impl<'r> Responder<'r, 'static> for DavOptions {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'static> {
        Response::build()
            .status(Status::Ok)
            .header(Header::new("Allow", ALLOWED_METHODS))
            .header(Header::new("DAV", DAV_CLASS))
            .ok()
    }
}

/// `OPTIONS /ctdl/r/<room>`: advertise the WebDAV class and allowed verbs
/// (spec §6).
#[options("/ctdl/r/<_room>")]
pub fn room_options(_room: &str) -> DavOptions {
    DavOptions
}

fn method_override(req: &Request<'_>) -> Option<String> {
    req.headers().get_one("X-HTTP-Method-Override").map(|s| s.to_ascii_uppercase())
}

/// `PROPFIND`/`REPORT /ctdl/r/<room>`, reached via `POST` + method
/// override (see module docs). Renders a minimal-but-valid WebDAV
/// multistatus: one `<D:response>` per room status stub and, when
/// `Depth: 1` (or the request is a calendar `REPORT`), one more per
/// message currently visible in the room, `getetag` set to the
/// message's number (spec §8 scenario 6).
#[post("/ctdl/r/<room_name>")]
pub fn room_propfind_report(
    req: &Request<'_>,
    ctx: &State<Arc<ServerContext>>,
    auth: AuthenticatedUser,
    room_name: &str,
) -> Result<RawXml<String>, (Status, Json<serde_json::Value>)> {
    let Some(verb) = method_override(req) else {
        return Err(json_error(Status::MethodNotAllowed, "missing X-HTTP-Method-Override"));
    };
    if verb != "PROPFIND" && verb != "REPORT" {
        return Err(json_error(Status::MethodNotAllowed, "unsupported method override"));
    }

    let Some(room) = ctx.load_room_by_name(room_name) else {
        return Err(json_error(Status::NotFound, "no such room"));
    };
    if room.flags.contains(RoomFlags::PRIVATE) && !auth.user.is_aide() {
        return Err(json_error(Status::Forbidden, "access denied"));
    }

    let depth = req.headers().get_one("Depth").unwrap_or("0");
    let include_members = depth != "0" || verb == "REPORT";

    let mut responses = vec![collection_response(room_name, &room)];
    if include_members {
        let numbers = ctx.store.list(room.number, &MsgsKind::All);
        for msgnum in numbers {
            let Some(msg) = ctx.store.fetch(room.number, msgnum) else { continue };
            let href = msg.euid().unwrap_or(&msgnum.to_string()).to_string();
            responses.push(member_response(room_name, &href, msgnum));
        }
    }

    let body = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<D:multistatus xmlns:D=\"DAV:\">\n{}\n</D:multistatus>\n",
        responses.join("\n")
    );
    Ok(RawXml(body))
}

fn collection_response(room_name: &str, room: &crate::model::Room) -> String {
    format!(
        "  <D:response>\n    <D:href>/ctdl/r/{room_name}</D:href>\n    <D:propstat>\n      <D:prop>\n        <D:resourcetype><D:collection/></D:resourcetype>\n        <D:getetag>\"{}\"</D:getetag>\n      </D:prop>\n      <D:status>HTTP/1.1 200 OK</D:status>\n    </D:propstat>\n  </D:response>",
        room.highest_message
    )
}

fn member_response(room_name: &str, href: &str, msgnum: i64) -> String {
    format!(
        "  <D:response>\n    <D:href>/ctdl/r/{room_name}/{href}</D:href>\n    <D:propstat>\n      <D:prop>\n        <D:getetag>\"{msgnum}\"</D:getetag>\n      </D:prop>\n      <D:status>HTTP/1.1 200 OK</D:status>\n    </D:propstat>\n  </D:response>"
    )
}

/// `GET /.well-known/<path..>`: ACME/well-known responder stub. Full
/// certificate issuance is out of scope (spec's Non-goals exclude TLS
/// certificate management); this just keeps the route present and
/// answers honestly instead of a bare 404 from an unmounted path.
#[rocket::get("/.well-known/<path..>")]
pub fn acme_challenge(path: std::path::PathBuf) -> (Status, Json<serde_json::Value>) {
    json_error(Status::NotFound, format!("no well-known resource provisioned at {}", path.display()))
}
