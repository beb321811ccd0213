//! Object-level `/ctdl/r/<room>/<item>` routes (spec §6): EUID-or-msgnum
//! addressed GET/PUT/DELETE, the `mailbox`/`msgs.<filter>`/`slrp`
//! virtual endpoints, and MOVE/COPY via the method-override convention
//! documented in `dav.rs`.
//!
//! Grounded on `original_source/webcit-ng/server/messages.c`'s EUID
//! resolution and on the teacher's `routes/messages.rs` request-guard
//! shape (`load_accessible_room`, `can_delete`).

use super::{json_error, AuthenticatedUser};
use crate::context::ServerContext;
use crate::message::{Body, Field, Message};
use crate::model::RoomFlags;
use crate::store::MsgsKind;
use rocket::data::{Data, ToByteUnit};
use rocket::http::{ContentType, Header, Status};
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, Request, State};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Upper bound on a raw PUT/ENT0 body read over HTTP; independent of the
/// line protocol's own framing limits.
const MAX_OBJECT_BYTES: u64 = 10 * 1024 * 1024;
/// How long a client gets to finish streaming a PUT body before the
/// request is abandoned (spec §4.7's "slow loris" concern, carried to
/// the HTTP gateway).
const BODY_READ_TIMEOUT: Duration = Duration::from_secs(30);

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Serialize)]
pub struct MessageOut {
    pub msgnum: i64,
    pub euid: Option<String>,
    pub author: String,
    pub subject: String,
    pub timestamp: i64,
    pub body: String,
}

impl MessageOut {
    fn from_message(msg: Message) -> Self {
        MessageOut {
            msgnum: msg.msgnum.unwrap_or(0),
            euid: msg.euid().map(str::to_string),
            author: msg.get(Field::Author).unwrap_or("").to_string(),
            subject: msg.get(Field::Subject).unwrap_or("").to_string(),
            timestamp: msg.get(Field::Timestamp).and_then(|s| s.parse().ok()).unwrap_or(0),
            body: msg.body_text(),
        }
    }
}

fn load_accessible_room(
    ctx: &ServerContext,
    auth: &AuthenticatedUser,
    room_name: &str,
) -> Result<crate::model::Room, (Status, Json<serde_json::Value>)> {
    let Some(room) = ctx.load_room_by_name(room_name) else {
        return Err(json_error(Status::NotFound, "no such room"));
    };
    if room.flags.contains(RoomFlags::PRIVATE) && !auth.user.is_aide() {
        return Err(json_error(Status::Forbidden, "access denied"));
    }
    Ok(room)
}

fn can_delete(room: &crate::model::Room, user: &crate::model::User) -> bool {
    user.is_aide()
        || room.room_aide == Some(user.id)
        || room.is_owned_mailbox_of(user.id)
        || room.flags.contains(RoomFlags::COLLABORATIVE_DELETE)
}

/// Resolve `item` to a message number: numeric segments address by
/// msgnum directly, anything else is looked up as an EUID (spec §6's
/// "objects are addressed by EUID where one exists, else by msgnum").
fn resolve_item(ctx: &ServerContext, room_number: i64, item: &str) -> Option<i64> {
    if let Ok(n) = item.parse::<i64>() {
        return Some(n);
    }
    ctx.store.euid_lookup(room_number, item)
}

/// Grammar for the `msgs.<filter>` virtual endpoint: `all`, `old`,
/// `new:N`, `last:N`, `first:N`, `gt:N`, `lt:N`, `search:TEXT`. Not
/// specified by name anywhere upstream; decided here and recorded as an
/// open question in `DESIGN.md`.
fn parse_msgs_filter(filter: &str) -> Option<MsgsKind> {
    if filter == "all" {
        return Some(MsgsKind::All);
    }
    if filter == "old" {
        return Some(MsgsKind::Old);
    }
    if let Some(arg) = filter.strip_prefix("new:") {
        return arg.parse().ok().map(MsgsKind::New);
    }
    if let Some(arg) = filter.strip_prefix("last:") {
        return arg.parse().ok().map(MsgsKind::Last);
    }
    if let Some(arg) = filter.strip_prefix("first:") {
        return arg.parse().ok().map(MsgsKind::First);
    }
    if let Some(arg) = filter.strip_prefix("gt:") {
        return arg.parse().ok().map(MsgsKind::GreaterThan);
    }
    if let Some(arg) = filter.strip_prefix("lt:") {
        return arg.parse().ok().map(MsgsKind::LessThan);
    }
    if let Some(text) = filter.strip_prefix("search:") {
        return Some(MsgsKind::Search(text.to_string()));
    }
    None
}

/// `201 Created` with `Location`/`ETag` set (spec §8 scenario 2). A
/// plain `(Status, R)` tuple responder can't carry two extra headers at
/// once, so this is its own small `Responder` impl, the same shape
/// Rocket's own guide uses for custom-header responses.
struct ObjectCreated {
    location: String,
    etag: String,
}

impl<'r> Responder<'r, 'static> for ObjectCreated {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'static> {
        Response::build()
            .status(Status::Created)
            .header(Header::new("Location", self.location))
            .header(Header::new("ETag", self.etag))
            .ok()
    }
}

fn guess_content_type(item: &str) -> ContentType {
    if item.ends_with(".ics") {
        ContentType::new("text", "calendar")
    } else if item.ends_with(".vcf") {
        ContentType::new("text", "vcard")
    } else {
        ContentType::Plain
    }
}

/// `GET /ctdl/r/<room_name>/mailbox|msgs.<filter>|slrp|<item>` (spec
/// §6): a single-segment path dispatching to whichever virtual endpoint
/// or object the final component names. Virtual endpoints answer JSON;
/// a plain object is returned in its native representation (an `.ics`
/// object as `text/calendar`, otherwise plain text) so that CalDAV
/// clients can fetch it directly without a `/json` round trip.
#[get("/ctdl/r/<room_name>/<item>?<last>")]
pub fn fetch_room_item(
    ctx: &State<Arc<ServerContext>>,
    auth: AuthenticatedUser,
    room_name: &str,
    item: &str,
    last: Option<i64>,
) -> Result<(ContentType, String), (Status, Json<serde_json::Value>)> {
    let room = load_accessible_room(ctx, &auth, room_name)?;

    if item == "mailbox" {
        let lines = ctx.store.mailbox_summary(room.number);
        let body = serde_json::json!(lines
            .into_iter()
            .map(|l| serde_json::json!({
                "msgnum": l.msgnum,
                "time": l.time,
                "author": l.author,
                "node": l.node,
                "rfca": l.rfca,
                "subject": l.subject,
                "msgid_hash": l.msgid_hash,
                "references": l.references,
            }))
            .collect::<Vec<_>>())
        .to_string();
        return Ok((ContentType::JSON, body));
    }

    if item == "slrp" {
        let pointer = last.unwrap_or(room.highest_message);
        ctx.set_last_seen(auth.user.id, room.number, pointer);
        return Ok((ContentType::JSON, serde_json::json!({ "last_seen": pointer }).to_string()));
    }

    if let Some(filter) = item.strip_prefix("msgs.") {
        let Some(kind) = parse_msgs_filter(filter) else {
            return Err(json_error(Status::BadRequest, "unrecognized msgs filter"));
        };
        let numbers = ctx.store.list(room.number, &kind);
        return Ok((ContentType::JSON, serde_json::json!(numbers).to_string()));
    }

    let Some(msgnum) = resolve_item(ctx, room.number, item) else {
        return Err(json_error(Status::NotFound, "no such object"));
    };
    let Some(msg) = ctx.store.fetch(room.number, msgnum) else {
        return Err(json_error(Status::NotFound, "no such object"));
    };
    Ok((guess_content_type(item), msg.body_text()))
}

/// `GET /ctdl/r/<room_name>/<item>/json` (spec §6): same object
/// resolution as `fetch_room_item`, always rendered as structured JSON
/// regardless of the object's native content type.
#[get("/ctdl/r/<room_name>/<item>/json")]
pub fn fetch_object_json(
    ctx: &State<Arc<ServerContext>>,
    auth: AuthenticatedUser,
    room_name: &str,
    item: &str,
) -> Result<Json<MessageOut>, (Status, Json<serde_json::Value>)> {
    let room = load_accessible_room(ctx, &auth, room_name)?;
    let Some(msgnum) = resolve_item(ctx, room.number, item) else {
        return Err(json_error(Status::NotFound, "no such object"));
    };
    match ctx.store.fetch(room.number, msgnum) {
        Some(msg) => Ok(Json(MessageOut::from_message(msg))),
        None => Err(json_error(Status::NotFound, "no such object")),
    }
}

/// `PUT /ctdl/r/<room_name>/<item>?<subj>` (spec §6, §8 scenario 2):
/// raw-body upsert addressed by EUID. On success, answers `201 Created`
/// with `Location` and `ETag` set to the new message's number.
#[put("/ctdl/r/<room_name>/<item>?<subj>", data = "<body>")]
pub async fn put_object(
    ctx: &State<Arc<ServerContext>>,
    auth: AuthenticatedUser,
    room_name: &str,
    item: &str,
    subj: Option<String>,
    body: Data<'_>,
) -> Result<ObjectCreated, (Status, Json<serde_json::Value>)> {
    let room = load_accessible_room(ctx, &auth, room_name)?;

    let read = body.open(MAX_OBJECT_BYTES.bytes());
    let bytes = match tokio::time::timeout(BODY_READ_TIMEOUT, read.into_bytes()).await {
        Ok(Ok(capped)) => capped.into_inner(),
        Ok(Err(_)) => return Err(json_error(Status::BadRequest, "failed to read request body")),
        Err(_) => return Err(json_error(Status::RequestTimeout, "timed out reading request body")),
    };
    let text = String::from_utf8_lossy(&bytes).into_owned();

    let mut msg = Message::new(Body::Flat(text));
    msg.set(Field::Euid, item);
    msg.set(Field::Author, auth.user.name.clone());
    msg.set(Field::Timestamp, now_secs().to_string());
    msg.set(Field::Node, ctx.config.node_name.clone());
    if let Some(subject) = subj {
        msg.set(Field::Subject, subject);
    }

    match ctx.store.enter(room.number, &msg, now_secs()) {
        Ok(new_num) => Ok(ObjectCreated {
            location: format!("/ctdl/r/{room_name}/{item}"),
            etag: format!("\"{new_num}\""),
        }),
        Err(e) => Err(json_error(e.http_status(), e.to_string())),
    }
}

/// `DELETE /ctdl/r/<room_name>/<item>` (spec §6).
#[delete("/ctdl/r/<room_name>/<item>")]
pub fn delete_object(
    ctx: &State<Arc<ServerContext>>,
    auth: AuthenticatedUser,
    room_name: &str,
    item: &str,
) -> Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)> {
    let room = load_accessible_room(ctx, &auth, room_name)?;
    if !can_delete(&room, &auth.user) {
        return Err(json_error(Status::Forbidden, "permission denied"));
    }
    let Some(msgnum) = resolve_item(ctx, room.number, item) else {
        return Err(json_error(Status::NotFound, "no such object"));
    };
    match ctx.store.delete(room.number, msgnum) {
        Ok(()) => Ok(Json(serde_json::json!({ "deleted": true }))),
        Err(e) => Err(json_error(e.http_status(), e.to_string())),
    }
}

/// `MOVE`/`COPY /ctdl/r/<room_name>/<item>`, reached via `POST` +
/// `X-HTTP-Method-Override` (see `dav.rs`'s module docs) and a
/// `Destination:` header naming the target room by path.
#[post("/ctdl/r/<room_name>/<item>")]
pub fn move_or_copy_object(
    req: &Request<'_>,
    ctx: &State<Arc<ServerContext>>,
    auth: AuthenticatedUser,
    room_name: &str,
    item: &str,
) -> Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)> {
    let verb = req
        .headers()
        .get_one("X-HTTP-Method-Override")
        .map(|s| s.to_ascii_uppercase())
        .unwrap_or_default();
    if verb != "MOVE" && verb != "COPY" {
        return Err(json_error(Status::MethodNotAllowed, "unsupported method override"));
    }
    let Some(destination) = req.headers().get_one("Destination") else {
        return Err(json_error(Status::BadRequest, "missing Destination header"));
    };
    let target_name = destination.trim_start_matches("/ctdl/r/").split('/').next().unwrap_or("");

    let room = load_accessible_room(ctx, &auth, room_name)?;
    let Some(target) = ctx.load_room_by_name(target_name) else {
        return Err(json_error(Status::PreconditionFailed, "target room does not exist"));
    };
    let Some(msgnum) = resolve_item(ctx, room.number, item) else {
        return Err(json_error(Status::NotFound, "no such object"));
    };

    match ctx
        .store
        .move_or_copy(room.number, msgnum, target.number, verb == "COPY", now_secs())
    {
        Ok(new_num) => Ok(Json(serde_json::json!({ "msgnum": new_num }))),
        Err(e) => Err(json_error(e.http_status(), e.to_string())),
    }
}
