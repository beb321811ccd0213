use crate::common::{basic_auth, test_client_with_ctx};
use rocket::http::{Header, Status};

fn auth_header(user: &str, pw: &str) -> Header<'static> {
    Header::new("Authorization", basic_auth(user, pw))
}

#[test]
fn put_object_returns_created_with_location_and_etag() {
    let (client, ctx) = test_client_with_ctx();
    ctx.create_user("alice", "hunter2");

    let res = client
        .put("/ctdl/r/Lobby/event-42.ics?subj=Lunch")
        .header(auth_header("alice", "hunter2"))
        .body("BEGIN:VEVENT\nSUMMARY:Lunch\nEND:VEVENT")
        .dispatch();

    assert_eq!(res.status(), Status::Created);
    assert_eq!(res.headers().get_one("Location"), Some("/ctdl/r/Lobby/event-42.ics"));
    assert!(res.headers().get_one("ETag").is_some());
}

#[test]
fn put_then_get_roundtrips_by_euid() {
    let (client, ctx) = test_client_with_ctx();
    ctx.create_user("alice", "hunter2");

    client
        .put("/ctdl/r/Lobby/note-1")
        .header(auth_header("alice", "hunter2"))
        .body("hello there")
        .dispatch();

    let res = client.get("/ctdl/r/Lobby/note-1").header(auth_header("alice", "hunter2")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    assert_eq!(res.into_string().unwrap(), "hello there");
}

#[test]
fn put_upsert_replaces_prior_object_with_same_euid() {
    let (client, ctx) = test_client_with_ctx();
    ctx.create_user("alice", "hunter2");

    client
        .put("/ctdl/r/Lobby/note-1")
        .header(auth_header("alice", "hunter2"))
        .body("version one")
        .dispatch();
    client
        .put("/ctdl/r/Lobby/note-1")
        .header(auth_header("alice", "hunter2"))
        .body("version two")
        .dispatch();

    let res = client.get("/ctdl/r/Lobby/note-1").header(auth_header("alice", "hunter2")).dispatch();
    assert_eq!(res.into_string().unwrap(), "version two");

    let listing = client
        .get("/ctdl/r/Lobby/msgs.all")
        .header(auth_header("alice", "hunter2"))
        .dispatch();
    let numbers: Vec<i64> = listing.into_json().unwrap();
    assert_eq!(numbers.len(), 1, "upsert must soft-delete the prior revision");
}

#[test]
fn fetch_object_json_returns_structured_fields() {
    let (client, ctx) = test_client_with_ctx();
    ctx.create_user("alice", "hunter2");
    client
        .put("/ctdl/r/Lobby/note-1?subj=Hi")
        .header(auth_header("alice", "hunter2"))
        .body("hello")
        .dispatch();

    let res = client.get("/ctdl/r/Lobby/note-1/json").header(auth_header("alice", "hunter2")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["subject"], "Hi");
    assert_eq!(body["euid"], "note-1");
}

#[test]
fn fetch_missing_object_is_404() {
    let (client, ctx) = test_client_with_ctx();
    ctx.create_user("alice", "hunter2");
    let res = client.get("/ctdl/r/Lobby/does-not-exist").header(auth_header("alice", "hunter2")).dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn mailbox_summary_lists_entered_objects() {
    let (client, ctx) = test_client_with_ctx();
    ctx.create_user("alice", "hunter2");
    client
        .put("/ctdl/r/Lobby/note-1?subj=First")
        .header(auth_header("alice", "hunter2"))
        .body("one")
        .dispatch();

    let res = client.get("/ctdl/r/Lobby/mailbox").header(auth_header("alice", "hunter2")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let lines: Vec<serde_json::Value> = res.into_json().unwrap();
    assert!(lines.iter().any(|l| l["subject"] == "First"));
}

#[test]
fn slrp_advances_last_seen_pointer() {
    let (client, ctx) = test_client_with_ctx();
    ctx.create_user("alice", "hunter2");
    let put_res = client.put("/ctdl/r/Lobby/note-1").header(auth_header("alice", "hunter2")).body("one").dispatch();
    let etag = put_res.headers().get_one("ETag").unwrap().trim_matches('"').to_string();
    let msgnum: i64 = etag.parse().unwrap();

    let res = client
        .get(format!("/ctdl/r/Lobby/slrp?last={msgnum}"))
        .header(auth_header("alice", "hunter2"))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["last_seen"], msgnum);
}

#[test]
fn only_aide_or_owner_can_delete() {
    let (client, ctx) = test_client_with_ctx();
    ctx.create_user("alice", "hunter2");
    ctx.create_user("mallory", "wrongdoer");

    client
        .put("/ctdl/r/Lobby/note-1")
        .header(auth_header("alice", "hunter2"))
        .body("alice's note")
        .dispatch();

    let res = client
        .delete("/ctdl/r/Lobby/note-1")
        .header(auth_header("mallory", "wrongdoer"))
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn move_via_method_override_relocates_object() {
    let (client, ctx) = test_client_with_ctx();
    ctx.create_user("alice", "hunter2");
    ctx.create_room("Announcements", citadel_core::model::RoomFlags::empty(), 0);

    client
        .put("/ctdl/r/Lobby/note-1")
        .header(auth_header("alice", "hunter2"))
        .body("movable")
        .dispatch();

    let res = client
        .post("/ctdl/r/Lobby/note-1")
        .header(auth_header("alice", "hunter2"))
        .header(Header::new("X-HTTP-Method-Override", "MOVE"))
        .header(Header::new("Destination", "/ctdl/r/Announcements"))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get("/ctdl/r/Announcements/note-1").header(auth_header("alice", "hunter2")).dispatch();
    assert_eq!(res.status(), Status::Ok);
}
