use crate::common::{basic_auth, test_client, test_client_with_ctx};
use rocket::http::{Header, Status};

#[test]
fn health_reports_ok() {
    let client = test_client();
    let res = client.get("/ctdl/health").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "ok");
}

#[test]
fn lobby_is_seeded_and_listed() {
    let client = test_client();
    let res = client.get("/ctdl/r").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let rooms: Vec<serde_json::Value> = res.into_json().unwrap();
    assert!(rooms.iter().any(|r| r["name"] == "Lobby"));
}

#[test]
fn room_info_requires_auth() {
    let client = test_client();
    let res = client.get("/ctdl/r/Lobby").dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn room_info_with_valid_credentials() {
    let (client, ctx) = test_client_with_ctx();
    ctx.create_user("alice", "hunter2");
    let res = client
        .get("/ctdl/r/Lobby")
        .header(Header::new("Authorization", basic_auth("alice", "hunter2")))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["name"], "Lobby");
}

#[test]
fn room_info_refreshes_wcauth_cookie() {
    let (client, ctx) = test_client_with_ctx();
    ctx.create_user("alice", "hunter2");
    let res = client
        .get("/ctdl/r/Lobby")
        .header(Header::new("Authorization", basic_auth("alice", "hunter2")))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let set_cookie = res.headers().get_one("Set-Cookie").expect("wcauth cookie set");
    assert!(set_cookie.starts_with("wcauth="));
    assert!(set_cookie.contains("Path=/ctdl/"));
    assert_eq!(res.headers().get_one("Cache-Control"), Some("no-cache, no-store, must-revalidate"));
}

#[test]
fn room_info_accepts_wcauth_cookie_in_place_of_basic_auth() {
    let (client, ctx) = test_client_with_ctx();
    ctx.create_user("alice", "hunter2");
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode("alice:hunter2");
    let res = client
        .get("/ctdl/r/Lobby")
        .cookie(rocket::http::Cookie::new("wcauth", encoded))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
}

#[test]
fn room_info_rejects_wrong_password() {
    let (client, ctx) = test_client_with_ctx();
    ctx.create_user("alice", "hunter2");
    let res = client
        .get("/ctdl/r/Lobby")
        .header(Header::new("Authorization", basic_auth("alice", "wrong")))
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn room_info_not_found() {
    let (client, ctx) = test_client_with_ctx();
    ctx.create_user("alice", "hunter2");
    let res = client
        .get("/ctdl/r/NoSuchRoom")
        .header(Header::new("Authorization", basic_auth("alice", "hunter2")))
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn options_advertises_webdav_class() {
    let client = test_client();
    let res = client.options("/ctdl/r/Lobby").dispatch();
    assert_eq!(res.status(), Status::Ok);
}
