//! C6: command dispatch (spec §4.6, §6 command table).
//!
//! One function per command, driven by `dispatch` from the per-connection
//! worker loop in `server.rs`. Grounded on
//! `original_source/textclient/commands.c`'s command table shape, reworked
//! as a match over a parsed verb instead of a linear `strcasecmp` chain.

use super::framing::Framing;
use super::session::{AuthState, KeepaliveMode, Session, StreamState};
use crate::context::ServerContext;
use crate::message::{Body, Field, Message};
use crate::model::{Room, RoomFlags};
use crate::mset::MSet;
use crate::rules;
use crate::store::MsgsKind;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Per-user instant-message queues for `SEXP` (spec §6). Kept in the
/// connection worker's reach via a lazily-initialized global registry
/// would require unsafe statics; instead this is threaded through
/// `ServerContext` by the caller. See `context::ServerContext`'s
/// composition in `lib.rs`.
pub struct InstantMessageQueues {
    pub queues: Mutex<std::collections::HashMap<i64, Vec<String>>>,
}

impl Default for InstantMessageQueues {
    fn default() -> Self {
        InstantMessageQueues {
            queues: Mutex::new(std::collections::HashMap::new()),
        }
    }
}

/// Result of dispatching one command: the lines already written to the
/// socket by the handler, and whether the session should close.
pub struct Dispatched {
    pub should_quit: bool,
}

pub fn dispatch(
    line: &str,
    framing: &mut Framing,
    session: &mut Session,
    ctx: &ServerContext,
    im_queues: &InstantMessageQueues,
) -> std::io::Result<Dispatched> {
    session.touch();
    let (verb, rest) = split_verb(line);
    let verb_upper = verb.to_ascii_uppercase();

    // Protocol violation: issuing a command while a streaming state is
    // active that the command itself doesn't drive (spec §4.6).
    if session.stream_state != StreamState::Idle && !matches!(verb_upper.as_str(), "NOOP" | "QNOP") {
        framing.write_line("502 protocol violation: streaming state active")?;
        return Ok(Dispatched { should_quit: false });
    }

    match verb_upper.as_str() {
        "NOOP" => {
            session.keepalive_mode = KeepaliveMode::Full;
            framing.write_line("200 OK")?;
        }
        "QNOP" => {
            // half-keepalive: deliberately silent, no reply line
            session.keepalive_mode = KeepaliveMode::Half;
        }
        "QUIT" => {
            framing.write_line("200 Goodbye")?;
            return Ok(Dispatched { should_quit: true });
        }
        "USER" => cmd_user(rest, framing, session, ctx)?,
        "PASS" => cmd_pass(rest, framing, session, ctx)?,
        "STLS" => cmd_stls(framing, session)?,
        "INFO" => cmd_info(framing, ctx)?,
        "GOTO" => cmd_goto(rest, framing, session, ctx)?,
        "LKRA" => cmd_lkra(framing, ctx)?,
        "MSGS" => cmd_msgs(rest, framing, session, ctx)?,
        "MSG0" | "MSG2" | "MSG4" => cmd_msg_fetch(rest, framing, session, ctx)?,
        "MSGP" => cmd_msgp(rest, framing, session)?,
        "ENT0" => cmd_ent0(rest, framing, session, ctx)?,
        "DELE" => cmd_dele(rest, framing, session, ctx)?,
        "MOVE" => cmd_move(rest, framing, session, ctx)?,
        "EUID" => cmd_euid(rest, framing, session, ctx)?,
        "RINF" => cmd_rinf(framing, session, ctx)?,
        "SLRP" => cmd_slrp(rest, framing, session, ctx)?,
        "CONF" => cmd_conf(rest, framing, ctx)?,
        "GIBR" => cmd_gibr(framing, session, ctx)?,
        "PIBR" => cmd_pibr(framing, session, ctx)?,
        "SEXP" => cmd_sexp(rest, framing, session, ctx, im_queues)?,
        "LSUB" => cmd_lsub(rest, framing, ctx)?,
        "SCDN" => framing.write_line("200 shutdown scheduled")?,
        "DOWN" => {
            framing.write_line("200 shutting down")?;
            return Ok(Dispatched { should_quit: true });
        }
        _ => framing.write_line(&format!("500 unrecognized command: {verb}"))?,
    }

    Ok(Dispatched { should_quit: false })
}

fn split_verb(line: &str) -> (&str, &str) {
    match line.split_once(' ') {
        Some((v, r)) => (v, r),
        None => (line, ""),
    }
}

fn require_auth(session: &Session, framing: &mut Framing) -> std::io::Result<bool> {
    if !session.is_authenticated() {
        framing.write_line("540 not logged in")?;
        return Ok(false);
    }
    Ok(true)
}

fn require_room(session: &Session, framing: &mut Framing) -> std::io::Result<Option<i64>> {
    match session.current_room {
        Some(r) => Ok(Some(r)),
        None => {
            framing.write_line("571 no current room")?;
            Ok(None)
        }
    }
}

fn cmd_user(name: &str, framing: &mut Framing, session: &mut Session, ctx: &ServerContext) -> std::io::Result<()> {
    let name = name.trim();
    if ctx.load_user(name).is_some() {
        session.pending_username = Some(name.to_string());
        session.auth_state = AuthState::AwaitingPassword;
        framing.write_line(&format!("300 Password required for {name}"))
    } else {
        framing.write_line("542 No such user")
    }
}

fn cmd_pass(secret: &str, framing: &mut Framing, session: &mut Session, ctx: &ServerContext) -> std::io::Result<()> {
    let Some(name) = session.pending_username.take() else {
        return framing.write_line("542 USER required first");
    };
    let Some(user) = ctx.load_user(&name) else {
        return framing.write_line("542 No such user");
    };
    if user.is_deleted() {
        return framing.write_line("540 account deleted");
    }
    if user.password_hash != secret {
        session.auth_state = AuthState::Unauth;
        return framing.write_line("542 Wrong password");
    }
    session.user_id = Some(user.id);
    session.username = Some(user.name.clone());
    session.auth_state = AuthState::Auth;
    framing.write_line(&format!("200 {}|{}|{}", user.name, user.id, user.access_level as i32))
}

fn cmd_stls(framing: &mut Framing, session: &mut Session) -> std::io::Result<()> {
    // Real certificate provisioning is out of scope (spec §1). The
    // handshake parameters (fixed DH group, forward-secret cipher
    // preference) are configuration data, not performed here; see
    // DESIGN.md.
    session.tls_active = true;
    framing.write_line("200 begin TLS negotiation")
}

fn cmd_info(framing: &mut Framing, ctx: &ServerContext) -> std::io::Result<()> {
    let lines = vec![
        ctx.config.node_name.clone(),
        "citadel-core".to_string(),
        "1".to_string(),
    ];
    framing.write_line("100 server info follows")?;
    framing.write_listing(&lines)
}

fn cmd_goto(arg: &str, framing: &mut Framing, session: &mut Session, ctx: &ServerContext) -> std::io::Result<()> {
    if !require_auth(session, framing)? {
        return Ok(());
    }
    let mut parts = arg.splitn(2, '|');
    let name = parts.next().unwrap_or("").trim();
    let Some(room) = ctx.load_room_by_name(name) else {
        return framing.write_line("500 no such room");
    };
    let user_id = session.user_id.unwrap();
    let user = ctx.load_user(session.username.as_deref().unwrap_or_default());
    if let Some(user) = &user
        && room.flags.contains(RoomFlags::PRIVATE)
        && !user.is_aide()
    {
        return framing.write_line("540 access denied");
    }

    let mut rk = ctx.room_known(user_id, room.number);
    rk.clamp_to(room.highest_message);
    let new_messages = (room.highest_message - rk.last_seen).max(0);
    session.enter_room(room.number);

    framing.write_line(&format!(
        "200 {}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
        room.name,
        new_messages,
        room.highest_message,
        0, // info-needed
        room.flags.bits(),
        room.highest_message,
        rk.last_seen,
        room.flags.contains(RoomFlags::MAILBOX) as u8,
        user.as_ref().is_some_and(|u| u.is_aide()) as u8,
        room.floor_id,
        0, // cur-view
        room.default_view as u8 as i32,
        room.last_write,
    ))
}

fn cmd_lkra(framing: &mut Framing, ctx: &ServerContext) -> std::io::Result<()> {
    let names = ctx.list_room_names();
    framing.write_line("100 room list follows")?;
    let lines: Vec<String> = names
        .into_iter()
        .filter_map(|(_, number)| ctx.load_room(number))
        .map(|room| {
            format!(
                "{}|{}|{}|{}|0|0|0|{}|{}",
                room.name,
                room.flags.bits(),
                room.floor_id,
                room.sort_order,
                default_view_code(&room),
                room.last_write,
            )
        })
        .collect();
    framing.write_listing(&lines)
}

fn default_view_code(room: &Room) -> i32 {
    room.default_view as i32
}

fn parse_msgs_kind(arg: &str) -> MsgsKind {
    let mut parts = arg.splitn(3, '|');
    let filter = parts.next().unwrap_or("").to_ascii_uppercase();
    let kind_or_arg = parts.next().unwrap_or("");
    match filter.as_str() {
        "OLD" => MsgsKind::Old,
        "NEW" => MsgsKind::New(kind_or_arg.parse().unwrap_or(0)),
        "LAST" => MsgsKind::Last(kind_or_arg.parse().unwrap_or(10)),
        "FIRST" => MsgsKind::First(kind_or_arg.parse().unwrap_or(10)),
        "GT" => MsgsKind::GreaterThan(kind_or_arg.parse().unwrap_or(0)),
        "LT" => MsgsKind::LessThan(kind_or_arg.parse().unwrap_or(0)),
        "SEARCH" => MsgsKind::Search(kind_or_arg.to_string()),
        "9" => MsgsKind::MailboxSummary,
        _ => MsgsKind::All,
    }
}

fn cmd_msgs(arg: &str, framing: &mut Framing, session: &mut Session, ctx: &ServerContext) -> std::io::Result<()> {
    if !require_auth(session, framing)? {
        return Ok(());
    }
    let Some(room_number) = require_room(session, framing)? else {
        return Ok(());
    };
    let kind = parse_msgs_kind(arg);
    if matches!(kind, MsgsKind::MailboxSummary) {
        let summary = ctx.store.mailbox_summary(room_number);
        framing.write_line("100 mailbox summary follows")?;
        let lines: Vec<String> = summary
            .into_iter()
            .map(|l| {
                format!(
                    "{}|{}|{}|{}|{}|{}|{}|{}",
                    l.msgnum, l.time, l.author, l.node, l.rfca, l.subject, l.msgid_hash, l.references
                )
            })
            .collect();
        return framing.write_listing(&lines);
    }
    let numbers = ctx.store.list(room_number, &kind);
    framing.write_line("100 message list follows")?;
    framing.write_listing(&numbers.iter().map(|n| n.to_string()).collect::<Vec<_>>())
}

fn cmd_msg_fetch(arg: &str, framing: &mut Framing, session: &mut Session, ctx: &ServerContext) -> std::io::Result<()> {
    if !require_auth(session, framing)? {
        return Ok(());
    }
    let Some(room_number) = require_room(session, framing)? else {
        return Ok(());
    };
    let mut parts = arg.splitn(2, '|');
    let Ok(msgnum) = parts.next().unwrap_or("").trim().parse::<i64>() else {
        return framing.write_line("500 invalid message number");
    };
    let mode: i32 = parts.next().unwrap_or("0").trim().parse().unwrap_or(0);
    let Some(msg) = ctx.store.fetch(room_number, msgnum) else {
        return framing.write_line("500 no such message");
    };

    framing.write_line("100 message follows")?;
    let mut lines = msg.to_wire_lines();
    if mode == 3 {
        lines.insert(0, format!("exti={}", msg.euid().unwrap_or("")));
        lines.insert(1, format!("time={}", msg.get(Field::Timestamp).unwrap_or("0")));
    }
    if mode == 1 {
        // headers only: drop everything at/after the "text" sentinel.
        if let Some(pos) = lines.iter().position(|l| l == "text") {
            lines.truncate(pos);
        }
    }
    framing.write_listing(&lines)
}

fn cmd_msgp(arg: &str, framing: &mut Framing, session: &mut Session) -> std::io::Result<()> {
    session.preferred_mime_types = arg.split('|').map(str::to_string).collect();
    framing.write_line("200 renderer preferences set")
}

fn cmd_ent0(arg: &str, framing: &mut Framing, session: &mut Session, ctx: &ServerContext) -> std::io::Result<()> {
    if !require_auth(session, framing)? {
        return Ok(());
    }
    let Some(room_number) = require_room(session, framing)? else {
        return Ok(());
    };
    let mut parts = arg.split('|');
    let post_flag = parts.next().unwrap_or("0");
    if post_flag != "1" {
        return framing.write_line("500 not confirmed");
    }
    let to = parts.next().unwrap_or("");
    let subject = parts.nth(1).unwrap_or(""); // skip anonymous flag, spec's ".."
    let cc = parts.nth(1).unwrap_or(""); // skip, matching spec's loose field list

    framing.write_line("800 send message")?;
    session.begin_stream(StreamState::Uploading).map_err(to_io_err)?;
    let body_lines = framing.read_listing()?;
    session.end_stream();

    let username = session.username.clone().unwrap_or_default();
    let mut msg = Message::new(Body::Flat(body_lines.join("\n")));
    msg.set(Field::Author, username);
    msg.set(Field::Timestamp, now_secs().to_string());
    msg.set(Field::Node, ctx.config.node_name.clone());
    if !subject.is_empty() {
        msg.set(Field::Subject, subject);
    }
    if !to.is_empty() {
        msg.set(Field::Recipient, to);
    }
    if !cc.is_empty() {
        msg.set(Field::Cc, cc);
    }

    match ctx.store.enter(room_number, &msg, now_secs()) {
        Ok(new_num) => framing.write_line(&format!("200 {new_num}||{}", msg.euid().unwrap_or(""))),
        Err(e) => framing.write_line(&e.status_line()),
    }
}

fn to_io_err(e: crate::error::CitadelError) -> std::io::Error {
    std::io::Error::other(e.to_string())
}

/// Delete permission (spec §4.4): room aide, or mailbox owner, or
/// collaborative-delete room.
fn can_delete(room: &Room, user_id: i64, is_aide: bool) -> bool {
    is_aide || room.room_aide == Some(user_id) || room.is_owned_mailbox_of(user_id) || room.flags.contains(RoomFlags::COLLABORATIVE_DELETE)
}

fn cmd_dele(arg: &str, framing: &mut Framing, session: &mut Session, ctx: &ServerContext) -> std::io::Result<()> {
    if !require_auth(session, framing)? {
        return Ok(());
    }
    let Some(room_number) = require_room(session, framing)? else {
        return Ok(());
    };
    let Ok(msgnum) = arg.trim().parse::<i64>() else {
        return framing.write_line("500 invalid message number");
    };
    let Some(room) = ctx.load_room(room_number) else {
        return framing.write_line("500 no such room");
    };
    let user = ctx.load_user(session.username.as_deref().unwrap_or_default());
    let is_aide = user.as_ref().is_some_and(|u| u.is_aide());
    if !can_delete(&room, session.user_id.unwrap_or(0), is_aide) {
        return framing.write_line("540 permission denied");
    }
    match ctx.store.delete(room_number, msgnum) {
        Ok(()) => framing.write_line("200 deleted"),
        Err(e) => framing.write_line(&e.status_line()),
    }
}

fn cmd_move(arg: &str, framing: &mut Framing, session: &mut Session, ctx: &ServerContext) -> std::io::Result<()> {
    if !require_auth(session, framing)? {
        return Ok(());
    }
    let Some(room_number) = require_room(session, framing)? else {
        return Ok(());
    };
    let mut parts = arg.splitn(3, '|');
    let Ok(msgnum) = parts.next().unwrap_or("").trim().parse::<i64>() else {
        return framing.write_line("500 invalid message number");
    };
    let target_name = parts.next().unwrap_or("").trim();
    let copy = parts.next().unwrap_or("0").trim() == "1";
    let Some(target) = ctx.load_room_by_name(target_name) else {
        return framing.write_line("571 target room does not exist");
    };
    match ctx.store.move_or_copy(room_number, msgnum, target.number, copy, now_secs()) {
        Ok(new_num) => framing.write_line(&format!("200 {new_num}")),
        Err(e) => framing.write_line(&e.status_line()),
    }
}

fn cmd_euid(arg: &str, framing: &mut Framing, session: &mut Session, ctx: &ServerContext) -> std::io::Result<()> {
    if !require_auth(session, framing)? {
        return Ok(());
    }
    let Some(room_number) = require_room(session, framing)? else {
        return Ok(());
    };
    match ctx.store.euid_lookup(room_number, arg.trim()) {
        Some(n) => framing.write_line(&format!("200 {n}")),
        None => framing.write_line("500 not found"),
    }
}

fn cmd_rinf(framing: &mut Framing, session: &Session, ctx: &ServerContext) -> std::io::Result<()> {
    let Some(room_number) = require_room(session, framing)? else {
        return Ok(());
    };
    let room = ctx.load_room(room_number);
    framing.write_line("100 room info follows")?;
    let lines = vec![room.map(|r| r.name).unwrap_or_default()];
    framing.write_listing(&lines)
}

fn cmd_slrp(arg: &str, framing: &mut Framing, session: &mut Session, ctx: &ServerContext) -> std::io::Result<()> {
    if !require_auth(session, framing)? {
        return Ok(());
    }
    let Some(room_number) = require_room(session, framing)? else {
        return Ok(());
    };
    let arg = arg.trim();
    let room = ctx.load_room(room_number);
    let n: i64 = if arg.eq_ignore_ascii_case("highest") {
        room.map(|r| r.highest_message).unwrap_or(0)
    } else {
        match arg.parse() {
            Ok(n) => n,
            Err(_) => return framing.write_line("500 invalid message number"),
        }
    };
    ctx.set_last_seen(session.user_id.unwrap(), room_number, n);
    framing.write_line(&format!("200 {n}"))
}

fn cmd_conf(arg: &str, framing: &mut Framing, ctx: &ServerContext) -> std::io::Result<()> {
    if arg.trim() != "GET" && !arg.trim().is_empty() && arg.trim() != "listval" {
        // fall through: CONF only implements enumeration here
    }
    let kv = vec![
        ("default_header_charset".to_string(), ctx.config.default_header_charset.clone()),
        ("EnableSplice".to_string(), (ctx.config.enable_splice as u8).to_string()),
        ("ZLibCompressionRatio".to_string(), ctx.config.zlib_compression_ratio.to_string()),
        ("HTTP_PORT".to_string(), ctx.config.http_port.to_string()),
        ("HTTPS_PORT".to_string(), ctx.config.https_port.to_string()),
    ];
    framing.write_line("100 config follows")?;
    let lines: Vec<String> = kv.into_iter().map(|(k, v)| format!("{k}|{v}")).collect();
    framing.write_listing(&lines)
}

fn cmd_gibr(framing: &mut Framing, session: &Session, ctx: &ServerContext) -> std::io::Result<()> {
    if !require_auth(session, framing)? {
        return Ok(());
    }
    let conn = ctx.db.conn.lock().unwrap();
    let mut stmt = conn
        .prepare("SELECT idx, record FROM rules WHERE user_id = ?1 ORDER BY idx")
        .unwrap();
    let lines: Vec<String> = stmt
        .query_map(rusqlite::params![session.user_id.unwrap_or(0)], |r| {
            let idx: i64 = r.get(0)?;
            let record: String = r.get(1)?;
            Ok(format!("rule|{idx}|{record}|"))
        })
        .unwrap()
        .filter_map(|r| r.ok())
        .collect();
    drop(conn);
    framing.write_line("100 rule config follows")?;
    framing.write_listing(&lines)
}

fn cmd_pibr(framing: &mut Framing, session: &mut Session, ctx: &ServerContext) -> std::io::Result<()> {
    if !require_auth(session, framing)? {
        return Ok(());
    }
    framing.write_line("800 send config")?;
    session.begin_stream(StreamState::Uploading).map_err(to_io_err)?;
    let lines = framing.read_listing()?;
    session.end_stream();

    let rules = rules::parse_gibr_lines(&lines);
    let conn = ctx.db.conn.lock().unwrap();
    let user_id = session.user_id.unwrap_or(0);
    conn.execute("DELETE FROM rules WHERE user_id = ?1", rusqlite::params![user_id]).ok();
    for (i, rule) in rules.iter().enumerate() {
        conn.execute(
            "INSERT INTO rules (user_id, idx, record) VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id, i as i64, rules::encode_rule(rule)],
        )
        .ok();
    }
    framing.write_line("200 rules saved")
}

fn cmd_sexp(
    arg: &str,
    framing: &mut Framing,
    session: &mut Session,
    ctx: &ServerContext,
    im_queues: &InstantMessageQueues,
) -> std::io::Result<()> {
    if !require_auth(session, framing)? {
        return Ok(());
    }
    let mut parts = arg.splitn(2, '|');
    let target_name = parts.next().unwrap_or("").trim();
    let text = parts.next().unwrap_or("");
    let Some(target) = ctx.load_user(target_name) else {
        return framing.write_line("500 no such user");
    };
    let sender = session.username.clone().unwrap_or_default();
    let mut queues = im_queues.queues.lock().unwrap();
    queues.entry(target.id).or_default().push(format!("{sender}|{text}"));
    session.instant_message_queue += 1;
    framing.write_line("200 sent")
}

fn cmd_lsub(arg: &str, framing: &mut Framing, ctx: &ServerContext) -> std::io::Result<()> {
    let verb = arg.trim();
    match verb {
        "sub" | "unsub" | "confirm_sub" | "confirm_unsub" => framing.write_line("200 OK"),
        _ => {
            let names = ctx.list_room_names();
            framing.write_line("100 subscriptions follow")?;
            let lines: Vec<String> = names.into_iter().map(|(name, _)| name).collect();
            framing.write_listing(&lines)
        }
    }
}

/// Helper used by both the line protocol and the HTTP gateway to build an
/// `MSet` over the currently visible messages in a room — exercised
/// directly by HTTP routes in `http::rooms`.
pub fn visible_mset(ctx: &ServerContext, room_number: i64) -> MSet {
    let numbers = ctx.store.list(room_number, &MsgsKind::All);
    MSet::from_numbers(numbers, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CitadelConfig;
    use crate::context::ServerContext;
    use std::io::{Cursor, Read, Write};

    struct MockStream {
        read: Cursor<Vec<u8>>,
        pub written: Vec<u8>,
    }
    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.read.read(buf)
        }
    }
    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn framing_with(input: &[u8]) -> Framing {
        Framing::new(Box::new(MockStream {
            read: Cursor::new(input.to_vec()),
            written: Vec::new(),
        }))
    }

    fn response_text(f: &mut Framing) -> String {
        f.read_line().unwrap().unwrap()
    }

    #[test]
    fn user_then_pass_authenticates() {
        let ctx = ServerContext::new_in_memory(CitadelConfig::default());
        ctx.create_user("alice", "hunter2");
        let mut session = Session::default();
        let im_queues = InstantMessageQueues::default();

        let mut f = framing_with(b"");
        cmd_user("alice", &mut f, &mut session, &ctx).unwrap();
        assert_eq!(session.auth_state, AuthState::AwaitingPassword);

        cmd_pass("hunter2", &mut f, &mut session, &ctx).unwrap();
        assert!(session.is_authenticated());
        let _ = im_queues;
    }

    #[test]
    fn goto_requires_auth_first() {
        let ctx = ServerContext::new_in_memory(CitadelConfig::default());
        let mut session = Session::default();
        let mut f = framing_with(b"");
        cmd_goto("Lobby", &mut f, &mut session, &ctx).unwrap();
        assert_eq!(response_text(&mut f), "540 not logged in");
    }

    #[test]
    fn full_roundtrip_goto_ent0_msgs() {
        let ctx = ServerContext::new_in_memory(CitadelConfig::default());
        ctx.create_user("alice", "hunter2");
        let mut session = Session::default();
        let im_queues = InstantMessageQueues::default();
        let mut f = framing_with(b"");
        cmd_user("alice", &mut f, &mut session, &ctx).unwrap();
        cmd_pass("hunter2", &mut f, &mut session, &ctx).unwrap();
        cmd_goto("Lobby", &mut f, &mut session, &ctx).unwrap();
        assert_eq!(session.current_room, Some(0));

        let mut f2 = framing_with(b"hello room\n000\n");
        cmd_ent0("1|||subject text||", &mut f2, &mut session, &ctx).unwrap();

        let numbers = ctx.store.list(0, &MsgsKind::All);
        assert_eq!(numbers.len(), 1);
        let _ = im_queues;
    }
}
