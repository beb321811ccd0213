//! C4: message store (spec §4.4) — per-room message-number sequences,
//! EUID index, MSGS/MSG0/ENT0/DELE/MOVE/EUID.
//!
//! Grounded on `original_source/webcit-ng/server/messages.c` and
//! `room_functions.c` for operation shape; persistence follows the
//! teacher's single-mutex-`Connection` `Db`. Per-room append ordering
//! (spec §5: "each room's append path is serialized by a per-room lock")
//! is layered on top as a map of small `Mutex<()>` guards, acquired
//! before touching the shared connection and never held across socket
//! I/O.

use crate::db::Db;
use crate::message::{Body, Field, Message};
use crate::mset::MSet;
use rusqlite::{OptionalExtension, params};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub struct MessageStore {
    db: Arc<Db>,
    room_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

/// `MSGS` listing selector (spec §4.4).
#[derive(Debug, Clone)]
pub enum MsgsKind {
    All,
    Old,
    New(i64), // argument: the caller's last-seen pointer
    Last(i64),
    First(i64),
    GreaterThan(i64),
    LessThan(i64),
    Search(String),
    MailboxSummary,
}

#[derive(Debug, Clone)]
pub struct MailboxSummaryLine {
    pub msgnum: i64,
    pub time: i64,
    pub author: String,
    pub node: String,
    pub rfca: String,
    pub subject: String,
    pub msgid_hash: String,
    pub references: String,
}

impl MessageStore {
    pub fn new(db: Arc<Db>) -> Self {
        MessageStore {
            db,
            room_locks: Mutex::new(HashMap::new()),
        }
    }

    fn room_lock(&self, room_number: i64) -> Arc<Mutex<()>> {
        let mut locks = self.room_locks.lock().unwrap();
        locks
            .entry(room_number)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// `MSGS filter|arg|kind`: ascending message numbers, or for
    /// `Search`, a case-insensitive substring match over subject/body.
    pub fn list(&self, room_number: i64, kind: &MsgsKind) -> Vec<i64> {
        let conn = self.db.conn.lock().unwrap();
        match kind {
            MsgsKind::All => query_numbers(
                &conn,
                "SELECT msgnum FROM messages WHERE room_number=?1 AND deleted=0 ORDER BY msgnum ASC",
                params![room_number],
            ),
            MsgsKind::Old => Vec::new(),
            MsgsKind::New(last_seen) => query_numbers(
                &conn,
                "SELECT msgnum FROM messages WHERE room_number=?1 AND deleted=0 AND msgnum>?2 ORDER BY msgnum ASC",
                params![room_number, last_seen],
            ),
            MsgsKind::Last(n) => {
                let mut v = query_numbers(
                    &conn,
                    "SELECT msgnum FROM messages WHERE room_number=?1 AND deleted=0 ORDER BY msgnum DESC LIMIT ?2",
                    params![room_number, n],
                );
                v.reverse();
                v
            }
            MsgsKind::First(n) => query_numbers(
                &conn,
                "SELECT msgnum FROM messages WHERE room_number=?1 AND deleted=0 ORDER BY msgnum ASC LIMIT ?2",
                params![room_number, n],
            ),
            MsgsKind::GreaterThan(n) => query_numbers(
                &conn,
                "SELECT msgnum FROM messages WHERE room_number=?1 AND deleted=0 AND msgnum>?2 ORDER BY msgnum ASC",
                params![room_number, n],
            ),
            MsgsKind::LessThan(n) => query_numbers(
                &conn,
                "SELECT msgnum FROM messages WHERE room_number=?1 AND deleted=0 AND msgnum<?2 ORDER BY msgnum ASC",
                params![room_number, n],
            ),
            MsgsKind::Search(needle) => {
                let needle = needle.to_lowercase();
                let mut stmt = conn
                    .prepare(
                        "SELECT msgnum, fields, body FROM messages WHERE room_number=?1 AND deleted=0 ORDER BY msgnum ASC",
                    )
                    .unwrap();
                stmt.query_map(params![room_number], |row| {
                    let msgnum: i64 = row.get(0)?;
                    let fields: String = row.get(1)?;
                    let body: String = row.get(2)?;
                    Ok((msgnum, fields, body))
                })
                .unwrap()
                .filter_map(|r| r.ok())
                .filter(|(_, fields, body)| {
                    fields.to_lowercase().contains(&needle) || body.to_lowercase().contains(&needle)
                })
                .map(|(n, _, _)| n)
                .collect()
            }
            MsgsKind::MailboxSummary => query_numbers(
                &conn,
                "SELECT msgnum FROM messages WHERE room_number=?1 AND deleted=0 ORDER BY msgnum ASC",
                params![room_number],
            ),
        }
    }

    /// Render the `9`/mailbox-summary line format (spec §4.4).
    pub fn mailbox_summary(&self, room_number: i64) -> Vec<MailboxSummaryLine> {
        let numbers = self.list(room_number, &MsgsKind::MailboxSummary);
        numbers
            .into_iter()
            .filter_map(|n| self.fetch(room_number, n))
            .map(|msg| MailboxSummaryLine {
                msgnum: msg.msgnum.unwrap_or(0),
                time: msg.get(Field::Timestamp).and_then(|s| s.parse().ok()).unwrap_or(0),
                author: msg.get(Field::Author).unwrap_or("").to_string(),
                node: msg.get(Field::Node).unwrap_or("").to_string(),
                rfca: msg.get(Field::FromAddr).unwrap_or("").to_string(),
                subject: msg.get(Field::Subject).unwrap_or("").to_string(),
                msgid_hash: msg.get(Field::MsgId).unwrap_or("").to_string(),
                references: msg.get(Field::References).unwrap_or("").to_string(),
            })
            .collect()
    }

    /// `MSG0`/`MSG2`/`MSG4`: fetch one message by number.
    pub fn fetch(&self, room_number: i64, msgnum: i64) -> Option<Message> {
        let conn = self.db.conn.lock().unwrap();
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT fields, body, body_kind FROM messages WHERE room_number=?1 AND msgnum=?2 AND deleted=0",
                params![room_number, msgnum],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()
            .ok()
            .flatten();
        let (fields_json, body, _body_kind) = row?;
        let raw_fields: BTreeMap<String, String> = serde_json::from_str(&fields_json).unwrap_or_default();
        let mut fields = BTreeMap::new();
        let mut extra_fields = BTreeMap::new();
        for (k, v) in raw_fields {
            match Field::from_mnemonic(&k) {
                Some(f) => {
                    fields.insert(f, v);
                }
                None => {
                    extra_fields.insert(k, v);
                }
            }
        }
        Some(Message {
            msgnum: Some(msgnum),
            fields,
            extra_fields,
            body: Body::Flat(body),
        })
    }

    /// `ENT0`: enter a new message. If the room is a mailbox and the
    /// message carries an EUID already present, the prior message is
    /// soft-deleted (upsert, spec §4.4, §8 "EUID upsert idempotence").
    pub fn enter(&self, room_number: i64, msg: &Message, now: i64) -> Result<i64, crate::error::CitadelError> {
        let lock = self.room_lock(room_number);
        let _guard = lock.lock().unwrap();
        let conn = self.db.conn.lock().unwrap();

        if let Some(euid) = msg.euid() {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT msgnum FROM messages WHERE room_number=?1 AND euid=?2 AND deleted=0",
                    params![room_number, euid],
                    |r| r.get(0),
                )
                .optional()?;
            if let Some(old_msgnum) = existing {
                conn.execute(
                    "UPDATE messages SET deleted=1 WHERE room_number=?1 AND msgnum=?2",
                    params![room_number, old_msgnum],
                )?;
            }
        }

        let mut all_fields: BTreeMap<String, String> = msg
            .fields
            .iter()
            .map(|(f, v)| (f.mnemonic().to_string(), v.clone()))
            .collect();
        all_fields.extend(msg.extra_fields.clone());
        let fields_json = serde_json::to_string(&all_fields).unwrap_or_else(|_| "{}".to_string());
        let body = msg.body_text();

        conn.execute(
            "INSERT INTO messages (room_number, euid, fields, body, body_kind, inserted_at) VALUES (?1, ?2, ?3, ?4, 'flat', ?5)",
            params![room_number, msg.euid(), fields_json, body, now],
        )?;
        let new_msgnum = conn.last_insert_rowid();
        conn.execute(
            "UPDATE rooms SET highest_message = MAX(highest_message, ?1), last_write = ?2 WHERE number = ?3",
            params![new_msgnum, now, room_number],
        )?;
        Ok(new_msgnum)
    }

    /// `DELE`: soft-delete one message. Permission is the caller's
    /// responsibility (spec §4.4 permissioning table, enforced by the
    /// protocol layer before calling this).
    pub fn delete(&self, room_number: i64, msgnum: i64) -> Result<(), crate::error::CitadelError> {
        let conn = self.db.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE messages SET deleted=1 WHERE room_number=?1 AND msgnum=?2 AND deleted=0",
            params![room_number, msgnum],
        )?;
        if affected == 0 {
            return Err(crate::error::CitadelError::NotFound(format!(
                "no such message {msgnum} in room {room_number}"
            )));
        }
        Ok(())
    }

    /// `MOVE n|targetroom|copy`: atomically move or copy one message.
    pub fn move_or_copy(
        &self,
        room_number: i64,
        msgnum: i64,
        target_room: i64,
        copy: bool,
        now: i64,
    ) -> Result<i64, crate::error::CitadelError> {
        let conn = self.db.conn.lock().unwrap();
        let target_exists: bool = conn
            .query_row("SELECT 1 FROM rooms WHERE number=?1", params![target_room], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if !target_exists {
            return Err(crate::error::CitadelError::Precondition(
                "target room does not exist".to_string(),
            ));
        }

        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT fields, body FROM messages WHERE room_number=?1 AND msgnum=?2 AND deleted=0",
                params![room_number, msgnum],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((fields_json, body)) = row else {
            return Err(crate::error::CitadelError::NotFound(format!("no such message {msgnum}")));
        };

        if copy {
            // A copy gets a new number and no EUID unless one is set explicitly
            // (spec §4.4 invariants).
            conn.execute(
                "INSERT INTO messages (room_number, euid, fields, body, body_kind, inserted_at) VALUES (?1, NULL, ?2, ?3, 'flat', ?4)",
                params![target_room, fields_json, body, now],
            )?;
            let new_num = conn.last_insert_rowid();
            conn.execute(
                "UPDATE rooms SET highest_message = MAX(highest_message, ?1), last_write=?2 WHERE number=?3",
                params![new_num, now, target_room],
            )?;
            Ok(new_num)
        } else {
            // A moved message retains its number (spec §4.4 invariants).
            conn.execute(
                "UPDATE messages SET room_number=?1 WHERE room_number=?2 AND msgnum=?3",
                params![target_room, room_number, msgnum],
            )?;
            conn.execute(
                "UPDATE rooms SET highest_message = MAX(highest_message, ?1), last_write=?2 WHERE number=?3",
                params![msgnum, now, target_room],
            )?;
            Ok(msgnum)
        }
    }

    /// `EUID s`: resolve the message number with matching EUID in the
    /// current room. Retries with a `.ics` suffix stripped, an ad-hoc
    /// accommodation preserved verbatim per spec §9's open question.
    pub fn euid_lookup(&self, room_number: i64, euid: &str) -> Option<i64> {
        let conn = self.db.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row(
                "SELECT msgnum FROM messages WHERE room_number=?1 AND euid=?2 AND deleted=0",
                params![room_number, euid],
                |r| r.get(0),
            )
            .optional()
            .ok()
            .flatten();
        if found.is_some() {
            return found;
        }
        if let Some(stripped) = euid.strip_suffix(".ics") {
            return conn
                .query_row(
                    "SELECT msgnum FROM messages WHERE room_number=?1 AND euid=?2 AND deleted=0",
                    params![room_number, stripped],
                    |r| r.get(0),
                )
                .optional()
                .ok()
                .flatten();
        }
        None
    }

    /// Build an `MSet` over the currently-present (non-deleted) message
    /// numbers in `room_number` that fall within `candidate`.
    pub fn visible_subset(&self, room_number: i64, candidate: &MSet, highest: i64) -> Vec<i64> {
        let all = self.list(room_number, &MsgsKind::All);
        let present: std::collections::HashSet<i64> = all.into_iter().collect();
        candidate
            .to_numbers(highest)
            .into_iter()
            .filter(|n| present.contains(n))
            .collect()
    }
}

fn query_numbers(conn: &rusqlite::Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Vec<i64> {
    let mut stmt = conn.prepare(sql).unwrap();
    stmt.query_map(params, |row| row.get(0))
        .unwrap()
        .filter_map(|r| r.ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Body, Field, Message};

    fn new_store() -> MessageStore {
        MessageStore::new(Arc::new(Db::open_in_memory()))
    }

    fn msg(subject: &str, euid: Option<&str>) -> Message {
        let mut m = Message::new(Body::Flat("hello".to_string()));
        m.set(Field::Subject, subject);
        if let Some(e) = euid {
            m.set(Field::Euid, e);
        }
        m
    }

    #[test]
    fn monotonic_message_numbers() {
        let store = new_store();
        let a = store.enter(0, &msg("one", None), 1).unwrap();
        let b = store.enter(0, &msg("two", None), 2).unwrap();
        let c = store.enter(0, &msg("three", None), 3).unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn euid_upsert_is_idempotent() {
        let store = new_store();
        let first = store.enter(0, &msg("v1", Some("evt-1")), 1).unwrap();
        let second = store.enter(0, &msg("v2", Some("evt-1")), 2).unwrap();
        assert_ne!(first, second);
        let visible = store.list(0, &MsgsKind::All);
        assert_eq!(visible, vec![second]);
        assert_eq!(store.euid_lookup(0, "evt-1"), Some(second));
    }

    #[test]
    fn euid_ics_suffix_retry() {
        let store = new_store();
        let n = store.enter(0, &msg("cal", Some("event-42")), 1).unwrap();
        assert_eq!(store.euid_lookup(0, "event-42.ics"), Some(n));
    }

    #[test]
    fn move_retains_number_copy_gets_new_number() {
        let db = Arc::new(Db::open_in_memory());
        let store = MessageStore::new(db.clone());
        {
            let conn = db.conn.lock().unwrap();
            conn.execute("INSERT INTO rooms (number, name) VALUES (1, 'Other')", []).unwrap();
        }
        let n = store.enter(0, &msg("x", None), 1).unwrap();
        let moved = store.move_or_copy(0, n, 1, false, 2).unwrap();
        assert_eq!(moved, n);

        let n2 = store.enter(0, &msg("y", None), 3).unwrap();
        let copied = store.move_or_copy(0, n2, 1, true, 4).unwrap();
        assert_ne!(copied, n2);
        let _ = store;
    }

    #[test]
    fn move_to_missing_room_fails_precondition() {
        let store = new_store();
        let n = store.enter(0, &msg("x", None), 1).unwrap();
        let err = store.move_or_copy(0, n, 999, false, 2).unwrap_err();
        assert!(matches!(err, crate::error::CitadelError::Precondition(_)));
    }
}
