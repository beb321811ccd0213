//! The single top-level server context (spec §9 design note: "Global
//! mutable state... becomes a single top-level server context
//! constructed at startup and handed down by explicit reference").

use crate::config::CitadelConfig;
use crate::db::Db;
use crate::hashlist::{HashAlgorithm, HashList};
use crate::model::{Room, RoomFlags, User};
use crate::store::MessageStore;
use rusqlite::params;
use std::sync::{Arc, Mutex};

/// Server-wide state handed to every session and every HTTP route.
pub struct ServerContext {
    pub config: CitadelConfig,
    pub db: Arc<Db>,
    pub store: MessageStore,
    /// Room-name -> room-number index (C1 use site, spec §4.1/§4.5): the
    /// line protocol's `GOTO` resolves a name without a SQL round trip on
    /// the hot path.
    pub room_index: Mutex<HashList<i64>>,
}

impl ServerContext {
    pub fn new(config: CitadelConfig) -> Self {
        let db = Arc::new(Db::new(
            config
                .sqlite_path()
                .to_str()
                .expect("data dir path must be valid UTF-8"),
        ));
        Self::from_db(config, db)
    }

    pub fn new_in_memory(config: CitadelConfig) -> Self {
        let db = Arc::new(Db::open_in_memory());
        Self::from_db(config, db)
    }

    fn from_db(config: CitadelConfig, db: Arc<Db>) -> Self {
        let store = MessageStore::new(db.clone());
        let room_index = Mutex::new(Self::build_room_index(&db));
        ServerContext {
            config,
            db,
            store,
            room_index,
        }
    }

    fn build_room_index(db: &Db) -> HashList<i64> {
        let mut index = HashList::new(HashAlgorithm::Jenkins32, true);
        let conn = db.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name, number FROM rooms").unwrap();
        let rows: Vec<(String, i64)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        for (name, number) in rows {
            index.put(name.as_bytes(), number, |_| {});
        }
        index
    }

    pub fn resolve_room_number(&self, name: &str) -> Option<i64> {
        let index = self.room_index.lock().unwrap();
        index.get(name.as_bytes()).copied()
    }

    pub fn load_room(&self, number: i64) -> Option<Room> {
        let conn = self.db.conn.lock().unwrap();
        conn.query_row(
            "SELECT number, name, password, room_aide, highest_message, generation, flags,
                    directory_name, floor_id, last_write, expiry_mode, expiry_value, sort_order, default_view
             FROM rooms WHERE number = ?1",
            params![number],
            row_to_room,
        )
        .ok()
    }

    pub fn load_room_by_name(&self, name: &str) -> Option<Room> {
        let number = self.resolve_room_number(name)?;
        self.load_room(number)
    }

    pub fn create_room(&self, name: &str, flags: RoomFlags, floor_id: i64) -> i64 {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO rooms (name, flags, floor_id) VALUES (?1, ?2, ?3)",
            params![name, flags_bits(flags), floor_id],
        )
        .expect("insert room");
        let number = conn.last_insert_rowid();
        drop(conn);
        self.room_index.lock().unwrap().put(name.as_bytes(), number, |_| {});
        number
    }

    pub fn list_room_names(&self) -> Vec<(String, i64)> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT name, number FROM rooms ORDER BY sort_order, name")
            .unwrap();
        stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    pub fn load_user(&self, name: &str) -> Option<User> {
        let conn = self.db.conn.lock().unwrap();
        let user: Option<User> = conn
            .query_row(
                "SELECT id, name, password_hash, access_level, flags, times_called, messages_posted, last_login, purge_days
                 FROM users WHERE name = ?1 COLLATE NOCASE",
                params![name],
                row_to_user,
            )
            .ok();
        let Some(mut user) = user else { return None };
        let mut stmt = conn
            .prepare("SELECT address FROM user_addresses WHERE user_id = ?1")
            .unwrap();
        user.addresses = stmt
            .query_map(params![user.id], |r| r.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        Some(user)
    }

    pub fn create_user(&self, name: &str, password_hash: &str) -> i64 {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (name, password_hash, access_level) VALUES (?1, ?2, 1)",
            params![name, password_hash],
        )
        .expect("insert user");
        conn.last_insert_rowid()
    }

    pub fn room_known(&self, user_id: i64, room_number: i64) -> crate::model::RoomKnown {
        let conn = self.db.conn.lock().unwrap();
        conn.query_row(
            "SELECT known, zapped, last_seen, skip FROM room_known WHERE user_id=?1 AND room_number=?2",
            params![user_id, room_number],
            |r| {
                Ok(crate::model::RoomKnown {
                    known: r.get::<_, i64>(0)? != 0,
                    zapped: r.get::<_, i64>(1)? != 0,
                    last_seen: r.get(2)?,
                    skip: r.get::<_, i64>(3)? != 0,
                })
            },
        )
        .unwrap_or(crate::model::RoomKnown {
            known: false,
            zapped: false,
            last_seen: 0,
            skip: false,
        })
    }

    /// `SLRP n`: set the caller's last-seen pointer, clamped to the
    /// room's current highest message (spec §9 open question, resolved
    /// here in favor of clamping).
    pub fn set_last_seen(&self, user_id: i64, room_number: i64, n: i64) {
        let room = self.load_room(room_number);
        let mut rk = self.room_known(user_id, room_number);
        rk.last_seen = n;
        if let Some(room) = &room {
            rk.clamp_to(room.highest_message);
        }
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO room_known (user_id, room_number, known, zapped, last_seen, skip)
             VALUES (?1, ?2, 1, 0, ?3, 0)
             ON CONFLICT(user_id, room_number) DO UPDATE SET last_seen = excluded.last_seen, known = 1",
            params![user_id, room_number, rk.last_seen],
        )
        .expect("update room_known");
    }
}

fn flags_bits(flags: RoomFlags) -> i64 {
    flags.bits() as i64
}

fn room_flags_from_bits(bits: i64) -> RoomFlags {
    RoomFlags::from_bits_value(bits as u32)
}

fn row_to_room(row: &rusqlite::Row) -> rusqlite::Result<Room> {
    let flags_bits: i64 = row.get(6)?;
    let expiry_mode: i64 = row.get(10)?;
    let default_view: i64 = row.get(13)?;
    Ok(Room {
        number: row.get(0)?,
        name: row.get(1)?,
        password: row.get(2)?,
        room_aide: row.get(3)?,
        highest_message: row.get(4)?,
        generation: row.get::<_, i64>(5)? as u64,
        flags: room_flags_from_bits(flags_bits),
        directory_name: row.get(7)?,
        floor_id: row.get(8)?,
        last_write: row.get(9)?,
        expiry_mode: match expiry_mode {
            1 => crate::model::ExpiryMode::Never,
            2 => crate::model::ExpiryMode::ByCount,
            3 => crate::model::ExpiryMode::ByAge,
            _ => crate::model::ExpiryMode::Default,
        },
        expiry_value: row.get(11)?,
        sort_order: row.get(12)?,
        default_view: match default_view {
            1 => crate::model::DefaultView::Mailbox,
            2 => crate::model::DefaultView::Addressbook,
            3 => crate::model::DefaultView::Calendar,
            4 => crate::model::DefaultView::Tasks,
            5 => crate::model::DefaultView::Notes,
            6 => crate::model::DefaultView::Wiki,
            7 => crate::model::DefaultView::Journal,
            8 => crate::model::DefaultView::Blog,
            _ => crate::model::DefaultView::Bulletin,
        },
    })
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let access_level: i64 = row.get(3)?;
    let flags_bits: i64 = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        password_hash: row.get(2)?,
        access_level: match access_level {
            0 => crate::model::AccessLevel::Deleted,
            2 => crate::model::AccessLevel::Problem,
            3 => crate::model::AccessLevel::Local,
            4 => crate::model::AccessLevel::Network,
            5 => crate::model::AccessLevel::Preferred,
            6 => crate::model::AccessLevel::Aide,
            _ => crate::model::AccessLevel::New,
        },
        flags: crate::model::UserFlags::from_bits_value(flags_bits as u32),
        times_called: row.get::<_, i64>(5)? as u64,
        messages_posted: row.get::<_, i64>(6)? as u64,
        last_login: row.get(7)?,
        purge_days: row.get::<_, i64>(8)? as u32,
        addresses: Vec::new(),
    })
}
