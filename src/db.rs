//! Persisted state layout (spec §6): room/message/user/room-known/rule
//! tables behind one sqlite connection, following the teacher's
//! `Db { conn: Mutex<Connection> }` + idempotent `migrate()` idiom.

use rusqlite::Connection;
use std::sync::Mutex;

pub struct Db {
    pub conn: Mutex<Connection>,
}

impl Db {
    pub fn new(path: &str) -> Self {
        let conn = Connection::open(path).expect("failed to open citadel database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("failed to set pragmas");
        let db = Db {
            conn: Mutex::new(conn),
        };
        db.migrate();
        db
    }

    pub fn open_in_memory() -> Self {
        let conn = Connection::open_in_memory().expect("failed to open in-memory database");
        let db = Db {
            conn: Mutex::new(conn),
        };
        db.migrate();
        db
    }

    fn migrate(&self) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                access_level INTEGER NOT NULL DEFAULT 1,
                flags INTEGER NOT NULL DEFAULT 0,
                times_called INTEGER NOT NULL DEFAULT 0,
                messages_posted INTEGER NOT NULL DEFAULT 0,
                last_login INTEGER NOT NULL DEFAULT 0,
                purge_days INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS user_addresses (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                address TEXT NOT NULL,
                PRIMARY KEY (user_id, address)
            );

            CREATE TABLE IF NOT EXISTS rooms (
                number INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                password TEXT,
                room_aide INTEGER,
                highest_message INTEGER NOT NULL DEFAULT 0,
                generation INTEGER NOT NULL DEFAULT 0,
                flags INTEGER NOT NULL DEFAULT 0,
                directory_name TEXT,
                floor_id INTEGER NOT NULL DEFAULT 0,
                last_write INTEGER NOT NULL DEFAULT 0,
                expiry_mode INTEGER NOT NULL DEFAULT 0,
                expiry_value INTEGER NOT NULL DEFAULT 0,
                sort_order INTEGER NOT NULL DEFAULT 0,
                default_view INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS floors (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS messages (
                msgnum INTEGER PRIMARY KEY AUTOINCREMENT,
                room_number INTEGER NOT NULL REFERENCES rooms(number) ON DELETE CASCADE,
                euid TEXT,
                fields TEXT NOT NULL DEFAULT '{}',
                body TEXT NOT NULL DEFAULT '',
                body_kind TEXT NOT NULL DEFAULT 'flat',
                deleted INTEGER NOT NULL DEFAULT 0,
                inserted_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_room ON messages(room_number, msgnum);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_room_euid
                ON messages(room_number, euid) WHERE euid IS NOT NULL AND deleted = 0;

            CREATE TABLE IF NOT EXISTS room_known (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                room_number INTEGER NOT NULL REFERENCES rooms(number) ON DELETE CASCADE,
                known INTEGER NOT NULL DEFAULT 0,
                zapped INTEGER NOT NULL DEFAULT 0,
                last_seen INTEGER NOT NULL DEFAULT 0,
                skip INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, room_number)
            );

            CREATE TABLE IF NOT EXISTS rules (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                idx INTEGER NOT NULL,
                record TEXT NOT NULL,
                PRIMARY KEY (user_id, idx)
            );

            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .expect("failed to run citadel schema migration");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM rooms WHERE name = 'Lobby'", [], |r| r.get(0))
            .unwrap_or(0);
        if count == 0 {
            conn.execute(
                "INSERT INTO rooms (number, name, flags, floor_id, last_write) VALUES (0, 'Lobby', 0, 0, 0)",
                [],
            )
            .ok();
        }
        let floor_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM floors", [], |r| r.get(0))
            .unwrap_or(0);
        if floor_count == 0 {
            conn.execute("INSERT INTO floors (id, name) VALUES (0, 'Main Floor')", [])
                .ok();
        }
    }
}
