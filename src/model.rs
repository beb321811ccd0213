//! C5: room & user data model (spec §3, §4.5).

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    Deleted = 0,
    New = 1,
    Problem = 2,
    Local = 3,
    Network = 4,
    Preferred = 5,
    Aide = 6,
}

/// Small hand-rolled bit-flag wrapper, mirroring the C original's plain
/// `unsigned` flag words (`original_source` uses raw bitmasks throughout;
/// no flags crate is in the corpus dependency set, so this stays a plain
/// newtype over `u32` rather than pulling one in).
macro_rules! flag_set {
    ($name:ident { $($variant:ident = $bit:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(u32);

        impl $name {
            $(pub const $variant: $name = $name($bit);)+

            pub const fn empty() -> Self {
                $name(0)
            }

            pub const fn from_bits_value(bits: u32) -> Self {
                $name(bits)
            }

            pub const fn bits(self) -> u32 {
                self.0
            }

            pub const fn contains(self, other: Self) -> bool {
                (self.0 & other.0) == other.0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: Self) -> Self {
                $name(self.0 | rhs.0)
            }
        }
    };
}

flag_set!(UserFlags {
    EXPERT = 1 << 0,
    PAGINATOR = 1 << 1,
    FLOORS = 1 << 2,
    COLOR = 1 << 3,
    INTERNET_MAIL = 1 << 4,
    REGISTERED = 1 << 5,
});

flag_set!(RoomFlags {
    MAILBOX = 1 << 0,
    PRIVATE = 1 << 1,
    DIRECTORY = 1 << 2,
    NETWORK_SHARED = 1 << 3,
    COLLABORATIVE_DELETE = 1 << 4,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultView {
    Bulletin,
    Mailbox,
    Addressbook,
    Calendar,
    Tasks,
    Notes,
    Wiki,
    Journal,
    Blog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryMode {
    Default,
    Never,
    ByCount,
    ByAge,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub password_hash: String,
    pub access_level: AccessLevel,
    pub flags: UserFlags,
    pub times_called: u64,
    pub messages_posted: u64,
    pub last_login: i64,
    pub purge_days: u32,
    pub addresses: Vec<String>,
}

impl User {
    pub fn is_aide(&self) -> bool {
        self.access_level == AccessLevel::Aide
    }

    pub fn is_deleted(&self) -> bool {
        self.access_level == AccessLevel::Deleted
    }

    /// `true` iff `addr` is one of this user's known Internet addresses
    /// (spec §4.8, consulted by the vacation action).
    pub fn owns_address(&self, addr: &str) -> bool {
        self.addresses.iter().any(|a| a.eq_ignore_ascii_case(addr))
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub number: i64,
    pub name: String,
    pub password: Option<String>,
    pub room_aide: Option<i64>,
    pub highest_message: i64,
    pub generation: u64,
    pub flags: RoomFlags,
    pub directory_name: Option<String>,
    pub floor_id: i64,
    pub last_write: i64,
    pub expiry_mode: ExpiryMode,
    pub expiry_value: i64,
    pub sort_order: i32,
    pub default_view: DefaultView,
}

impl Room {
    /// spec §3 invariant: if `mailbox` is set, the room name begins with
    /// the owning user's numeric id.
    pub fn is_owned_mailbox_of(&self, user_id: i64) -> bool {
        self.flags.contains(RoomFlags::MAILBOX) && self.name.starts_with(&format!("{user_id}"))
    }

    pub fn bump_write(&mut self, now: i64, new_highest: i64) {
        if new_highest > self.highest_message {
            self.highest_message = new_highest;
        }
        self.last_write = now;
    }

    /// KILL soft-deletes messages first, then destroys the room; the
    /// generation bump invalidates any stale known/zapped pointers held by
    /// clients against the old room identity (spec §3 "Lifecycle").
    pub fn recreate(&mut self) {
        self.generation += 1;
        self.highest_message = 0;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Floor {
    pub id: i64,
    pub name: String,
}

/// Per (user, room) relation (spec §3 "Room-Known relation").
#[derive(Debug, Clone)]
pub struct RoomKnown {
    pub known: bool,
    pub zapped: bool,
    pub last_seen: i64,
    pub skip: bool,
}

impl RoomKnown {
    /// Clamp `last_seen` against the room's current highest message
    /// (spec §9 open question: this spec mandates clamping).
    pub fn clamp_to(&mut self, room_highest: i64) {
        if self.last_seen > room_highest {
            self.last_seen = room_highest;
        }
    }
}

/// The set of rooms a user may access: directly accessible or "known"
/// (spec §4.5 `LKRA`).
pub struct RoomAccess {
    pub accessible: HashSet<i64>,
}

impl RoomAccess {
    pub fn can_enter(&self, room: &Room, user: &User) -> bool {
        if !room.flags.contains(RoomFlags::PRIVATE) {
            return true;
        }
        user.is_aide() || self.accessible.contains(&room.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_room() -> Room {
        Room {
            number: 1,
            name: "Lobby".into(),
            password: None,
            room_aide: None,
            highest_message: 10,
            generation: 0,
            flags: RoomFlags::empty(),
            directory_name: None,
            floor_id: 0,
            last_write: 0,
            expiry_mode: ExpiryMode::Default,
            expiry_value: 0,
            sort_order: 0,
            default_view: DefaultView::Bulletin,
        }
    }

    #[test]
    fn last_seen_clamps_to_highest() {
        let mut rk = RoomKnown {
            known: true,
            zapped: false,
            last_seen: 999,
            skip: false,
        };
        rk.clamp_to(10);
        assert_eq!(rk.last_seen, 10);
    }

    #[test]
    fn mailbox_room_name_must_start_with_owner_id() {
        let mut room = sample_room();
        room.flags = RoomFlags::MAILBOX;
        room.name = "42.INBOX".into();
        assert!(room.is_owned_mailbox_of(42));
        assert!(!room.is_owned_mailbox_of(7));
    }

    #[test]
    fn recreate_bumps_generation_and_resets_highest() {
        let mut room = sample_room();
        room.recreate();
        assert_eq!(room.generation, 1);
        assert_eq!(room.highest_message, 0);
    }
}
