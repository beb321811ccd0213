use super::{json_error, AuthenticatedUser};
use crate::context::ServerContext;
use crate::model::RoomFlags;
use crate::protocol::commands::visible_mset;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{get, State};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct RoomSummary {
    pub name: String,
    pub number: i64,
    pub floor_id: i64,
    pub highest_message: i64,
    pub private: bool,
    pub mailbox: bool,
    /// Compact range encoding of the room's message numbers (spec's
    /// `MSet` format), e.g. `"1:5,10:*"`.
    pub message_set: Option<String>,
}

#[get("/ctdl/r")]
pub fn list_rooms(ctx: &State<Arc<ServerContext>>) -> Json<Vec<RoomSummary>> {
    let rooms: Vec<RoomSummary> = ctx
        .list_room_names()
        .into_iter()
        .filter_map(|(_, number)| ctx.load_room(number))
        .map(|r| RoomSummary {
            name: r.name,
            number: r.number,
            floor_id: r.floor_id,
            highest_message: r.highest_message,
            private: r.flags.contains(RoomFlags::PRIVATE),
            mailbox: r.flags.contains(RoomFlags::MAILBOX),
            message_set: None,
        })
        .collect();
    Json(rooms)
}

#[get("/ctdl/r/<name>")]
pub fn room_info(
    ctx: &State<Arc<ServerContext>>,
    auth: AuthenticatedUser,
    name: &str,
) -> Result<Json<RoomSummary>, (Status, Json<serde_json::Value>)> {
    let Some(room) = ctx.load_room_by_name(name) else {
        return Err(json_error(Status::NotFound, "no such room"));
    };
    if room.flags.contains(RoomFlags::PRIVATE) && !auth.user.is_aide() {
        return Err(json_error(Status::Forbidden, "access denied"));
    }
    let message_set = visible_mset(ctx, room.number).to_string();
    Ok(Json(RoomSummary {
        name: room.name,
        number: room.number,
        floor_id: room.floor_id,
        highest_message: room.highest_message,
        private: room.flags.contains(RoomFlags::PRIVATE),
        mailbox: room.flags.contains(RoomFlags::MAILBOX),
        message_set: Some(message_set),
    }))
}
