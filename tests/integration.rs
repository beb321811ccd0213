// End-to-end coverage for the line protocol and its HTTP gateway.
// Organized by surface: protocol.rs drives raw TCP, rooms.rs/messages.rs
// drive the REST/WebDAV gateway through rocket::local::blocking::Client.

mod common;

mod messages;
mod protocol;
mod rooms;
