// Network adapter modules split by external client sockets vs controller HTTP routes.

pub mod client;
pub mod internal;

pub use client::{SerializedOutbound, outbound_serializer, ws_handler};
pub use internal::{
    game_state_handler, pause_game_handler, resume_game_handler, start_game_handler,
    stop_game_handler,
};
