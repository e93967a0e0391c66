//! Gateway: HTTP API, provider event dispatch, and process lifecycle.
//!
//! Lifecycle:
//! 1. Build shared state (sessions, delivery tracker, relay, media store)
//! 2. Spawn the provider event dispatcher and status forwarder
//! 3. Spawn the periodic sweep
//! 4. Serve HTTP until Ctrl-C or SIGTERM
//! 5. Tear down every session and disarm pending deadlines
//!
//! Session and delivery logic live in their own crates; this crate only
//! wires them to HTTP and to the provider event stream.

pub mod error;
pub mod events;
pub mod handlers;
pub mod server;
pub mod state;

pub use {
    server::{build_gateway_app, start_gateway},
    state::{GatewayChannels, GatewayState},
};
