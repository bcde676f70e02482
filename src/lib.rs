pub mod config;
pub mod message_id;
pub mod onenet;
pub mod server;
pub mod token;
pub mod types;

pub use config::RelayConfig;
pub use onenet::{OneNetClient, RelayError, UpstreamResponse};
pub use server::{AppState, app, build_app};
pub use token::{Credentials, SignError, sign, sign_now};
