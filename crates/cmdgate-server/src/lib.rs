pub mod logging;
pub mod server;
pub mod state;
pub mod websocket;

pub use logging::init_logging;
pub use server::{create_router, run_server, serve};
pub use state::AppState;
