pub mod router;
pub mod types;
pub mod handlers {
    pub mod common;
    pub mod config;
    pub mod database;
    pub mod health;
    pub mod schema;
}

pub use router::{create_router, ApiDoc};
pub use types::AppState;
