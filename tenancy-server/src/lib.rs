mod app;
mod identity;
mod seed;

pub use app::{build, build_with, collections, Server, ENV_PREFIX};
pub use identity::USER_HEADER;
