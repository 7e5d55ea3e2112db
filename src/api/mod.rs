use rocket::Route;

mod auth;
mod elections;
mod submissions;
mod tokens;

pub use auth::{PlatformKey, PLATFORM_KEY_HEADER};

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(elections::routes());
    routes.extend(submissions::routes());
    routes.extend(tokens::routes());
    routes
}
