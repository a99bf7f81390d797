mod error;
mod handlers;
mod middleware;
mod router;
mod state;

#[cfg(test)]
mod tests;

pub use router::app_router;
pub use state::AppState;
