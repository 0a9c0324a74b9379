//! Dashboard binary that co-locates the sweep monitor with the HTTP status
//! views, so both share one in-memory telemetry store.

mod application;
mod handlers;
mod state;


use std::io;

#[actix_web::main]
async fn main() -> io::Result<()> {
    if let Err(err) = application::run().await {
        eprintln!("[api] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}
