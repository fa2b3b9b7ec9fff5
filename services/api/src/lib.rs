mod cli;
mod infra;
mod routes;
mod server;
mod terminal;

use credit_intake::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
