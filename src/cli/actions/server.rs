use crate::api;
use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            redis_url,
        } => {
            api::new(port, dsn, redis_url, globals).await?;
        }
    }

    Ok(())
}
