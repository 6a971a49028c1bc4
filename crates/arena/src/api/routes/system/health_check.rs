use axum::{extract::State, http::StatusCode, response::ErrorResponse};
use log::{debug, error};
use std::sync::Arc;

use crate::{domain::Error, startup::AppState};

pub async fn health(State(state): State<Arc<AppState>>) -> Result<StatusCode, ErrorResponse> {
    state.db.ping().await.map_err(|e| {
        error!("{}", e);
        Error::from(e)
    })?;

    for (task_name, task) in state.background_tasks.iter() {
        if task.is_finished() {
            let err = Error::BackgroundTask(format!(
                "{} has stopped, the service needs a restart",
                task_name
            ));
            error!("{}", err);
            return Err(err.into());
        }
    }

    debug!("service, background tasks and db are up");
    Ok(StatusCode::OK)
}
