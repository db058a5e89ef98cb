//! `POST /deploy`: signed multipart request in, live script output out.

use std::convert::Infallible;

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
};
use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use super::api::SharedState;
use crate::config::Config;
use crate::deploy::upload;
use crate::errors::DeployError;

impl IntoResponse for DeployError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "deploy failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "deploy rejected");
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.public_message(),
        )
            .into_response()
    }
}

async fn deploy(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, DeployError> {
    let multipart = multipart.map_err(|e| DeployError::BadUpload(e.body_text()))?;
    let form = upload::read_form(multipart).await?;

    let now_ms = chrono::Utc::now().timestamp_millis();
    let started = state.deployer.start(form, now_ms).await?;
    tracing::info!(
        code = %started.job.code,
        script = %started.job.script.display(),
        artifact = ?started.job.artifact,
        "deploy started"
    );

    let chunks = state.deployer.stream(started);
    let body = Body::from_stream(ReceiverStream::new(chunks).map(Ok::<_, Infallible>));

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        body,
    )
        .into_response())
}

pub fn deploy_router(config: &Config) -> Router<SharedState> {
    let limit = usize::try_from(config.server.max_upload_bytes).unwrap_or(usize::MAX);
    Router::new()
        .route("/deploy", post(deploy))
        .layer(DefaultBodyLimit::max(limit))
}
