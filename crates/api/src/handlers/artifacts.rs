use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use taskhub_core::artifact::{content_type_for, ArtifactRef, ArtifactStager};

use crate::error::AppResult;
use crate::state::AppState;

/// GET /processed/{file}
///
/// Serves an artifact by its exact generated file name. Names that do not
/// follow the artifact naming scheme are unknown artifacts.
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> AppResult<impl IntoResponse> {
    let artifact: ArtifactRef = file.parse()?;
    let bytes = state.stager.load(&artifact).await?;
    Ok(([(CONTENT_TYPE, content_type_for(artifact.extension()))], bytes))
}
