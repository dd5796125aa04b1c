use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use taskhub_core::artifact::{upload_extension, ArtifactStager};
use taskhub_core::error::CoreError;
use taskhub_core::job::JobPayload;

use crate::error::AppResult;
use crate::response::TaskAccepted;
use crate::state::AppState;

/// Multipart field that carries the image.
pub const IMAGE_FIELD: &str = "image";

/// POST /upscale
///
/// Stages the uploaded image, then submits an UPSCALE job whose output is
/// the derived `{id}-processed.{ext}` artifact. The upload is validated
/// before anything is stored, so a bad request never creates a job. If the
/// job cannot be submitted the staged file is removed again.
pub async fn submit_upscale(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<TaskAccepted>)> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let extension = upload_extension(&file_name)?;
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(CoreError::UploadInvalid(format!("Field '{IMAGE_FIELD}' is empty")).into());
        }

        upload = Some((bytes, extension));
        break;
    }

    let (bytes, extension) = upload.ok_or_else(|| {
        CoreError::UploadInvalid(format!("Missing file field '{IMAGE_FIELD}'"))
    })?;

    let input = state.stager.store(&bytes, &extension).await?;
    let output = state.stager.derive_output_ref(&input);
    tracing::info!(input = %input, output = %output, size = bytes.len(), "Upload staged");

    let submitted = state
        .dispatcher
        .submit(JobPayload::Upscale {
            input: input.clone(),
            output,
        })
        .await;

    let task_id = match submitted {
        Ok(task_id) => task_id,
        Err(e) => {
            // No job refers to the staged input any more.
            if let Err(cleanup) = state.stager.remove(&input).await {
                tracing::warn!(input = %input, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    Ok((StatusCode::ACCEPTED, Json(TaskAccepted { task_id })))
}
