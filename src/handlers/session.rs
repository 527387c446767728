// src/handlers/session.rs

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        exam_record::SubmitReason,
        session::{
            AnswerRequest, CommandResponse, SignalRequest, StartSessionRequest, SubmitRequest,
            SubmitResponse, VisibilityRequest,
        },
    },
    session::{
        CommandOutcome, ExamSession, SessionError, SessionRegistry, SessionStatus, Submission,
        registry::SessionEntry,
    },
    utils::jwt::Claims,
};

/// Looks up a session owned by the calling student.
/// Sessions of other students are reported as missing.
pub(crate) async fn load_entry(
    registry: &SessionRegistry,
    claims: &Claims,
    id: Uuid,
) -> Result<SessionEntry, AppError> {
    let student_id = claims.student_id()?;
    match registry.get(id).await {
        Some(entry) if entry.session.student_id() == student_id => Ok(entry),
        _ => Err(SessionError::NotFound(id).into()),
    }
}

async fn command_response(
    session: &ExamSession,
    outcome: CommandOutcome,
) -> Json<CommandResponse> {
    Json(CommandResponse {
        applied: outcome.applied(),
        session: session.snapshot().await,
    })
}

async fn submit_response(session: &ExamSession, submission: Submission) -> Json<SubmitResponse> {
    let snapshot = session.snapshot().await;
    let (finalized, result) = match submission {
        Submission::Finalized(result) => (true, Some(result)),
        Submission::Ignored => (false, snapshot.result),
    };
    Json(SubmitResponse {
        finalized,
        status: snapshot.status,
        result,
    })
}

/// Opens and starts the caller's attempt at an exam.
///
/// * Refuses a second attempt at the same exam (409).
/// * Returns 201 Created and the initial snapshot.
pub async fn open_session(
    State(registry): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let student_id = claims.student_id()?;
    let entry = registry.open(student_id, payload.exam_id).await?;

    if let Err(e) = entry.session.start().await {
        tracing::error!("Failed to start session {}: {}", entry.session.id(), e);
        registry.release(entry.session.id()).await;
        return Err(e.into());
    }

    Ok((StatusCode::CREATED, Json(entry.session.snapshot().await)))
}

/// Current state of a session.
pub async fn get_session(
    State(registry): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let entry = load_entry(&registry, &claims, id).await?;
    Ok(Json(entry.session.snapshot().await))
}

/// Records (or changes) the answer to one question.
pub async fn answer_question(
    State(registry): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let entry = load_entry(&registry, &claims, id).await?;
    let outcome = entry
        .session
        .answer(payload.question_id, payload.option_index)
        .await?;
    Ok(command_response(&entry.session, outcome).await)
}

pub async fn next_question(
    State(registry): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let entry = load_entry(&registry, &claims, id).await?;
    let outcome = entry.session.next().await;
    Ok(command_response(&entry.session, outcome).await)
}

pub async fn previous_question(
    State(registry): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let entry = load_entry(&registry, &claims, id).await?;
    let outcome = entry.session.previous().await;
    Ok(command_response(&entry.session, outcome).await)
}

/// Manual submission by the student.
///
/// A request that loses the race against the timer or the integrity
/// monitor still succeeds, with `finalized: false` and the stored result.
/// A failed save returns 503; the result is kept for `/retry`.
pub async fn submit_session(
    State(registry): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    // The body is optional; an empty one means a plain manual submission.
    let reason = if body.is_empty() {
        SubmitReason::Manual
    } else {
        serde_json::from_slice::<SubmitRequest>(&body)?
            .reason
            .unwrap_or(SubmitReason::Manual)
    };
    if reason != SubmitReason::Manual {
        return Err(AppError::BadRequest(
            "Only manual submissions can be requested".to_string(),
        ));
    }

    let entry = load_entry(&registry, &claims, id).await?;
    let submission = entry.session.submit(reason).await?;
    Ok(submit_response(&entry.session, submission).await)
}

/// Retries saving a result whose first save failed.
pub async fn retry_persistence(
    State(registry): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let entry = load_entry(&registry, &claims, id).await?;
    let submission = entry.session.retry_persistence().await?;
    Ok(submit_response(&entry.session, submission).await)
}

/// Focus/visibility loss reported by the page.
pub async fn report_signal(
    State(registry): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SignalRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = load_entry(&registry, &claims, id).await?;
    let outcome = entry.session.report_signal(payload.kind).await;
    Ok(command_response(&entry.session, outcome).await)
}

/// Visibility heartbeat; the integrity poll reads the last reported value.
pub async fn report_visibility(
    State(registry): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VisibilityRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = load_entry(&registry, &claims, id).await?;
    entry.visibility.set_hidden(payload.hidden);
    Ok(StatusCode::NO_CONTENT)
}

/// Dismisses the cheating warning.
pub async fn acknowledge_warning(
    State(registry): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let entry = load_entry(&registry, &claims, id).await?;
    let outcome = entry.session.acknowledge().await;
    Ok(command_response(&entry.session, outcome).await)
}

/// Unregisters the session and cancels its timers.
///
/// A running attempt is submitted first, so closing ends the attempt
/// instead of resetting it. A result that is not saved yet stays
/// registered for `/retry` (409).
pub async fn close_session(
    State(registry): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let entry = load_entry(&registry, &claims, id).await?;

    if entry.session.status().await == SessionStatus::InProgress {
        entry.session.submit(SubmitReason::Manual).await?;
    }
    if entry.session.status().await == SessionStatus::Submitting {
        return Err(AppError::Conflict(
            "Result is not saved yet; retry the submission first".to_string(),
        ));
    }

    registry.remove(id).await;
    Ok(StatusCode::NO_CONTENT)
}
