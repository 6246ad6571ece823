use std::any::Any;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{MatchedPath, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::task;
use tracing::{debug, error, info, warn, Span};

use crate::{
    admission_review::{
        decode_review, encode_review, AdmissionRequest, AdmissionResponse,
        AdmissionReviewResponse,
    },
    api::api_error::ApiError,
    errors::{self, AdmissionError, DecodeError},
    policy::AdmissionPolicy,
};

#[tracing::instrument(
    name = "admission",
    fields(
        path = path.as_str(),
        host = crate::config::HOSTNAME.as_str(),
        request_uid = tracing::field::Empty,
        name = tracing::field::Empty,
        namespace = tracing::field::Empty,
        operation = tracing::field::Empty,
        resource_group = tracing::field::Empty,
        resource_version = tracing::field::Empty,
        resource = tracing::field::Empty,
        allowed = tracing::field::Empty,
        mutated = tracing::field::Empty,
        response_message = tracing::field::Empty,
    ),
    skip_all)]
/// Evaluate one AdmissionReview against the policy bound to the route.
///
/// Denials are reported inside the AdmissionReview with a 200 status,
/// only unreadable requests and internal failures change the status code.
pub(crate) async fn admission_handler(
    State(policy): State<Arc<dyn AdmissionPolicy>>,
    path: MatchedPath,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let review = check_content_type(&headers)
        .and_then(|_| decode_review(&body))
        .map_err(|e| {
            warn!(error = %e, "rejecting malformed admission review");
            ApiError::from(e)
        })?;
    debug!(admission_review = ?review);

    populate_span_with_admission_request_data(&review.request);

    let api_version = review.api_version.clone();
    let span = Span::current();
    let response = task::spawn_blocking(move || {
        let _enter = span.enter();
        evaluate(policy.as_ref(), &review.request)
    })
    .await
    .map_err(|e| {
        error!(error = %e, "admission request evaluation aborted");
        ApiError::internal_server_error()
    })?
    .map_err(|e| {
        error!(error = %e, "admission request evaluation failed");
        ApiError::internal_server_error()
    })?;

    populate_span_with_admission_results(&response);

    let body = encode_review(&AdmissionReviewResponse::new(&api_version, response))
        .map_err(|e| {
            error!(error = %e, "cannot encode admission review response");
            ApiError::internal_server_error()
        })?;

    Ok((
        [(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())],
        body,
    )
        .into_response())
}

/// Turns the outcome of the policy into an AdmissionResponse. Only
/// failures that must not reach the API server are returned as errors.
fn evaluate(
    policy: &dyn AdmissionPolicy,
    request: &AdmissionRequest,
) -> errors::Result<AdmissionResponse> {
    match policy.admit(request) {
        Ok(patch) => {
            let encoded_patch = patch
                .encode()
                .map_err(|e| AdmissionError::Internal(format!("cannot encode patch: {e}")))?;
            Ok(AdmissionResponse::allow(request.uid.clone(), encoded_patch))
        }
        Err(AdmissionError::Policy(e)) => {
            info!(reason = e.message(), "admission request denied");
            Ok(AdmissionResponse::reject(request.uid.clone(), e.to_string()))
        }
        Err(e) => Err(e),
    }
}

/// Answers a panic escaping a handler with the same body as any other
/// internal failure.
pub(crate) fn handle_panic(_panic: Box<dyn Any + Send + 'static>) -> Response {
    error!("request handler panicked");
    ApiError::internal_server_error().into_response()
}

pub(crate) async fn readiness_handler() -> StatusCode {
    StatusCode::OK
}

fn check_content_type(headers: &HeaderMap) -> Result<(), DecodeError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let is_json = content_type
        .parse::<mime::Mime>()
        .map(|parsed| parsed.essence_str() == mime::APPLICATION_JSON.essence_str())
        .unwrap_or(false);

    if is_json {
        Ok(())
    } else {
        Err(DecodeError::UnsupportedContentType(content_type.to_owned()))
    }
}

fn populate_span_with_admission_request_data(adm_req: &AdmissionRequest) {
    let span = Span::current();
    span.record("request_uid", adm_req.uid.as_str());
    span.record("name", adm_req.name.as_deref().unwrap_or_default());
    span.record("namespace", adm_req.namespace.as_deref().unwrap_or_default());
    span.record("operation", adm_req.operation.as_str());
    span.record("resource_group", adm_req.resource.group.as_str());
    span.record("resource_version", adm_req.resource.version.as_str());
    span.record("resource", adm_req.resource.resource.as_str());
}

fn populate_span_with_admission_results(response: &AdmissionResponse) {
    let span = Span::current();
    span.record("allowed", response.allowed);
    span.record("mutated", response.patch.is_some());
    if let Some(message) = response
        .status
        .as_ref()
        .and_then(|status| status.message.as_deref())
    {
        span.record("response_message", message);
    }
}
