use std::fmt;

use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;

pub const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionResource {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        GroupVersionResource {
            group: group.to_owned(),
            version: version.to_owned(),
            resource: resource.to_owned(),
        }
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}

/// The `AdmissionReview` envelope sent by the API server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewRequest {
    pub api_version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub request: AdmissionRequest,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    #[serde(default)]
    pub kind: GroupVersionKind,
    #[serde(default)]
    pub resource: GroupVersionResource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<RawExtension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_object: Option<RawExtension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

/// The `AdmissionReview` envelope written back to the API server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    pub api_version: String,
    pub kind: String,
    pub response: AdmissionResponse,
}

impl AdmissionReviewResponse {
    /// Wraps `response` echoing the envelope version of the request.
    pub fn new(api_version: &str, response: AdmissionResponse) -> Self {
        AdmissionReviewResponse {
            api_version: api_version.to_owned(),
            kind: String::from(ADMISSION_REVIEW_KIND),
            response,
        }
    }
}

/// This models the admission/v1/AdmissionResponse object of Kubernetes,
/// limited to the fields a mutating webhook fills.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// Copied over from the corresponding AdmissionRequest.
    pub uid: String,

    pub allowed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,

    /// Base64 encoded RFC 6902 patch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,

    /// Only consulted by the API server when `allowed` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionResponseStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchType {
    #[serde(rename = "JSONPatch")]
    #[default]
    JSONPatch,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionResponseStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AdmissionResponse {
    pub fn allow(uid: String, patch: Option<String>) -> AdmissionResponse {
        let patch_type = patch.as_ref().map(|_| PatchType::JSONPatch);

        AdmissionResponse {
            uid,
            allowed: true,
            patch_type,
            patch,
            status: None,
        }
    }

    pub fn reject(uid: String, message: String) -> AdmissionResponse {
        AdmissionResponse {
            uid,
            allowed: false,
            status: Some(AdmissionResponseStatus {
                message: Some(message),
            }),
            ..Default::default()
        }
    }
}

/// Decodes the review envelope. Unknown fields are ignored, the envelope
/// version and the request uid are mandatory.
pub fn decode_review(bytes: &[u8]) -> Result<AdmissionReviewRequest, DecodeError> {
    let review: AdmissionReviewRequest = serde_json::from_slice(bytes)?;

    if review.api_version.is_empty() {
        return Err(DecodeError::MissingField("apiVersion"));
    }
    if review.request.uid.is_empty() {
        return Err(DecodeError::MissingField("request.uid"));
    }

    Ok(review)
}

/// Decodes the raw object embedded in `request`. Callers are expected to
/// compare the resource descriptor beforehand, a mismatch is refused here
/// without looking at the payload.
pub fn decode_resource<T: DeserializeOwned>(
    request: &AdmissionRequest,
    expected: &GroupVersionResource,
) -> Result<T, DecodeError> {
    if &request.resource != expected {
        return Err(DecodeError::KindMismatch {
            expected: expected.clone(),
            actual: request.resource.clone(),
        });
    }

    let raw = request.object.as_ref().ok_or(DecodeError::MissingObject)?;
    if raw.0.is_null() {
        return Err(DecodeError::MissingObject);
    }

    Ok(T::deserialize(&raw.0)?)
}

pub fn encode_review(review: &AdmissionReviewResponse) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(review)
}

pub fn decode_review_response(bytes: &[u8]) -> Result<AdmissionReviewResponse, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}
