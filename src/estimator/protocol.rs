//! Request/response payloads crossing the worker boundary.
//!
//! One request, one response, each serialized as a single JSON line. Frames
//! never travel in the payload; the worker resolves exposure ids through its
//! own [`FrameStore`].

use crate::estimator::model::{estimate_pair, DonutModel};
use crate::estimator::EstimatorOptions;
use align_core::frame::FrameStore;
use align_core::types::{AberrationEstimate, ExposureRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateRequest {
    pub request_id: Uuid,
    pub intra: ExposureRecord,
    pub extra: ExposureRecord,
    pub options: EstimatorOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateResponse {
    pub request_id: Uuid,
    pub result: WorkerResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerResult {
    Estimate(AberrationEstimate),
    Error { reason: String },
}

impl EstimateResponse {
    pub fn error(request_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            request_id,
            result: WorkerResult::Error {
                reason: reason.into(),
            },
        }
    }
}

/// Worker side of a request: load both frames and run the refined model.
///
/// Blocking; run it on a blocking thread.
pub fn handle_request(request: &EstimateRequest, store: &dyn FrameStore) -> EstimateResponse {
    let frames = store
        .load(request.intra.exposure_id)
        .and_then(|intra| Ok((intra, store.load(request.extra.exposure_id)?)));
    let result = match frames {
        Err(e) => WorkerResult::Error {
            reason: format!("{:#}", e),
        },
        Ok((intra, extra)) => match estimate_pair(
            (&request.intra, &intra),
            (&request.extra, &extra),
            &request.options,
            DonutModel::Refined,
        ) {
            Ok(estimate) => WorkerResult::Estimate(estimate),
            Err(reason) => WorkerResult::Error { reason },
        },
    };
    EstimateResponse {
        request_id: request.request_id,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::frame::MemoryFrameStore;
    use align_core::types::ExposureKind;
    use chrono::Utc;

    fn record(kind: ExposureKind, id: u64) -> ExposureRecord {
        ExposureRecord {
            exposure_id: id,
            kind,
            group_id: "g".into(),
            focus_offset: 0.8,
            boresight_angle: 90.0,
            exposure_time: 30.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn error_response_wire_format() {
        let id = Uuid::nil();
        let line = serde_json::to_string(&EstimateResponse::error(id, "no source")).unwrap();
        assert_eq!(
            line,
            r#"{"request_id":"00000000-0000-0000-0000-000000000000","result":{"status":"error","reason":"no source"}}"#
        );
    }

    #[test]
    fn request_survives_json_line() {
        let request = EstimateRequest {
            request_id: Uuid::new_v4(),
            intra: record(ExposureKind::Intra, 11),
            extra: record(ExposureKind::Extra, 12),
            options: EstimatorOptions::default(),
        };
        let line = serde_json::to_string(&request).unwrap();
        assert!(!line.contains('\n'));
        let back: EstimateRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn missing_frame_becomes_error_response() {
        let store = MemoryFrameStore::new();
        let request = EstimateRequest {
            request_id: Uuid::new_v4(),
            intra: record(ExposureKind::Intra, 11),
            extra: record(ExposureKind::Extra, 12),
            options: EstimatorOptions::default(),
        };
        let response = handle_request(&request, &store);
        assert_eq!(response.request_id, request.request_id);
        match response.result {
            WorkerResult::Error { reason } => assert!(reason.contains("exposure 11")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
