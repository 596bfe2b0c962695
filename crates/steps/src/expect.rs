//! Expectation checking for customized Engine API calls.

use crate::StepError;
use baton_customizer::Expectation;
use baton_engine::EngineApiError;
use baton_types::{ForkchoiceResponse, PayloadStatus};

/// Checks a customized `engine_newPayload` response against `expectation`.
pub fn check_payload_expectation(
    expectation: &Expectation,
    client: &str,
    result: Result<PayloadStatus, EngineApiError>,
) -> Result<(), StepError> {
    if let Some(code) = expectation.error_code {
        return match result {
            Err(err) if err.code() == Some(code) => Ok(()),
            Err(err) => Err(StepError::expectation(format!(
                "{client}: expected error code {code}, got {err}"
            ))),
            Ok(status) => Err(StepError::expectation(format!(
                "{client}: expected error code {code}, got status {:?}",
                status.status
            ))),
        };
    }
    let status = result.map_err(|err| StepError::engine(client, err))?;
    match expectation.status {
        Some(expected) if status.status != expected => Err(StepError::expectation(format!(
            "{client}: expected status {expected:?}, got {:?} ({})",
            status.status,
            status.validation_error.as_deref().unwrap_or("no validation error")
        ))),
        _ => Ok(()),
    }
}

/// Checks a call that returns no payload status against `expectation`: a set
/// error code must be hit exactly, otherwise the call must simply succeed.
pub fn check_error_expectation<T>(
    expectation: &Expectation,
    client: &str,
    result: Result<T, EngineApiError>,
) -> Result<(), StepError> {
    if let Some(code) = expectation.error_code {
        return match result {
            Err(err) if err.code() == Some(code) => Ok(()),
            Err(err) => Err(StepError::expectation(format!(
                "{client}: expected error code {code}, got {err}"
            ))),
            Ok(_) => Err(StepError::expectation(format!(
                "{client}: expected error code {code}, call succeeded"
            ))),
        };
    }
    result.map(|_| ()).map_err(|err| StepError::engine(client, err))
}

/// Checks a customized `engine_forkchoiceUpdated` response against
/// `expectation`, applied to the head-block status.
pub fn check_forkchoice_expectation(
    expectation: &Expectation,
    client: &str,
    result: Result<ForkchoiceResponse, EngineApiError>,
) -> Result<(), StepError> {
    check_payload_expectation(expectation, client, result.map(|resp| resp.payload_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_types::PayloadStatusKind;

    #[test]
    fn error_code_must_match_exactly() {
        let expectation = Expectation::error(-38005);
        let hit = Err(EngineApiError::Rpc { code: -38005, message: "unsupported fork".into() });
        assert!(check_payload_expectation(&expectation, "c0", hit).is_ok());

        let miss = Err(EngineApiError::Rpc { code: -32602, message: "invalid params".into() });
        assert!(matches!(
            check_payload_expectation(&expectation, "c0", miss),
            Err(StepError::Expectation(_))
        ));

        let success = Ok(PayloadStatus::from_kind(PayloadStatusKind::Valid));
        assert!(check_payload_expectation(&expectation, "c0", success).is_err());
    }

    #[test]
    fn status_expectation_rejects_other_statuses() {
        let expectation = Expectation::invalid();
        let syncing = Ok(PayloadStatus::from_kind(PayloadStatusKind::Syncing));
        assert!(check_payload_expectation(&expectation, "c0", syncing).is_err());

        let invalid = Ok(PayloadStatus::from_kind(PayloadStatusKind::Invalid));
        assert!(check_payload_expectation(&expectation, "c0", invalid).is_ok());
    }

    #[test]
    fn empty_expectation_only_requires_success() {
        let expectation = Expectation::default();
        let accepted = Ok(PayloadStatus::from_kind(PayloadStatusKind::Accepted));
        assert!(check_payload_expectation(&expectation, "c0", accepted).is_ok());

        let failed: Result<PayloadStatus, _> = Err(EngineApiError::Timeout);
        assert!(matches!(
            check_payload_expectation(&expectation, "c0", failed),
            Err(StepError::Engine { .. })
        ));
    }
}
