use crate::CoreError;
use kestrel_schema::PodStatus;

/// Check a single edge of the lifecycle graph.
///
/// `NONE → INIT → READY → RUNNING → DONE`, plus an edge to `FAILED` from every
/// non-terminal state. `UNKNOWN` has no edges in or out.
pub fn validate_transition(from: PodStatus, to: PodStatus) -> Result<(), CoreError> {
    let valid = match from {
        PodStatus::None => matches!(to, PodStatus::Init | PodStatus::Failed),
        PodStatus::Init => matches!(to, PodStatus::Ready | PodStatus::Failed),
        PodStatus::Ready => matches!(to, PodStatus::Running | PodStatus::Failed),
        PodStatus::Running => matches!(to, PodStatus::Done | PodStatus::Failed),
        PodStatus::Done | PodStatus::Failed | PodStatus::Unknown => false,
    };

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition { from, to })
    }
}

/// Reject statuses that can never be requested as a reconciliation target.
pub fn validate_desired(desired: PodStatus) -> Result<(), CoreError> {
    match desired {
        PodStatus::Unknown => Err(CoreError::InvalidArgument(
            "UNKNOWN is not a valid desired status".to_owned(),
        )),
        PodStatus::Failed => Err(CoreError::InvalidArgument(
            "FAILED is entered on error only and cannot be requested".to_owned(),
        )),
        PodStatus::None
        | PodStatus::Init
        | PodStatus::Ready
        | PodStatus::Running
        | PodStatus::Done => Ok(()),
    }
}

/// The ordered states a pod passes through from `from` to `to`, excluding
/// `from` itself. Empty when the two are equal.
pub fn plan_path(from: PodStatus, to: PodStatus) -> Result<Vec<PodStatus>, CoreError> {
    if from == PodStatus::Unknown {
        return Err(CoreError::InvalidArgument(
            "current status UNKNOWN cannot be reconciled".to_owned(),
        ));
    }
    if from == to {
        return Ok(Vec::new());
    }
    validate_desired(to)?;
    if from.is_terminal() {
        return Err(CoreError::InvalidTransition { from, to });
    }

    let mut path = Vec::new();
    let mut cursor = from;
    while cursor != to {
        let Some(next) = cursor.successor() else {
            return Err(CoreError::InvalidTransition { from, to });
        };
        validate_transition(cursor, next)?;
        path.push(next);
        cursor = next;
    }
    Ok(path)
}
