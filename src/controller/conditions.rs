//! Status condition helpers

use crate::crd::{OpenLibertyApplicationStatus, StatusCondition, StatusConditionType};

pub fn get_condition(
    type_: StatusConditionType,
    status: &OpenLibertyApplicationStatus,
) -> Option<&StatusCondition> {
    status.conditions.iter().find(|c| c.type_ == type_)
}

/// Replace the condition of the same type, or append it.
pub fn set_condition(condition: StatusCondition, status: &mut OpenLibertyApplicationStatus) {
    match status
        .conditions
        .iter_mut()
        .find(|c| c.type_ == condition.type_)
    {
        Some(existing) => *existing = condition,
        None => status.conditions.push(condition),
    }
}

/// Record a condition, stamping the update time and keeping the previous
/// transition time when the status value did not change.
pub fn update_condition(
    status: &mut OpenLibertyApplicationStatus,
    type_: StatusConditionType,
    value: bool,
    reason: &str,
    message: &str,
) {
    let now = chrono::Utc::now().to_rfc3339();
    let value = if value { "True" } else { "False" }.to_string();

    let last_transition_time = match get_condition(type_, status) {
        Some(old) if old.status == value => old.last_transition_time.clone(),
        _ => Some(now.clone()),
    };

    set_condition(
        StatusCondition {
            type_,
            status: value,
            last_transition_time,
            last_update_time: Some(now),
            reason: (!reason.is_empty()).then(|| reason.to_string()),
            message: (!message.is_empty()).then(|| message.to_string()),
        },
        status,
    );
}
