use metrics::counter;

/// Count a successful invitation operation, labelled by what it did.
pub fn record_invitation(operation: &'static str, action: &'static str) {
    counter!(
        "invitations_total",
        "operation" => operation,
        "action" => action
    )
    .increment(1);
}

pub fn record_invitation_failure(operation: &'static str, class: &'static str) {
    counter!(
        "invitation_failures_total",
        "operation" => operation,
        "class" => class
    )
    .increment(1);
}
