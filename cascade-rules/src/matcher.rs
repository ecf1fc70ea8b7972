use cascade_protocol::Event;
use serde_json::Value;
use tracing::debug;

use crate::rule::Rule;
use crate::store::RuleStore;

/// Flattens an event into the lookup context conditions and templates resolve
/// against: top-level attributes plus `payload.*` and `metadata.*` sub-paths.
pub fn event_context(event: &Event) -> Value {
    serde_json::to_value(event).unwrap_or(Value::Null)
}

/// Whether a single rule fires for the event, given a prebuilt context.
///
/// Evaluation is total, so a malformed condition simply fails to match; it
/// can never abort matching for the other rules of the batch.
pub fn rule_matches(rule: &Rule, event: &Event, context: &Value) -> bool {
    if !rule.is_active() || !rule.listens_to(&event.event_type) {
        return false;
    }
    rule.conditions.evaluate(context)
}

/// Selects the active rules of the event's tenant whose trigger set contains
/// the event type and whose condition tree evaluates true, in creation order.
pub fn matching_rules(store: &RuleStore, event: &Event) -> Vec<Rule> {
    let context = event_context(event);
    let candidates = store.active_rules(&event.tenant_id, &event.event_type);

    candidates
        .into_iter()
        .filter(|rule| {
            let matched = rule.conditions.evaluate(&context);
            debug!(rule_id = %rule.id, event_id = %event.id, matched, "evaluated rule");
            matched
        })
        .collect()
}

/// Candidate rules plus their match outcome, for audit records that cover
/// non-matching evaluations too.
pub fn evaluate_candidates(store: &RuleStore, event: &Event) -> Vec<(Rule, bool)> {
    let context = event_context(event);
    store
        .active_rules(&event.tenant_id, &event.event_type)
        .into_iter()
        .map(|rule| {
            let matched = rule.conditions.evaluate(&context);
            (rule, matched)
        })
        .collect()
}
