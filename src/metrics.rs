use tracing::trace;

// Trace-based counters; a subscriber with `market.metrics=trace` picks them up.

pub fn inc_command(command: &'static str) {
    trace!(
        target = "market.metrics",
        command = command,
        "commands_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "market.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn ai_call(operation: &'static str, ok: bool) {
    trace!(
        target = "market.metrics",
        operation = operation,
        ok = ok,
        "ai_calls_total_inc"
    );
}
