/// Execute an aggregate command deterministically (no IO).
///
/// Canonical event-sourced lifecycle in one step:
///
/// 1. **Decide**: `aggregate.handle(command)` produces events without mutation
/// 2. **Evolve**: each event is applied via `aggregate.apply(event)`
///
/// Useful for unit tests and inline processing. Production paths go through
/// the infra `CommandDispatcher`, which adds persistence, publication and
/// optimistic concurrency.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: shelf_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
