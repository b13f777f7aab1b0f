use taskgrid_core::AgentRecord;

/// Choose the best eligible agent for a task.
///
/// An agent is eligible when it accepts work (Idle or Processing), sits
/// below its concurrency ceiling, and its capability set covers every
/// required tag. A `preferred` agent that passes eligibility wins outright,
/// skipping the load comparison. Otherwise candidates are ranked
/// least-loaded first, then fastest historical response, then highest
/// success rate, in that exact order.
pub fn select_agent(
    agents: &[AgentRecord],
    required_capabilities: &[String],
    preferred: Option<&str>,
) -> Option<String> {
    let eligible = |agent: &AgentRecord| {
        agent.status.can_accept_tasks()
            && agent.has_capacity()
            && agent.can_handle(required_capabilities)
    };

    if let Some(id) = preferred {
        if let Some(agent) = agents.iter().find(|a| a.id == id) {
            if eligible(agent) {
                return Some(agent.id.clone());
            }
        }
    }

    let mut candidates: Vec<&AgentRecord> = agents.iter().filter(|a| eligible(a)).collect();
    candidates.sort_by(|a, b| {
        a.load_percentage
            .total_cmp(&b.load_percentage)
            .then_with(|| {
                a.metrics
                    .average_response_time
                    .total_cmp(&b.metrics.average_response_time)
            })
            .then_with(|| b.metrics.success_rate.total_cmp(&a.metrics.success_rate))
    });
    candidates.first().map(|a| a.id.clone())
}
