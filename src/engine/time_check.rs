// src/engine/time_check.rs

//! Fired time check members re-enter the engine as traversal events.

use tracing::{debug, warn};

use crate::checker::{CheckMemberType, TimeCheckHandler, TimeCheckMember};
use crate::engine::{FlowEvent, FlowOperations};
use crate::errors::{FlowError, Result};
use crate::types::BoxFuture;

fn event_for(member: &TimeCheckMember) -> Option<FlowEvent> {
    match (member.check_member_type, &member.task_info_name) {
        (CheckMemberType::DagTimeoutCheck, _) => Some(FlowEvent::DagTimeout),
        (CheckMemberType::TaskTimeoutCheck, Some(task)) => {
            Some(FlowEvent::TaskTimeout { task: task.clone() })
        }
        (CheckMemberType::TaskWaitCheck, Some(task)) => Some(FlowEvent::TaskWait { task: task.clone() }),
        (_, None) => None,
    }
}

impl TimeCheckHandler for FlowOperations {
    fn handle(&self, member: TimeCheckMember) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let Some(event) = event_for(&member) else {
                warn!(execution_id = %member.execution_id, kind = ?member.check_member_type, "task check without task name dropped");
                return Ok(());
            };
            match self.handle_event(member.execution_id.clone(), event).await {
                Ok(_) => Ok(()),
                Err(FlowError::ExecutionNotFound(id)) => {
                    debug!(execution_id = %id, "time check for expired execution dropped");
                    Ok(())
                }
                Err(err) => Err(err),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::TaskCategory;

    #[test]
    fn members_map_to_events() {
        assert!(matches!(
            event_for(&TimeCheckMember::dag_timeout("e")),
            Some(FlowEvent::DagTimeout)
        ));
        assert!(matches!(
            event_for(&TimeCheckMember::task_wait("e", TaskCategory::Function, "A")),
            Some(FlowEvent::TaskWait { task }) if task == "A"
        ));
        let mut broken = TimeCheckMember::task_timeout("e", TaskCategory::Pass, "A");
        broken.task_info_name = None;
        assert!(event_for(&broken).is_none());
    }
}
