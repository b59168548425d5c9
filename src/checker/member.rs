// src/checker/member.rs

use serde::{Deserialize, Serialize};

use crate::dag::TaskCategory;
use crate::errors::Result;

/// What a pending wait stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMemberType {
    DagTimeoutCheck,
    TaskTimeoutCheck,
    TaskWaitCheck,
}

/// One pending wait, stored JSON-encoded as a sorted-set member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeCheckMember {
    pub check_member_type: CheckMemberType,
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_category: Option<TaskCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_info_name: Option<String>,
}

impl TimeCheckMember {
    pub fn dag_timeout(execution_id: impl Into<String>) -> Self {
        Self {
            check_member_type: CheckMemberType::DagTimeoutCheck,
            execution_id: execution_id.into(),
            task_category: None,
            task_info_name: None,
        }
    }

    pub fn task_timeout(
        execution_id: impl Into<String>,
        category: TaskCategory,
        task_name: impl Into<String>,
    ) -> Self {
        Self {
            check_member_type: CheckMemberType::TaskTimeoutCheck,
            execution_id: execution_id.into(),
            task_category: Some(category),
            task_info_name: Some(task_name.into()),
        }
    }

    pub fn task_wait(
        execution_id: impl Into<String>,
        category: TaskCategory,
        task_name: impl Into<String>,
    ) -> Self {
        Self {
            check_member_type: CheckMemberType::TaskWaitCheck,
            execution_id: execution_id.into(),
            task_category: Some(category),
            task_info_name: Some(task_name.into()),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_stable_for_identical_members() {
        let a = TimeCheckMember::task_wait("e1", TaskCategory::Function, "A");
        let b = TimeCheckMember::task_wait("e1", TaskCategory::Function, "A");
        assert_eq!(a.encode().unwrap(), b.encode().unwrap());
        assert_eq!(TimeCheckMember::decode(&a.encode().unwrap()).unwrap(), a);
        assert!(a.encode().unwrap().contains("\"task_wait_check\""));
    }
}
