//! Task request: the validated entry point of the dispatch pipeline.

use serde::{Deserialize, Serialize};

use crate::domain::DispatchError;

/// Incoming request body for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub session_id: String,
    pub prompt: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub mcps: Vec<String>,
}

impl TaskRequest {
    /// Reject malformed requests before any task exists. Messages are the
    /// operator-facing strings the surrounding HTTP layer maps to 400s.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.session_id.trim().is_empty() || self.prompt.trim().is_empty() {
            return Err(DispatchError::Validation(
                "session_id 和 prompt 必填".to_string(),
            ));
        }
        if self.skills.is_empty() {
            return Err(DispatchError::Validation("必须选择 skills".to_string()));
        }
        if self.mcps.is_empty() {
            return Err(DispatchError::Validation("必须选择 mcps".to_string()));
        }
        Ok(())
    }
}

/// Defaults first, then the requested items, deduplicated keeping the first
/// occurrence of each.
pub fn merge_defaults(defaults: &[String], requested: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(defaults.len() + requested.len());
    for item in defaults.iter().chain(requested) {
        if !merged.contains(item) {
            merged.push(item.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn request() -> TaskRequest {
        TaskRequest {
            session_id: "s-1".into(),
            prompt: "做一份周报".into(),
            skills: vec!["ppt".into()],
            mcps: vec!["tapd".into()],
        }
    }

    #[test]
    fn well_formed_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[rstest]
    #[case::blank_session(TaskRequest { session_id: "  ".into(), ..request() }, "session_id 和 prompt 必填")]
    #[case::blank_prompt(TaskRequest { prompt: String::new(), ..request() }, "session_id 和 prompt 必填")]
    #[case::no_skills(TaskRequest { skills: vec![], ..request() }, "必须选择 skills")]
    #[case::no_mcps(TaskRequest { mcps: vec![], ..request() }, "必须选择 mcps")]
    fn malformed_requests_are_rejected(#[case] req: TaskRequest, #[case] message: &str) {
        let err = req.validate().unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        assert_eq!(err.to_string(), message);
    }

    #[test]
    fn merge_keeps_first_occurrence_order() {
        let defaults = vec!["ppt".to_string(), "excel".to_string()];
        let requested = vec!["zip".to_string(), "ppt".to_string()];
        assert_eq!(
            merge_defaults(&defaults, &requested),
            vec!["ppt".to_string(), "excel".to_string(), "zip".to_string()]
        );
    }

    #[test]
    fn skills_and_mcps_default_to_empty_on_deserialize() {
        let req: TaskRequest =
            serde_json::from_str(r#"{"session_id": "s-1", "prompt": "hi"}"#).unwrap();
        assert!(req.skills.is_empty());
        assert!(req.validate().is_err());
    }
}
