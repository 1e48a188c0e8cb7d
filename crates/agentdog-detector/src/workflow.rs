//! Workflow-type inference and the per-type registry.
//!
//! Each workflow type owns extra valid model identifiers (on top of a base
//! set shared by every workflow) and, optionally, a contract table. The
//! registry is immutable configuration; a run resolves against it once.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use agentdog_span::{SpanRecord, Trace};

use crate::contracts::ContractTable;

/// Fallback workflow type when nothing matches
pub const UNKNOWN_WORKFLOW: &str = "unknown";

/// Run-level metadata handed to the detector alongside the trace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub run_id: Option<String>,
    /// Explicit workflow type; skips inference when set
    pub workflow_type: Option<String>,
}

impl WorkflowMetadata {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            workflow_type: None,
        }
    }

    pub fn with_workflow_type(mut self, workflow_type: impl Into<String>) -> Self {
        self.workflow_type = Some(workflow_type.into());
        self
    }

    /// Split a stored workflow document into its trace and metadata.
    ///
    /// Returns `None` when the document carries no `detailed_trace` object.
    pub fn from_workflow_document(doc: &Value) -> Option<(Trace, WorkflowMetadata)> {
        let detailed = doc.get("detailed_trace").filter(|v| v.is_object())?;
        let trace: Trace = serde_json::from_value(detailed.clone()).ok()?;
        let metadata = WorkflowMetadata {
            run_id: doc
                .get("run_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| trace.run_id.clone()),
            workflow_type: None,
        };
        Some((trace, metadata))
    }
}

/// Registry entry for one workflow type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowProfile {
    pub name: String,
    /// Matched against the lowercased root span name
    pub root_keywords: Vec<String>,
    /// Matched against lowercased direct child names
    pub child_keywords: Vec<String>,
    /// Breaks ties when a child name matches several profiles; higher wins
    pub child_priority: i32,
    /// Models valid in addition to the base set
    pub models: BTreeSet<String>,
    pub contracts: Option<ContractTable>,
}

/// How the workflow type of a run was determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceSource {
    Explicit,
    RootName,
    RootMetadata,
    ChildName,
    Fallback,
}

/// Registry view resolved for one run
#[derive(Debug, Clone)]
pub struct ResolvedWorkflow<'a> {
    pub workflow_type: String,
    pub source: InferenceSource,
    pub valid_models: BTreeSet<String>,
    pub contracts: Option<&'a ContractTable>,
}

impl ResolvedWorkflow<'_> {
    pub fn is_valid_model(&self, model: &str) -> bool {
        self.valid_models.contains(model)
    }
}

/// Valid models and contracts per workflow type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowRegistry {
    pub base_models: BTreeSet<String>,
    /// Checked in order; the first matching profile wins
    pub profiles: Vec<WorkflowProfile>,
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        let set = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>();
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            base_models: set(&["claude-4-sonnet-20250514", "claude-sonnet-4", "gpt-4", "gpt-3.5-turbo"]),
            profiles: vec![
                WorkflowProfile {
                    name: "social_media".to_string(),
                    root_keywords: list(&["social_media"]),
                    child_keywords: list(&["twitter", "linkedin", "instagram", "facebook", "hashtag"]),
                    child_priority: 0,
                    models: BTreeSet::new(),
                    contracts: Some(ContractTable::social_media()),
                },
                WorkflowProfile {
                    name: "debate".to_string(),
                    root_keywords: list(&["debate"]),
                    child_keywords: list(&["research_agent", "debate_agent"]),
                    child_priority: 1,
                    models: set(&["sonar", "sonar-small-chat", "sonar-medium-chat", "sonar-pro"]),
                    contracts: None,
                },
                WorkflowProfile {
                    name: "test_faulty_multiagent".to_string(),
                    root_keywords: Vec::new(),
                    child_keywords: Vec::new(),
                    child_priority: 0,
                    models: BTreeSet::new(),
                    contracts: Some(ContractTable::test_faulty_multiagent()),
                },
            ],
        }
    }
}

impl WorkflowRegistry {
    pub fn profile(&self, name: &str) -> Option<&WorkflowProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Infer the workflow type of a trace rooted at `root`.
    ///
    /// Order: explicit type, root name keyword, root metadata
    /// `workflow_type`, direct child name keyword, then `unknown`.
    pub fn infer(&self, root: &SpanRecord, explicit: Option<&str>) -> (String, InferenceSource) {
        if let Some(explicit) = explicit.filter(|t| !t.is_empty()) {
            return (explicit.to_string(), InferenceSource::Explicit);
        }

        let root_name = root.name.to_lowercase();
        if let Some(profile) = self.first_match(&root_name, |p| &p.root_keywords) {
            return (profile.name.clone(), InferenceSource::RootName);
        }

        if let Some(declared) = root
            .metadata
            .get("workflow_type")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        {
            return (declared.to_string(), InferenceSource::RootMetadata);
        }

        for child in &root.children {
            let child_name = child.name.to_lowercase();
            let matched = self
                .matching(&child_name, |p| &p.child_keywords)
                .into_iter()
                .rev()
                .max_by_key(|p| p.child_priority);
            if let Some(profile) = matched {
                return (profile.name.clone(), InferenceSource::ChildName);
            }
        }

        (UNKNOWN_WORKFLOW.to_string(), InferenceSource::Fallback)
    }

    fn first_match<F>(&self, haystack: &str, keywords: F) -> Option<&WorkflowProfile>
    where
        F: Fn(&WorkflowProfile) -> &Vec<String>,
    {
        self.matching(haystack, keywords).into_iter().next()
    }

    /// Profiles with a keyword contained in `haystack`, in registry order
    fn matching<F>(&self, haystack: &str, keywords: F) -> Vec<&WorkflowProfile>
    where
        F: Fn(&WorkflowProfile) -> &Vec<String>,
    {
        self.profiles
            .iter()
            .filter(|profile| {
                keywords(profile)
                    .iter()
                    .any(|k| !k.is_empty() && haystack.contains(k.to_lowercase().as_str()))
            })
            .collect()
    }

    /// Resolve models and contracts for the given trace.
    pub fn resolve(&self, root: &SpanRecord, explicit: Option<&str>) -> ResolvedWorkflow<'_> {
        let (workflow_type, source) = self.infer(root, explicit);
        let profile = self.profile(&workflow_type);

        let mut valid_models = self.base_models.clone();
        if let Some(profile) = profile {
            valid_models.extend(profile.models.iter().cloned());
        }

        tracing::debug!(
            workflow_type = %workflow_type,
            source = ?source,
            known_profile = profile.is_some(),
            "Resolved workflow type"
        );

        ResolvedWorkflow {
            workflow_type,
            source,
            valid_models,
            contracts: profile
                .and_then(|p| p.contracts.as_ref())
                .filter(|c| !c.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdog_span::SpanType;
    use serde_json::json;

    fn root(name: &str, children: &[&str]) -> SpanRecord {
        let mut root = SpanRecord::new("root", name, SpanType::Root);
        root.children = children
            .iter()
            .map(|c| SpanRecord::new(*c, *c, SpanType::Agent))
            .collect();
        root
    }

    #[test]
    fn test_infer_from_root_name() {
        let registry = WorkflowRegistry::default();
        let (wf, source) = registry.infer(&root("Social_Media_Workflow", &[]), None);
        assert_eq!(wf, "social_media");
        assert_eq!(source, InferenceSource::RootName);
    }

    #[test]
    fn test_infer_from_root_metadata() {
        let registry = WorkflowRegistry::default();
        let mut root = root("faulty_analysis_workflow", &["analyzer"]);
        root.metadata
            .insert("workflow_type".to_string(), json!("test_faulty_multiagent"));
        let (wf, source) = registry.infer(&root, None);
        assert_eq!(wf, "test_faulty_multiagent");
        assert_eq!(source, InferenceSource::RootMetadata);
    }

    #[test]
    fn test_infer_from_child_names() {
        let registry = WorkflowRegistry::default();
        let (wf, _) = registry.infer(&root("workflow", &["planner", "research_agent_pro"]), None);
        assert_eq!(wf, "debate");

        let (wf, source) = registry.infer(&root("workflow", &["hashtag_generator"]), None);
        assert_eq!(wf, "social_media");
        assert_eq!(source, InferenceSource::ChildName);
    }

    #[test]
    fn test_child_priority_breaks_keyword_ties() {
        let registry = WorkflowRegistry::default();
        let (wf, source) = registry.infer(&root("workflow", &["twitter_research_agent"]), None);
        assert_eq!(wf, "debate");
        assert_eq!(source, InferenceSource::ChildName);

        // Root names keep registry order.
        let (wf, _) = registry.infer(&root("social_media_debate", &[]), None);
        assert_eq!(wf, "social_media");
    }

    #[test]
    fn test_infer_fallback_unknown() {
        let registry = WorkflowRegistry::default();
        let (wf, source) = registry.infer(&root("workflow", &["planner"]), None);
        assert_eq!(wf, UNKNOWN_WORKFLOW);
        assert_eq!(source, InferenceSource::Fallback);
    }

    #[test]
    fn test_explicit_type_wins() {
        let registry = WorkflowRegistry::default();
        let (wf, source) = registry.infer(&root("debate_workflow", &[]), Some("social_media"));
        assert_eq!(wf, "social_media");
        assert_eq!(source, InferenceSource::Explicit);
    }

    #[test]
    fn test_resolve_models_and_contracts() {
        let registry = WorkflowRegistry::default();

        let debate = registry.resolve(&root("debate_workflow", &[]), None);
        assert!(debate.is_valid_model("sonar-pro"));
        assert!(debate.is_valid_model("gpt-4"));
        assert!(debate.contracts.is_none());

        let social = registry.resolve(&root("social_media_workflow", &[]), None);
        assert!(!social.is_valid_model("sonar"));
        assert!(social.contracts.is_some());

        let unknown = registry.resolve(&root("workflow", &[]), None);
        assert_eq!(unknown.valid_models, registry.base_models);
        assert!(unknown.contracts.is_none());
    }

    #[test]
    fn test_from_workflow_document() {
        let doc = json!({
            "run_id": "run-42",
            "detailed_trace": {
                "trace": {"span_id": "r", "name": "workflow", "span_type": "root"}
            }
        });
        let (trace, metadata) = WorkflowMetadata::from_workflow_document(&doc).unwrap();
        assert_eq!(metadata.run_id.as_deref(), Some("run-42"));
        assert_eq!(trace.root().map(|r| r.name.as_str()), Some("workflow"));

        assert!(WorkflowMetadata::from_workflow_document(&json!({"run_id": "x"})).is_none());
    }
}
