//! Coordination contracts between agents of one workflow type.
//!
//! Contracts are static configuration: which agent must start first, which
//! parent an agent must sit under, how long it may take, which agents must
//! have finished before it starts, and which fields its output must mention.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rules for a single named agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentContract {
    /// Must be the earliest-starting agent span of the run
    pub must_run_first: bool,
    /// Required name of the direct parent span
    pub must_have_parent: Option<String>,
    /// Duration ceiling in milliseconds
    pub max_duration_ms: Option<u64>,
    /// Agents that must have finished before this one starts
    pub must_run_after: Vec<String>,
    /// Terms the agent's output must mention
    pub required_output_fields: Vec<String>,
}

impl AgentContract {
    pub fn run_first(mut self) -> Self {
        self.must_run_first = true;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.must_have_parent = Some(parent.into());
        self
    }

    pub fn with_max_duration(mut self, max_duration_ms: u64) -> Self {
        self.max_duration_ms = Some(max_duration_ms);
        self
    }

    pub fn after<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.must_run_after = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_output_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// A rule shared by a group of agents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentGroupContract {
    pub agent_names: Vec<String>,
    pub must_have_parent: Option<String>,
}

/// All contracts of one workflow type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractTable {
    pub agents: BTreeMap<String, AgentContract>,
    pub groups: BTreeMap<String, AgentGroupContract>,
}

impl ContractTable {
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty() && self.groups.is_empty()
    }

    pub fn agent(mut self, name: impl Into<String>, contract: AgentContract) -> Self {
        self.agents.insert(name.into(), contract);
        self
    }

    pub fn group<I, S>(mut self, name: impl Into<String>, agent_names: I, parent: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.insert(
            name.into(),
            AgentGroupContract {
                agent_names: agent_names.into_iter().map(Into::into).collect(),
                must_have_parent: Some(parent.into()),
            },
        );
        self
    }

    /// Every `(agent name, required parent)` pair, from agent rules first and
    /// then group rules, without repeating an agent.
    pub fn parent_requirements(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        let agent_rules = self
            .agents
            .iter()
            .filter_map(|(name, c)| c.must_have_parent.as_deref().map(|p| (name.as_str(), p)));
        let group_rules = self.groups.values().flat_map(|group| {
            group
                .agent_names
                .iter()
                .filter_map(move |name| group.must_have_parent.as_deref().map(|p| (name.as_str(), p)))
        });

        for (name, parent) in agent_rules.chain(group_rules) {
            if !pairs.iter().any(|(seen, _)| *seen == name) {
                pairs.push((name, parent));
            }
        }
        pairs
    }

    /// Contracts of the social media workflow.
    pub fn social_media() -> Self {
        let writers = ["twitter_writer", "linkedin_writer", "instagram_writer", "facebook_writer"];
        ContractTable::default()
            .agent(
                "content_strategist",
                AgentContract::default()
                    .run_first()
                    .with_output_fields(["strategy", "target_audience", "tone"])
                    .with_max_duration(30_000),
            )
            .group("platform_writers", writers, "social_media_workflow")
            .agent(
                "hashtag_generator",
                AgentContract::default()
                    .after(writers)
                    .with_max_duration(15_000),
            )
    }

    /// Contracts of the faulty multi-agent test workflow.
    pub fn test_faulty_multiagent() -> Self {
        let parent = "faulty_analysis_workflow";
        ContractTable::default()
            .agent(
                "analyzer",
                AgentContract::default()
                    .run_first()
                    .with_parent(parent)
                    .with_max_duration(5_000),
            )
            .agent(
                "data_collector",
                AgentContract::default()
                    .with_parent(parent)
                    .with_max_duration(10_000),
            )
            .agent(
                "reporter",
                AgentContract::default()
                    .with_parent(parent)
                    .after(["analyzer", "data_collector"])
                    .with_max_duration(3_000),
            )
    }
}
