use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Error when parse a string as topic
#[derive(Debug, Snafu)]
#[snafu(
    display("unknown topic {name}, expect miners, alerts or system"),
    module(error),
    context(suffix(false))
)]
pub struct ParseTopicError {
    /// received name
    pub name: String,
}

/// Channel of updates the backend pushes once subscribed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// miner list and per-device stats
    Miners,
    /// triggered alerts
    Alerts,
    /// backend host status
    System,
}

impl Topic {
    /// every known topic
    pub const ALL: [Topic; 3] = [Topic::Miners, Topic::Alerts, Topic::System];

    /// wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Miners => "miners",
            Self::Alerts => "alerts",
            Self::System => "system",
        }
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = ParseTopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .with_context(|| error::ParseTopic { name: s })
    }
}

/// Topic to enabled flag, survives reconnects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SubscriptionSet {
    topics: BTreeMap<Topic, bool>,
}

impl SubscriptionSet {
    pub fn merge<I>(&mut self, patch: I)
    where
        I: IntoIterator<Item = (Topic, bool)>,
    {
        for (topic, enabled) in patch {
            log::trace!("Subscription {} set to {}", topic, enabled);
            self.topics.insert(topic, enabled);
        }
    }

    pub fn enabled(&self) -> Vec<Topic> {
        self.topics
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(topic, _)| *topic)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
