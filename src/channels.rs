//! Channel role inference from free-text channel labels.

use std::collections::BTreeMap;

use crate::types::{ChannelDescriptor, ChannelRole};

/// One classification rule: any of `patterns` found in the lower-cased
/// channel name assigns `role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRule {
    pub patterns: &'static [&'static str],
    pub role: ChannelRole,
}

impl ChannelRule {
    fn matches(&self, lowered: &str) -> bool {
        self.patterns.iter().any(|p| lowered.contains(p))
    }
}

/// Classification rules, tried top to bottom; the first match wins.
pub const CHANNEL_RULES: &[ChannelRule] = &[
    ChannelRule {
        patterns: &["eeg"],
        role: ChannelRole::Eeg,
    },
    ChannelRule {
        patterns: &["eog"],
        role: ChannelRole::Eog,
    },
    ChannelRule {
        patterns: &["ecg", "ekg"],
        role: ChannelRole::Ecg,
    },
    ChannelRule {
        patterns: &["lflex", "rflex", "chin"],
        role: ChannelRole::Emg,
    },
    ChannelRule {
        patterns: &["trigger"],
        role: ChannelRole::Stim,
    },
];

/// Infers the role of a channel from its name.
///
/// Matching is case-insensitive; channels no rule matches get `default`.
///
/// ```rust
/// use edf2bids::{classify, ChannelRole};
///
/// assert_eq!(classify("EEG-trigger", ChannelRole::Seeg), ChannelRole::Eeg);
/// assert_eq!(classify("TriggerA", ChannelRole::Seeg), ChannelRole::Stim);
/// assert_eq!(classify("LA1", ChannelRole::Seeg), ChannelRole::Seeg);
/// ```
pub fn classify(name: &str, default: ChannelRole) -> ChannelRole {
    let lowered = name.to_lowercase();
    CHANNEL_RULES
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map_or(default, |rule| rule.role)
}

/// Classifies every channel, preserving recording order.
pub fn classify_channels<S: AsRef<str>>(names: &[S], default: ChannelRole) -> Vec<ChannelDescriptor> {
    names
        .iter()
        .map(|name| ChannelDescriptor::new(name.as_ref(), classify(name.as_ref(), default)))
        .collect()
}

/// Number of channels per role.
pub fn role_counts(channels: &[ChannelDescriptor]) -> BTreeMap<ChannelRole, usize> {
    let mut counts = BTreeMap::new();
    for channel in channels {
        *counts.entry(channel.role()).or_insert(0) += 1;
    }
    counts
}
