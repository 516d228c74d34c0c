//! Run interception policy
//!
//! The host hands every "run" intent to this policy, which decides whether
//! the run stays on the host, goes to the remote service, or needs the
//! user to pick.

use serde::{Deserialize, Serialize};

/// Host-side setting controlling interception
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueInterceptMode {
    /// Ask unless the user opted out
    #[default]
    #[serde(rename = "none")]
    Auto,
    /// Always ask
    #[serde(rename = "intercept")]
    Intercept,
    /// Never intercept
    #[serde(rename = "no_intercept")]
    NoIntercept,
}

/// Where a run intent goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunRoute {
    RunOnHost,
    RunRemote,
    AskUser,
}

/// Answer to the "run remotely?" prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserChoice {
    Host,
    Remote,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterceptPolicy {
    pub mode: QueueInterceptMode,
    /// User ticked "don't ask again"
    pub disabled: bool,
}

impl InterceptPolicy {
    pub fn new(mode: QueueInterceptMode, disabled: bool) -> Self {
        Self { mode, disabled }
    }

    /// Route a run intent
    pub fn decide(&self) -> RunRoute {
        match self.mode {
            QueueInterceptMode::NoIntercept => RunRoute::RunOnHost,
            QueueInterceptMode::Intercept => RunRoute::AskUser,
            QueueInterceptMode::Auto if self.disabled => RunRoute::RunOnHost,
            QueueInterceptMode::Auto => RunRoute::AskUser,
        }
    }

    /// Route after the user answered the prompt
    ///
    /// `dont_ask_again` disables future prompts whichever way the user chose.
    pub fn resolve(&mut self, choice: UserChoice, dont_ask_again: bool) -> RunRoute {
        if dont_ask_again {
            log::info!("Run interception disabled by user");
            self.disabled = true;
        }
        match choice {
            UserChoice::Host => RunRoute::RunOnHost,
            UserChoice::Remote => RunRoute::RunRemote,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide() {
        use QueueInterceptMode::*;

        assert_eq!(InterceptPolicy::new(NoIntercept, false).decide(), RunRoute::RunOnHost);
        assert_eq!(InterceptPolicy::new(Intercept, true).decide(), RunRoute::AskUser);
        assert_eq!(InterceptPolicy::new(Auto, false).decide(), RunRoute::AskUser);
        assert_eq!(InterceptPolicy::new(Auto, true).decide(), RunRoute::RunOnHost);
    }

    #[test]
    fn test_resolve_remembers_opt_out() {
        let mut policy = InterceptPolicy::default();
        assert_eq!(policy.resolve(UserChoice::Remote, false), RunRoute::RunRemote);
        assert!(!policy.disabled);

        assert_eq!(policy.resolve(UserChoice::Remote, true), RunRoute::RunRemote);
        assert!(policy.disabled);
        assert_eq!(policy.decide(), RunRoute::RunOnHost);
    }

    #[test]
    fn test_mode_wire_names() {
        assert_eq!(serde_json::to_string(&QueueInterceptMode::Auto).unwrap(), "\"none\"");
        let mode: QueueInterceptMode = serde_json::from_str("\"no_intercept\"").unwrap();
        assert_eq!(mode, QueueInterceptMode::NoIntercept);
    }
}
