//! Match rules that classify remote shell output.
//!
//! A [`MatchRules`] set is compiled once per client and reused for every pass
//! of every batch. Prompt rules are regexes tested against the pending output;
//! the end-of-stream and timeout rules fire on transport events instead of on
//! data. When several prompt rules match the same text, the one declared first
//! wins.

use std::time::Duration;

use log::trace;
use regex::{Regex, RegexSet};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::error::ShellError;

/// What the automaton does after a prompt rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchAction {
    /// Append the matched text and keep draining until the stream goes idle.
    Rearm,
    /// Append the matched text and end the pass immediately.
    Finish,
}

/// One ordered rule of the prompt-matching automaton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchRule {
    /// Output matched a prompt regex.
    Prompt { pattern: String, action: MatchAction },
    /// The remote side closed the stream.
    EndOfStream,
    /// No output arrived within `duration_ms`.
    Timeout { duration_ms: u64 },
}

/// A prompt match found in pending output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptHit {
    /// Index of the rule in declaration order.
    pub rule: usize,
    /// Byte offset just past the end of the match.
    pub end: usize,
    pub action: MatchAction,
}

/// Compiled, immutable set of match rules.
#[derive(Debug, Clone)]
pub struct MatchRules {
    rules: Vec<MatchRule>,
    prompt_set: RegexSet,
    prompt_regexes: Vec<Regex>,
    /// Maps a prompt regex index to its rule index and action.
    prompt_index_map: Vec<(usize, MatchAction)>,
    idle_timeout: Duration,
    error_set: Option<RegexSet>,
}

impl MatchRules {
    /// Compiles an explicit rule list.
    ///
    /// At least one prompt rule is required. Without a timeout rule the idle
    /// window defaults to one second; without an end-of-stream rule a closed
    /// stream still ends the pass.
    pub fn new<I, S>(rules: Vec<MatchRule>, error_patterns: I) -> Result<Self, ShellError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns = Vec::new();
        let mut prompt_index_map = Vec::new();
        let mut idle_timeout = None;

        for (idx, rule) in rules.iter().enumerate() {
            match rule {
                MatchRule::Prompt { pattern, action } => {
                    patterns.push(pattern.clone());
                    prompt_index_map.push((idx, *action));
                }
                MatchRule::Timeout { duration_ms } => {
                    if *duration_ms == 0 {
                        return Err(ShellError::InvalidRuleConfig(
                            "timeout rule duration must be positive".to_string(),
                        ));
                    }
                    if idle_timeout.is_some() {
                        return Err(ShellError::InvalidRuleConfig(
                            "more than one timeout rule".to_string(),
                        ));
                    }
                    idle_timeout = Some(Duration::from_millis(*duration_ms));
                }
                MatchRule::EndOfStream => {}
            }
        }

        if patterns.is_empty() {
            return Err(ShellError::InvalidRuleConfig(
                "at least one prompt pattern is required".to_string(),
            ));
        }

        let prompt_set = RegexSet::new(&patterns).map_err(|err| {
            ShellError::InvalidRuleConfig(format!("failed to build prompt regex set: {err}"))
        })?;
        let prompt_regexes = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|err| {
                    ShellError::InvalidRuleConfig(format!("invalid prompt regex '{p}': {err}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(re) = prompt_regexes.iter().find(|re| re.is_match("")) {
            return Err(ShellError::InvalidRuleConfig(format!(
                "prompt regex '{}' matches empty text",
                re.as_str()
            )));
        }

        let mut error_iter = error_patterns.into_iter().peekable();
        let error_set = if error_iter.peek().is_none() {
            None
        } else {
            Some(RegexSet::new(error_iter).map_err(|err| {
                ShellError::InvalidRuleConfig(format!("invalid error regex set: {err}"))
            })?)
        };

        Ok(Self {
            rules,
            prompt_set,
            prompt_regexes,
            prompt_index_map,
            idle_timeout: idle_timeout.unwrap_or(Duration::from_millis(1_000)),
            error_set,
        })
    }

    /// Builds the standard rule list from a client configuration:
    /// every prompt pattern in order, then end-of-stream, then the timeout.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ShellError> {
        let action = if config.rearm_on_prompt {
            MatchAction::Rearm
        } else {
            MatchAction::Finish
        };
        let mut rules: Vec<MatchRule> = config
            .prompt_patterns
            .iter()
            .map(|pattern| MatchRule::Prompt {
                pattern: pattern.clone(),
                action,
            })
            .collect();
        rules.push(MatchRule::EndOfStream);
        rules.push(MatchRule::Timeout {
            duration_ms: config.pass_timeout_ms,
        });
        Self::new(rules, &config.error_patterns)
    }

    /// The rules in declaration order.
    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    /// Idle window after which the timeout rule fires.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Finds the highest-priority prompt rule matching `text`.
    ///
    /// Zero-length matches (from anchors such as `\b`) never count as a prompt.
    pub fn find_prompt(&self, text: &str) -> Option<PromptHit> {
        // RegexSet yields matches in ascending pattern order, which is rule order.
        for idx in self.prompt_set.matches(text).into_iter() {
            let Some(re) = self.prompt_regexes.get(idx) else {
                continue;
            };
            let Some(found) = re.find_iter(text).find(|m| !m.is_empty()) else {
                continue;
            };
            let (rule, action) = self.prompt_index_map.get(idx).copied()?;
            trace!("Prompt rule {} matched {:?}", rule, found.as_str());
            return Some(PromptHit {
                rule,
                end: found.end(),
                action,
            });
        }
        None
    }

    /// Returns the first line of `text` matching an error pattern.
    pub fn find_error<'a>(&self, text: &'a str) -> Option<&'a str> {
        let set = self.error_set.as_ref()?;
        text.lines().find(|line| set.is_match(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(pattern: &str) -> MatchRule {
        MatchRule::Prompt {
            pattern: pattern.to_string(),
            action: MatchAction::Rearm,
        }
    }

    #[test]
    fn earlier_rule_wins_when_both_match() {
        let rules = MatchRules::new(
            vec![prompt(r"host#"), prompt(r"#"), MatchRule::EndOfStream],
            Vec::<&str>::new(),
        )
        .expect("rules should compile");

        let hit = rules.find_prompt("a # b host# ").expect("should match");
        assert_eq!(hit.rule, 0);
        assert_eq!(hit.end, "a # b host#".len());
    }

    #[test]
    fn no_prompt_in_text_yields_none() {
        let rules = MatchRules::from_config(&ClientConfig::default()).expect("defaults compile");
        assert_eq!(rules.find_prompt("Last login: Mon\r\n"), None);
    }

    #[test]
    fn default_rules_end_with_eof_then_timeout() {
        let rules = MatchRules::from_config(&ClientConfig::default()).expect("defaults compile");
        let tail = &rules.rules()[rules.rules().len() - 2..];
        assert_eq!(tail[0], MatchRule::EndOfStream);
        assert_eq!(tail[1], MatchRule::Timeout { duration_ms: 1000 });
        assert_eq!(rules.idle_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn finish_action_is_reported_on_hit() {
        let config = ClientConfig {
            rearm_on_prompt: false,
            ..ClientConfig::default()
        };
        let rules = MatchRules::from_config(&config).expect("rules compile");
        let hit = rules.find_prompt("root@box:~# ").expect("prompt should match");
        assert_eq!(hit.action, MatchAction::Finish);
    }

    #[test]
    fn rules_without_prompt_are_rejected() {
        let err = MatchRules::new(vec![MatchRule::EndOfStream], Vec::<&str>::new())
            .expect_err("no prompt rule");
        assert!(matches!(err, ShellError::InvalidRuleConfig(_)));
    }

    #[test]
    fn invalid_prompt_regex_is_rejected() {
        let err = MatchRules::new(vec![prompt("[")], Vec::<&str>::new())
            .expect_err("invalid regex");
        match err {
            ShellError::InvalidRuleConfig(msg) => {
                assert!(msg.contains("failed to build prompt regex set"))
            }
            other => panic!("unexpected error type: {other}"),
        }
    }

    #[test]
    fn prompt_regex_matching_empty_text_is_rejected() {
        for pattern in ["$", "#*", ">?", "(?m)^"] {
            let err = MatchRules::new(vec![prompt(pattern)], Vec::<&str>::new())
                .expect_err("empty-matching prompt");
            match err {
                ShellError::InvalidRuleConfig(msg) => {
                    assert!(msg.contains("matches empty text"), "{pattern}: {msg}")
                }
                other => panic!("unexpected error type: {other}"),
            }
        }
        MatchRules::new(vec![prompt(r"/$"), prompt(r"\$ $")], Vec::<&str>::new())
            .expect("anchored prompts with content compile");
    }

    #[test]
    fn zero_length_hits_fall_through_to_later_rules() {
        let rules = MatchRules::new(
            vec![prompt(r"\b"), prompt(r"host# ")],
            Vec::<&str>::new(),
        )
        .expect("rules compile");

        let hit = rules.find_prompt("host# ").expect("second rule should match");
        assert_eq!(hit.rule, 1);
        assert_eq!(hit.end, "host# ".len());
        assert_eq!(rules.find_prompt("uptime"), None);
    }

    #[test]
    fn error_patterns_report_offending_line() {
        let rules = MatchRules::new(
            vec![prompt("#")],
            ["could not acquire the config lock"],
        )
        .expect("rules compile");

        let text = "commit\nerror: could not acquire the config lock \nhost#";
        assert_eq!(
            rules.find_error(text),
            Some("error: could not acquire the config lock ")
        );
        assert_eq!(rules.find_error("commit complete\nhost#"), None);
    }
}
