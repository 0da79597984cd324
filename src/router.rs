//! Routing: matches a `FileEvent` against configured rules and resolves the
//! concrete destination plans to write to.
//!
//! First-match-wins, as configured (spec §6 `Routing.Rules[]`): the first
//! rule whose `match` clause accepts the event supplies its destinations.

use crate::config::{
    DestinationOptions, FailurePolicy, FileDestinationConfig, RemoteProtocolOrLocal,
    RoutingRuleConfig,
};
use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::{DestinationPlan, FileEvent, Protocol, WriteOptions};

pub struct Router<'a> {
    rules: &'a [RoutingRuleConfig],
    destinations: &'a [FileDestinationConfig],
}

impl<'a> Router<'a> {
    pub fn new(rules: &'a [RoutingRuleConfig], destinations: &'a [FileDestinationConfig]) -> Self {
        Self { rules, destinations }
    }

    /// Resolve the destination plans and failure policy for `event`.
    /// Returns `Ok(None)` when no rule matches (recovered locally: the event
    /// is acked with no destinations written).
    pub fn route(
        &self,
        event: &FileEvent,
    ) -> FileHorizonResult<Option<(Vec<DestinationPlan>, FailurePolicy)>> {
        let Some(rule) = self.rules.iter().find(|rule| matches(rule, event)) else {
            return Ok(None);
        };

        let mut plans = Vec::with_capacity(rule.destinations.len());
        for name in &rule.destinations {
            let destination = self
                .destinations
                .iter()
                .find(|d| &d.name == name)
                .ok_or_else(|| FileHorizonError::Configuration {
                    field: "Routing.Rules[].Destinations".to_string(),
                    message: format!("unknown destination '{name}'"),
                })?;
            plans.push(build_plan(destination, event));
        }

        Ok(Some((plans, rule.failure_policy)))
    }
}

fn matches(rule: &crate::config::RoutingRuleConfig, event: &FileEvent) -> bool {
    let m = &rule.r#match;

    if let Some(protocol) = m.protocol {
        if !protocol_matches(protocol, event.protocol) {
            return false;
        }
    }

    if let Some(source_name) = &m.source_name {
        if event.source_name.as_deref() != Some(source_name.as_str()) {
            return false;
        }
    }

    if let Some(pattern) = &m.path_pattern {
        if !glob_match(pattern, &event.metadata.source_path) {
            return false;
        }
    }

    true
}

fn protocol_matches(rule_protocol: RemoteProtocolOrLocal, event_protocol: Protocol) -> bool {
    matches!(
        (rule_protocol, event_protocol),
        (RemoteProtocolOrLocal::Local, Protocol::Local)
            | (RemoteProtocolOrLocal::Ftp, Protocol::Ftp)
            | (RemoteProtocolOrLocal::Sftp, Protocol::Sftp)
    )
}

/// Minimal `*`-only glob matcher, sufficient for path suffix/extension
/// filters like `*.csv` or `/incoming/*`.
pub(crate) fn glob_match(pattern: &str, candidate: &str) -> bool {
    let Some((prefix, suffix)) = pattern.split_once('*') else {
        return pattern == candidate;
    };
    candidate.starts_with(prefix) && candidate.ends_with(suffix)
}

fn build_plan(destination: &FileDestinationConfig, event: &FileEvent) -> DestinationPlan {
    let file_name = std::path::Path::new(&event.metadata.source_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| event.metadata.source_path.clone());

    let target_path = render_target(destination, &file_name);

    DestinationPlan {
        destination_name: destination.name.clone(),
        target_path,
        write_options: write_options_from(&destination.options),
    }
}

fn render_target(destination: &FileDestinationConfig, file_name: &str) -> String {
    let rendered_name = destination
        .options
        .rename_pattern
        .as_ref()
        .map(|pattern| pattern.replace("{name}", file_name))
        .unwrap_or_else(|| file_name.to_string());
    format!("{}/{}", destination.target.trim_end_matches('/'), rendered_name)
}

fn write_options_from(options: &DestinationOptions) -> WriteOptions {
    WriteOptions {
        overwrite: options.overwrite,
        compute_hash: false,
        rename_pattern: options.rename_pattern.clone(),
    }
}
