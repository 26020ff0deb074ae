#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use std::collections::HashMap;

use crate::model::DiscoveryEntryWithMetaInfo;

/// Picks one entry out of an already version-filtered, non-empty slice.
/// `FixedParticipant` is not handled here: it short-circuits arbitration
/// before this selection step runs, since the discovery lookup itself
/// already targets one participant.
pub fn select(
  strategy: crate::model::ArbitrationStrategy,
  custom_parameters: &HashMap<String, String>,
  entries: &[DiscoveryEntryWithMetaInfo],
) -> Option<DiscoveryEntryWithMetaInfo> {
  use crate::model::ArbitrationStrategy::*;
  match strategy {
    HighestPriority | NotSet => select_highest_priority(entries),
    Keyword => select_by_keyword(custom_parameters, entries),
    LocalOnly => select_local_only(entries),
    FixedParticipant => entries.first().cloned(),
  }
}

fn select_highest_priority(entries: &[DiscoveryEntryWithMetaInfo]) -> Option<DiscoveryEntryWithMetaInfo> {
  let mut best: Option<&DiscoveryEntryWithMetaInfo> = None;
  for entry in entries {
    if entry.provider_qos().priority < 0 {
      continue;
    }
    if best.is_none_or(|b| entry.provider_qos().priority > b.provider_qos().priority) {
      best = Some(entry);
    }
  }
  best.cloned()
}

fn select_by_keyword(
  custom_parameters: &HashMap<String, String>,
  entries: &[DiscoveryEntryWithMetaInfo],
) -> Option<DiscoveryEntryWithMetaInfo> {
  let keyword = custom_parameters.get("keyword")?;
  entries
    .iter()
    .find(|e| e.provider_qos().custom_parameter("keyword") == Some(keyword.as_str()))
    .cloned()
}

fn select_local_only(entries: &[DiscoveryEntryWithMetaInfo]) -> Option<DiscoveryEntryWithMetaInfo> {
  entries.iter().find(|e| e.is_local).cloned()
}

/// `"keyword"` custom parameter presence check performed at Arbitrator
/// construction time for `ArbitrationStrategy::Keyword`.
pub fn validate_strategy_construction(
  strategy: crate::model::ArbitrationStrategy,
  custom_parameters: &HashMap<String, String>,
) -> Result<(), String> {
  if strategy == crate::model::ArbitrationStrategy::Keyword && !custom_parameters.contains_key("keyword") {
    return Err("ArbitrationStrategy::Keyword requires a \"keyword\" custom parameter".to_owned());
  }
  if strategy == crate::model::ArbitrationStrategy::FixedParticipant
    && !custom_parameters.contains_key("fixedParticipantId")
  {
    return Err(
      "ArbitrationStrategy::FixedParticipant requires a \"fixedParticipantId\" custom parameter"
        .to_owned(),
    );
  }
  Ok(())
}
