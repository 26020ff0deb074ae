static_assertions::const_assert_eq!(b'/', 0x2f);

const PARTITION_SEPARATOR: char = '/';
const SINGLE_LEVEL_WILDCARD: char = '+';
const MULTI_LEVEL_WILDCARD: char = '*';

/// Builds the deterministic multicast id `providerParticipantId/
/// multicastName[/partition]*`.
pub fn build_id(provider_participant_id: &str, multicast_name: &str, partitions: &[String]) -> String {
  let mut id = format!("{provider_participant_id}{PARTITION_SEPARATOR}{multicast_name}");
  for partition in partitions {
    id.push(PARTITION_SEPARATOR);
    id.push_str(partition);
  }
  id
}

/// `true` if every partition segment is `[A-Za-z0-9_]+`, a single-level
/// wildcard `+`, or (only as the last segment) the multi-level wildcard
/// `*`.
pub fn validate_partitions(partitions: &[String]) -> Result<(), String> {
  for (index, partition) in partitions.iter().enumerate() {
    let is_last = index == partitions.len() - 1;
    if partition == "*" {
      if !is_last {
        return Err("multi-level wildcard '*' is only valid as the last partition".to_owned());
      }
      continue;
    }
    if partition == "+" {
      continue;
    }
    if partition.is_empty()
      || !partition.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
      return Err(format!("invalid partition segment: {partition:?}"));
    }
  }
  Ok(())
}

/// Matches a concrete multicast id published by a provider against a
/// (possibly wildcarded) subscription pattern built from the same
/// `provider_participant_id/multicast_name[/partition]*` shape.
pub fn matches(pattern: &str, published: &str) -> bool {
  let mut pattern_segments = pattern.split(PARTITION_SEPARATOR);
  let mut published_segments = published.split(PARTITION_SEPARATOR);

  loop {
    match (pattern_segments.next(), published_segments.next()) {
      (Some(p), _) if p.chars().all(|c| c == MULTI_LEVEL_WILDCARD) && p.len() == 1 => return true,
      (Some(p), Some(_)) if p.chars().all(|c| c == SINGLE_LEVEL_WILDCARD) && p.len() == 1 => continue,
      (Some(p), Some(a)) if p == a => continue,
      (Some(_), _) => return false,
      (None, None) => return true,
      (None, Some(_)) => return false,
    }
  }
}
