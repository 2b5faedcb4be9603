use super::Sandbox;
use crate::error::Result;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

impl Sandbox {
    /// Union of the tags declared by every analysis machine
    ///
    /// `Ok(None)` means the machine listing did not have the expected shape, which is
    /// different from `Ok(Some(empty))`: machines exist but none is tagged.
    pub async fn all_valid_tags(&self) -> Result<Option<BTreeSet<String>>> {
        let machines = self.client.machines_list().await?;
        let tags = collect_tags(&machines);
        match &tags {
            Some(tags) => debug!(count = tags.len(), "collected machine tags"),
            None => warn!("machine listing carries no data field"),
        }
        Ok(tags)
    }
}

/// Collect the tags of every machine in a `/machines/list/` response
///
/// Machines without a `tags` list contribute nothing; non-string tags are ignored.
///
/// # Examples
///
/// ```
/// use cuckoo_dl::sandbox::collect_tags;
/// use serde_json::json;
///
/// let listing = json!({"data": [{"tags": ["x", "y"]}, {"tags": ["y", "z"]}, {}]});
/// let tags = collect_tags(&listing).unwrap();
/// assert_eq!(tags.into_iter().collect::<Vec<_>>(), ["x", "y", "z"]);
///
/// assert!(collect_tags(&json!({"machines": []})).is_none());
/// ```
pub fn collect_tags(machines: &Value) -> Option<BTreeSet<String>> {
    let machines = machines.get("data")?.as_array()?;

    Some(
        machines
            .iter()
            .filter_map(|machine| machine.get("tags").and_then(Value::as_array))
            .flatten()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
    )
}
