//! Read-preference member selection against live donor topology.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RecipientConfig;
use crate::document::{ReadPreferenceMode, ReadPreferencePolicy};
use crate::donor::connection::DonorConnection;
use crate::donor::topology::{DonorCluster, MemberView, TopologyView};
use crate::error::MigrationError;

/// Resolve one live connection to a member satisfying `policy`.
///
/// Every attempt takes a fresh topology snapshot, so donor-side failover
/// during selection is transparent. Exhausting the selection timeout
/// yields [`MigrationError::Unsatisfiable`]; cancellation yields
/// [`MigrationError::Interrupted`].
pub async fn resolve_connection(
    cluster: &dyn DonorCluster,
    policy: &ReadPreferencePolicy,
    config: &RecipientConfig,
    cancel: &CancellationToken,
) -> Result<Box<dyn DonorConnection>, MigrationError> {
    let deadline = tokio::time::Instant::now() + config.donor_selection_timeout;
    loop {
        match cluster.topology().await {
            Ok(view) => {
                if let Some(address) = select_member(&view, policy) {
                    match cluster.connect(&address).await {
                        Ok(conn) => {
                            debug!(
                                member = %address,
                                preference = %policy.mode,
                                "selected donor member"
                            );
                            return Ok(conn);
                        }
                        // The member dropped between snapshot and connect;
                        // the next snapshot will see it.
                        Err(err) => debug!(member = %address, error = %err, "donor connect failed"),
                    }
                }
            }
            Err(err) => warn!(error = %err, "donor topology snapshot failed"),
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(MigrationError::Unsatisfiable {
                preference: policy.mode,
                timeout_ms: config.donor_selection_timeout.as_millis() as u64,
            });
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(MigrationError::Interrupted),
            _ = tokio::time::sleep(config.donor_selection_retry_interval) => {}
        }
    }
}

/// Pick the address of the first member satisfying `policy`, or none.
///
/// Tie-breaks are deliberate, not incidental: whenever more than one
/// member qualifies, the first qualifying member in topology order wins.
/// This makes secondary selection deterministic for a given snapshot.
pub fn select_member(view: &TopologyView, policy: &ReadPreferencePolicy) -> Option<String> {
    let qualifies = |member: &&MemberView| {
        member.reachable
            && policy
                .tags
                .iter()
                .all(|(key, value)| member.tags.get(key) == Some(value))
    };
    let primary = view.members.iter().filter(|m| m.is_primary).find(qualifies);
    let secondary = view.members.iter().filter(|m| !m.is_primary).find(qualifies);

    let selected = match policy.mode {
        ReadPreferenceMode::PrimaryOnly => primary,
        ReadPreferenceMode::SecondaryOnly => secondary,
        ReadPreferenceMode::PrimaryPreferred => primary.or(secondary),
        ReadPreferenceMode::SecondaryPreferred => secondary.or(primary),
        ReadPreferenceMode::Nearest => view.members.iter().find(qualifies),
    };
    selected.map(|member| member.address.clone())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use super::*;
    use crate::donor::mock::MockReplicaSet;

    fn member(address: &str, is_primary: bool, reachable: bool) -> MemberView {
        MemberView {
            address: address.to_string(),
            is_primary,
            reachable,
            tags: BTreeMap::new(),
        }
    }

    fn view(members: Vec<MemberView>) -> TopologyView {
        TopologyView {
            set_name: "donorSet".to_string(),
            members,
        }
    }

    #[test]
    fn primary_only_requires_the_primary() {
        let policy = ReadPreferencePolicy::new(ReadPreferenceMode::PrimaryOnly);
        let topo = view(vec![member("a", true, true), member("b", false, true)]);
        assert_eq!(select_member(&topo, &policy).as_deref(), Some("a"));

        let topo = view(vec![member("a", true, false), member("b", false, true)]);
        assert_eq!(select_member(&topo, &policy), None);
    }

    #[test]
    fn secondary_only_takes_first_secondary_in_topology_order() {
        let policy = ReadPreferencePolicy::new(ReadPreferenceMode::SecondaryOnly);
        let topo = view(vec![
            member("a", true, true),
            member("b", false, true),
            member("c", false, true),
        ]);
        assert_eq!(select_member(&topo, &policy).as_deref(), Some("b"));
    }

    #[test]
    fn primary_preferred_falls_back_to_a_secondary() {
        let policy = ReadPreferencePolicy::new(ReadPreferenceMode::PrimaryPreferred);
        let topo = view(vec![member("a", true, false), member("b", false, true)]);
        assert_eq!(select_member(&topo, &policy).as_deref(), Some("b"));

        let topo = view(vec![member("a", true, true), member("b", false, true)]);
        assert_eq!(select_member(&topo, &policy).as_deref(), Some("a"));
    }

    #[test]
    fn secondary_preferred_falls_back_to_the_primary() {
        let policy = ReadPreferencePolicy::new(ReadPreferenceMode::SecondaryPreferred);
        let topo = view(vec![member("a", true, true), member("b", false, false)]);
        assert_eq!(select_member(&topo, &policy).as_deref(), Some("a"));
    }

    #[test]
    fn nearest_takes_first_reachable_member() {
        let policy = ReadPreferencePolicy::new(ReadPreferenceMode::Nearest);
        let topo = view(vec![member("a", true, false), member("b", false, true)]);
        assert_eq!(select_member(&topo, &policy).as_deref(), Some("b"));
    }

    #[test]
    fn tag_constraints_filter_candidates() {
        let policy =
            ReadPreferencePolicy::new(ReadPreferenceMode::SecondaryOnly).with_tag("region", "east");
        let mut tagged = member("c", false, true);
        tagged.tags.insert("region".to_string(), "east".to_string());
        let topo = view(vec![
            member("a", true, true),
            member("b", false, true),
            tagged,
        ]);
        assert_eq!(select_member(&topo, &policy).as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn resolve_times_out_as_unsatisfiable() {
        let set = MockReplicaSet::new("donorSet", 2, true);
        set.kill(&set.hosts()[0]);
        let config = RecipientConfig {
            donor_selection_timeout: Duration::from_millis(100),
            donor_selection_retry_interval: Duration::from_millis(10),
            ..RecipientConfig::default()
        };
        let cancel = CancellationToken::new();
        let policy = ReadPreferencePolicy::new(ReadPreferenceMode::PrimaryOnly);

        let err = resolve_connection(&set, &policy, &config, &cancel)
            .await
            .err()
            .expect("no primary");
        assert!(matches!(err, MigrationError::Unsatisfiable { .. }));
    }

    #[tokio::test]
    async fn resolve_sees_donor_failover_between_attempts() {
        let set = MockReplicaSet::new("donorSet", 2, true);
        let hosts = set.hosts();
        set.kill(&hosts[0]);
        let config = RecipientConfig {
            donor_selection_timeout: Duration::from_secs(5),
            donor_selection_retry_interval: Duration::from_millis(10),
            ..RecipientConfig::default()
        };
        let cancel = CancellationToken::new();
        let policy = ReadPreferencePolicy::new(ReadPreferenceMode::PrimaryOnly);

        let staged = set.clone();
        let promote = hosts[1].clone();
        let staging = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            staged.step_up(&promote);
        });

        let conn = resolve_connection(&set, &policy, &config, &cancel)
            .await
            .expect("resolves after failover");
        assert_eq!(conn.server_address(), hosts[1]);
        staging.await.expect("staging task");
    }

    #[tokio::test]
    async fn resolve_honors_cancellation() {
        let set = MockReplicaSet::new("donorSet", 1, false);
        let config = RecipientConfig {
            donor_selection_timeout: Duration::from_secs(30),
            donor_selection_retry_interval: Duration::from_millis(10),
            ..RecipientConfig::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = ReadPreferencePolicy::new(ReadPreferenceMode::PrimaryOnly);

        let err = resolve_connection(&set, &policy, &config, &cancel)
            .await
            .err()
            .expect("cancelled");
        assert_eq!(err, MigrationError::Interrupted);
    }
}
