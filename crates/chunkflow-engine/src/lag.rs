//! Replica discovery and lag polling.
//!
//! The monitor discovers replicas from the source server once at startup,
//! then polls each one for replication lag. A replica whose poll fails is
//! excluded for the rest of the run. When every replica has been excluded
//! the last known maximum is retained so the writer stays throttled rather
//! than sprinting unobserved.

use tracing::{debug, info, warn};

use crate::db::{ReplicaProbe, ReplicaTopology};
use crate::error::EngineError;

/// Statement vocabulary for talking to a server about replication.
///
/// MySQL 8.0.22 renamed the replication SHOW statements and the lag column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    /// Modern wording, MySQL 8.0.22 and later.
    Replica,
    /// Legacy wording.
    Slave,
}

impl Vocabulary {
    /// The statement listing replicas on a source.
    pub fn hosts_sql(self) -> &'static str {
        match self {
            Vocabulary::Replica => "SHOW REPLICA HOSTS",
            Vocabulary::Slave => "SHOW SLAVE HOSTS",
        }
    }

    /// The statement reporting replication status on a replica.
    pub fn status_sql(self) -> &'static str {
        match self {
            Vocabulary::Replica => "SHOW REPLICA STATUS",
            Vocabulary::Slave => "SHOW SLAVE STATUS",
        }
    }

    /// The lag column within the status row.
    pub fn lag_column(self) -> &'static str {
        match self {
            Vocabulary::Replica => "Seconds_Behind_Source",
            Vocabulary::Slave => "Seconds_Behind_Master",
        }
    }
}

/// Picks the vocabulary for a server version string such as `8.0.30-log`.
///
/// Unparseable components count as zero, which lands on the legacy wording.
pub fn vocabulary_for(version: &str) -> Vocabulary {
    let mut parts = version.split('.');
    let major: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or_default();
    let minor: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or_default();
    let patch: u32 = parts
        .next()
        .and_then(|p| p.split('-').next())
        .and_then(|p| p.parse().ok())
        .unwrap_or_default();

    if (major >= 8 && patch >= 21) || (major >= 8 && minor > 0) {
        Vocabulary::Replica
    } else {
        Vocabulary::Slave
    }
}

/// Host-substring include/exclude rules for replica discovery.
#[derive(Debug, Clone, Default)]
pub struct ReplicaFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl ReplicaFilter {
    /// Builds a filter from include and exclude substring lists.
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    /// Whether a replica host should be monitored.
    pub fn admits(&self, host: &str) -> bool {
        if !self.include.is_empty() {
            return self.include.iter().any(|s| host.contains(s.as_str()));
        }
        if !self.exclude.is_empty() {
            return !self.exclude.iter().any(|s| host.contains(s.as_str()));
        }
        true
    }
}

struct MonitoredReplica {
    host: String,
    probe: Box<dyn ReplicaProbe>,
    excluded: bool,
}

/// Polls the discovered replicas and tracks the maximum observed lag.
pub struct ReplicaMonitor {
    replicas: Vec<MonitoredReplica>,
    max_lag: i64,
    exhaustion_logged: bool,
}

impl ReplicaMonitor {
    /// Discovers replicas through the topology and connects a probe to each
    /// admitted host. A host whose probe cannot connect is skipped with a
    /// warning rather than failing the run.
    pub async fn discover(
        topology: &dyn ReplicaTopology,
        filter: &ReplicaFilter,
    ) -> Result<Self, EngineError> {
        let hosts = topology.replica_hosts().await?;
        let mut replicas = Vec::new();
        for host in hosts {
            if !filter.admits(&host.host) {
                debug!(host = %host.host, "replica filtered out");
                continue;
            }
            match topology.connect_probe(&host).await {
                Ok(probe) => {
                    replicas.push(MonitoredReplica {
                        host: host.host.clone(),
                        probe,
                        excluded: false,
                    });
                }
                Err(e) => {
                    warn!(host = %host.host, "cannot connect lag probe, skipping: {}", e);
                }
            }
        }
        info!("monitoring {} replica(s) for lag", replicas.len());
        Ok(Self {
            replicas,
            max_lag: 0,
            exhaustion_logged: false,
        })
    }

    /// Builds a monitor directly from probes.
    #[cfg(test)]
    pub(crate) fn from_probes(probes: Vec<Box<dyn ReplicaProbe>>) -> Self {
        Self {
            replicas: probes
                .into_iter()
                .map(|probe| MonitoredReplica {
                    host: probe.host().to_string(),
                    probe,
                    excluded: false,
                })
                .collect(),
            max_lag: 0,
            exhaustion_logged: false,
        }
    }

    /// Number of replicas still being monitored at discovery time.
    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// Whether discovery found no replicas to monitor.
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Polls every non-excluded replica once and returns the current maximum
    /// lag in seconds.
    ///
    /// A failing poll excludes that replica for the rest of the run. When no
    /// replica produced a fresh sample the last known maximum is retained.
    pub async fn poll_once(&mut self) -> i64 {
        let mut fresh_max = 0i64;
        let mut sampled = false;

        for replica in &mut self.replicas {
            if replica.excluded {
                continue;
            }
            match replica.probe.lag_seconds().await {
                Ok(lag) => {
                    sampled = true;
                    if lag > fresh_max {
                        fresh_max = lag;
                    }
                }
                Err(e) => {
                    replica.excluded = true;
                    warn!(host = %replica.host, "lag poll failed, excluding replica for the rest of the run: {}", e);
                }
            }
        }

        if sampled {
            self.max_lag = fresh_max;
        } else if !self.replicas.is_empty() && !self.exhaustion_logged {
            warn!(
                retained_lag = self.max_lag,
                "all replicas excluded, retaining last known lag"
            );
            self.exhaustion_logged = true;
        }
        self.max_lag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedProbe {
        host: String,
        samples: Mutex<VecDeque<Result<i64, EngineError>>>,
    }

    impl ScriptedProbe {
        fn new(host: &str, samples: Vec<Result<i64, EngineError>>) -> Box<Self> {
            Box::new(Self {
                host: host.to_string(),
                samples: Mutex::new(samples.into()),
            })
        }
    }

    #[async_trait]
    impl ReplicaProbe for ScriptedProbe {
        fn host(&self) -> &str {
            &self.host
        }

        async fn lag_seconds(&self) -> Result<i64, EngineError> {
            self.samples
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(0))
        }
    }

    fn poll_error(host: &str) -> EngineError {
        EngineError::ReplicaPoll {
            host: host.to_string(),
            msg: "gone".to_string(),
        }
    }

    mod vocabulary {
        use super::*;

        #[test]
        fn test_legacy_versions_use_slave_wording() {
            assert_eq!(vocabulary_for("5.7.38-log"), Vocabulary::Slave);
            assert_eq!(vocabulary_for("8.0.19"), Vocabulary::Slave);
        }

        #[test]
        fn test_modern_versions_use_replica_wording() {
            assert_eq!(vocabulary_for("8.0.22"), Vocabulary::Replica);
            assert_eq!(vocabulary_for("8.0.30-log"), Vocabulary::Replica);
            assert_eq!(vocabulary_for("8.4.0"), Vocabulary::Replica);
        }

        #[test]
        fn test_garbage_version_falls_back_to_legacy() {
            assert_eq!(vocabulary_for("unknown"), Vocabulary::Slave);
            assert_eq!(vocabulary_for(""), Vocabulary::Slave);
        }

        #[test]
        fn test_wording_pairs() {
            assert_eq!(Vocabulary::Replica.hosts_sql(), "SHOW REPLICA HOSTS");
            assert_eq!(Vocabulary::Slave.status_sql(), "SHOW SLAVE STATUS");
            assert_eq!(Vocabulary::Replica.lag_column(), "Seconds_Behind_Source");
            assert_eq!(Vocabulary::Slave.lag_column(), "Seconds_Behind_Master");
        }
    }

    mod filtering {
        use super::*;

        #[test]
        fn test_empty_filter_admits_everything() {
            let filter = ReplicaFilter::default();
            assert!(filter.admits("replica-1.internal"));
        }

        #[test]
        fn test_include_is_substring_match() {
            let filter = ReplicaFilter::new(vec!["analytics".to_string()], vec![]);
            assert!(filter.admits("analytics-replica-2"));
            assert!(!filter.admits("reporting-replica-1"));
        }

        #[test]
        fn test_exclude_is_substring_match() {
            let filter = ReplicaFilter::new(vec![], vec!["backup".to_string()]);
            assert!(!filter.admits("backup-replica"));
            assert!(filter.admits("serving-replica"));
        }
    }

    mod polling {
        use super::*;

        #[tokio::test]
        async fn test_maximum_across_replicas() {
            let mut monitor = ReplicaMonitor::from_probes(vec![
                ScriptedProbe::new("r1", vec![Ok(2)]),
                ScriptedProbe::new("r2", vec![Ok(7)]),
                ScriptedProbe::new("r3", vec![Ok(0)]),
            ]);
            assert_eq!(monitor.poll_once().await, 7);
        }

        #[tokio::test]
        async fn test_failed_probe_excluded_for_rest_of_run() {
            let mut monitor = ReplicaMonitor::from_probes(vec![
                ScriptedProbe::new("r1", vec![Err(poll_error("r1")), Ok(99)]),
                ScriptedProbe::new("r2", vec![Ok(3), Ok(4)]),
            ]);
            assert_eq!(monitor.poll_once().await, 3);
            // r1's later healthy sample is never read
            assert_eq!(monitor.poll_once().await, 4);
        }

        #[tokio::test]
        async fn test_all_excluded_retains_last_maximum() {
            let mut monitor = ReplicaMonitor::from_probes(vec![ScriptedProbe::new(
                "r1",
                vec![Ok(12), Err(poll_error("r1"))],
            )]);
            assert_eq!(monitor.poll_once().await, 12);
            assert_eq!(monitor.poll_once().await, 12);
            assert_eq!(monitor.poll_once().await, 12);
        }

        #[tokio::test]
        async fn test_no_replicas_reports_zero() {
            let mut monitor = ReplicaMonitor::from_probes(vec![]);
            assert_eq!(monitor.poll_once().await, 0);
        }
    }
}
