//! Bounded wait for a cluster to become available.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use starhouse_core::config::PollSettings;
use starhouse_core::id::ClusterId;

use crate::api::{ClusterDescription, WarehouseApi};
use crate::error::{CloudError, ProvisionError, Result};

/// Longest single sleep, so cancellation is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// When to query and when to give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Option<Duration>,
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    /// No sleeping between queries, capped by attempts. For tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            interval: Duration::ZERO,
            max_wait: None,
            max_attempts: Some(max_attempts),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollSettings::default().into()
    }
}

impl From<PollSettings> for PollPolicy {
    fn from(s: PollSettings) -> Self {
        Self {
            interval: Duration::from_secs(s.interval_secs),
            max_wait: s.max_wait_secs.map(Duration::from_secs),
            max_attempts: s.max_attempts,
        }
    }
}

/// Shared flag checked between polls. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sleep `total`, waking early if cancelled. Returns false on cancellation.
fn sleep_unless_cancelled(total: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

/// Query `id` until its status is `available` (any ASCII case).
///
/// Sleeps one interval before every query, including the first. Errors with
/// `ClusterNotFound` if the service does not know the cluster, `Timeout` once
/// either bound in `policy` is exceeded, `Cancelled` if `cancel` fires.
pub fn poll_until_available<A: WarehouseApi + ?Sized>(
    api: &A,
    id: &ClusterId,
    policy: &PollPolicy,
    cancel: &CancelToken,
) -> Result<ClusterDescription> {
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        if !sleep_unless_cancelled(policy.interval, cancel) {
            return Err(ProvisionError::Cancelled {
                cluster: id.clone(),
                attempts,
            });
        }

        attempts += 1;
        let desc = match api.describe_cluster(id) {
            Ok(desc) => desc,
            Err(CloudError::NotFound { .. }) => {
                return Err(ProvisionError::ClusterNotFound { cluster: id.clone() })
            }
            Err(source) => {
                return Err(ProvisionError::ClusterDescribe {
                    cluster: id.clone(),
                    source,
                })
            }
        };

        info!(
            cluster = %desc.cluster_id,
            attempt = attempts,
            status = %desc.status,
            node_type = %desc.node_type,
            nodes = desc.num_nodes,
            "cluster status"
        );

        if desc.is_available() {
            return Ok(desc);
        }

        let waited = started.elapsed();
        let out_of_attempts = policy.max_attempts.is_some_and(|max| attempts >= max);
        let out_of_time = policy.max_wait.is_some_and(|max| waited >= max);
        if out_of_attempts || out_of_time {
            return Err(ProvisionError::Timeout {
                cluster: id.clone(),
                attempts,
                waited,
                last_status: desc.status,
            });
        }
        debug!(cluster = %id, ?waited, "cluster not available yet");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CreateClusterRequest, WarehouseApi};
    use crate::error::CloudResult;
    use std::sync::Mutex;

    /// Returns the scripted statuses in order, then repeats the last one.
    struct Scripted {
        statuses: Mutex<Vec<&'static str>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut statuses: Vec<&'static str>) -> Self {
            statuses.reverse();
            Self {
                statuses: Mutex::new(statuses),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl WarehouseApi for Scripted {
        fn create_cluster(&self, _req: &CreateClusterRequest) -> CloudResult<()> {
            Ok(())
        }

        fn describe_cluster(&self, id: &ClusterId) -> CloudResult<ClusterDescription> {
            *self.calls.lock().unwrap() += 1;
            let mut statuses = self.statuses.lock().unwrap();
            let status = if statuses.len() > 1 {
                statuses.pop().unwrap()
            } else {
                *statuses.last().unwrap()
            };
            if status == "missing" {
                return Err(CloudError::not_found("cluster", id.as_str()));
            }
            Ok(ClusterDescription {
                cluster_id: id.clone(),
                status: status.to_string(),
                node_type: "dc2.large".into(),
                num_nodes: 4,
                db_name: "dwh".into(),
                master_username: "dwhuser".into(),
                endpoint: None,
                vpc_id: None,
                iam_roles: vec![],
            })
        }
    }

    #[test]
    fn returns_on_available_in_any_case() {
        let api = Scripted::new(vec!["creating", "creating", "Available"]);
        let desc = poll_until_available(
            &api,
            &ClusterId::from("dwh"),
            &PollPolicy::immediate(10),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(desc.status, "Available");
        assert_eq!(api.calls(), 3);
    }

    #[test]
    fn attempt_bound_gives_timeout() {
        let api = Scripted::new(vec!["creating"]);
        let err = poll_until_available(
            &api,
            &ClusterId::from("dwh"),
            &PollPolicy::immediate(4),
            &CancelToken::new(),
        )
        .unwrap_err();
        match err {
            ProvisionError::Timeout {
                attempts,
                last_status,
                ..
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(last_status, "creating");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(api.calls(), 4);
    }

    #[test]
    fn wait_bound_gives_timeout() {
        let api = Scripted::new(vec!["modifying"]);
        let policy = PollPolicy {
            interval: Duration::from_millis(5),
            max_wait: Some(Duration::from_millis(20)),
            max_attempts: None,
        };
        let err =
            poll_until_available(&api, &ClusterId::from("dwh"), &policy, &CancelToken::new())
                .unwrap_err();
        assert!(matches!(err, ProvisionError::Timeout { .. }), "{err:?}");
    }

    #[test]
    fn unknown_cluster_is_not_found() {
        let api = Scripted::new(vec!["missing"]);
        let err = poll_until_available(
            &api,
            &ClusterId::from("ghost"),
            &PollPolicy::immediate(3),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ProvisionError::ClusterNotFound { .. }));
        assert_eq!(api.calls(), 1);
    }

    #[test]
    fn cancelled_token_stops_before_querying() {
        let api = Scripted::new(vec!["creating"]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let policy = PollPolicy {
            interval: Duration::from_secs(60),
            max_wait: None,
            max_attempts: None,
        };
        let err = poll_until_available(&api, &ClusterId::from("dwh"), &policy, &cancel).unwrap_err();
        assert!(matches!(err, ProvisionError::Cancelled { attempts: 0, .. }));
        assert_eq!(api.calls(), 0);
    }

    #[test]
    fn cancel_from_another_thread_interrupts_sleep() {
        let api = Scripted::new(vec!["creating"]);
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });
        let policy = PollPolicy {
            interval: Duration::from_secs(30),
            max_wait: None,
            max_attempts: None,
        };
        let started = Instant::now();
        let err = poll_until_available(&api, &ClusterId::from("dwh"), &policy, &cancel).unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, ProvisionError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn policy_from_settings() {
        let p = PollPolicy::from(PollSettings {
            interval_secs: 15,
            max_wait_secs: None,
            max_attempts: Some(8),
        });
        assert_eq!(p.interval, Duration::from_secs(15));
        assert_eq!(p.max_wait, None);
        assert_eq!(p.max_attempts, Some(8));
    }
}
