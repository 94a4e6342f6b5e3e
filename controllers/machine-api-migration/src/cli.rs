//! Command-line flags.
//!
//! Flag names and defaults follow the other OpenShift cluster-api components so
//! the same deployment manifests can drive this binary.

use clap::{ArgAction, Args, Parser};
use featuregates::MISSING_VERSION;
use manager::leader_election::LEASES_RESOURCE_LOCK;
use manager::LeaderElectionConfig;
use std::time::Duration;

/// Namespace the migration controllers manage and elect a leader in.
pub const DEFAULT_MANAGED_NAMESPACE: &str = "openshift-cluster-api";

/// Lease name used for leader election.
pub const LEADER_ELECTION_ID: &str = "machine-api-migration-leader";

/// Machine API migration bootstrap
#[derive(Parser, Debug, Clone)]
#[command(name = "machine-api-migration", version, about, long_about = None)]
pub struct Cli {
    /// The address for health checking
    #[arg(long = "health-addr", default_value = ":9441")]
    pub health_addr: String,

    /// Namespace that the controller manages
    #[arg(long, default_value = DEFAULT_MANAGED_NAMESPACE)]
    pub namespace: String,

    /// Log to standard error instead of standard output
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub logtostderr: bool,

    /// Bind address for the metrics endpoint; "0" disables it
    #[arg(long = "metrics-bind-addr", default_value = ":8081")]
    pub metrics_bind_addr: String,

    #[command(flatten)]
    pub leader_election: LeaderElectionArgs,

    /// Log verbosity
    #[arg(
        short = 'v',
        long = "v",
        default_value_t = 0,
        value_parser = clap::value_parser!(u8).range(0..=10)
    )]
    pub verbosity: u8,

    /// Comma-separated list of target=N settings for per-module verbosity
    #[arg(long, default_value = "")]
    pub vmodule: String,

    /// Release version of this component; the cluster version is used when unset
    #[arg(long = "release-version", env = "RELEASE_VERSION", default_value = MISSING_VERSION)]
    pub release_version: String,
}

/// Leader election flags.
#[derive(Args, Debug, Clone)]
pub struct LeaderElectionArgs {
    /// Start a leader election client and gain leadership before running the controllers
    #[arg(
        long = "leader-elect",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub leader_elect: bool,

    /// How long non-leader candidates wait after observing a renewal before taking over
    #[arg(long = "leader-elect-lease-duration", default_value = "137s", value_parser = parse_duration)]
    pub lease_duration: Duration,

    /// How long the leader retries refreshing leadership before giving it up
    #[arg(long = "leader-elect-renew-deadline", default_value = "107s", value_parser = parse_duration)]
    pub renew_deadline: Duration,

    /// How long clients wait between attempts to acquire and renew leadership
    #[arg(long = "leader-elect-retry-period", default_value = "26s", value_parser = parse_duration)]
    pub retry_period: Duration,

    /// Type of resource object used for locking
    #[arg(long = "leader-elect-resource-lock", default_value = LEASES_RESOURCE_LOCK)]
    pub resource_lock: String,

    /// Name of the resource object used for locking
    #[arg(long = "leader-elect-resource-name", default_value = LEADER_ELECTION_ID)]
    pub resource_name: String,

    /// Namespace of the resource object used for locking
    #[arg(long = "leader-elect-resource-namespace", default_value = DEFAULT_MANAGED_NAMESPACE)]
    pub resource_namespace: String,
}

impl LeaderElectionArgs {
    /// Lease settings for the manager.
    pub fn to_config(&self) -> LeaderElectionConfig {
        LeaderElectionConfig {
            leader_elect: self.leader_elect,
            lease_duration: self.lease_duration,
            renew_deadline: self.renew_deadline,
            retry_period: self.retry_period,
            resource_lock: self.resource_lock.clone(),
            resource_name: self.resource_name.clone(),
            resource_namespace: self.resource_namespace.clone(),
        }
    }
}

/// Parses a Go duration string such as `1m30s`, `250ms` or `1.5h`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let value = input.trim();
    if value == "0" {
        return Ok(Duration::ZERO);
    }
    if value.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut nanos = 0f64;
    let mut rest = value;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration {input:?}"))?;
        if number_len == 0 {
            return Err(format!("invalid duration {input:?}"));
        }
        let number: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid duration {input:?}"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            unit => return Err(format!("unknown unit {unit:?} in duration {input:?}")),
        };
        rest = &rest[unit_len..];
        nanos += number * unit_nanos;
    }

    Duration::try_from_secs_f64(nanos / 1e9).map_err(|e| format!("invalid duration {input:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        let argv = std::iter::once("machine-api-migration").chain(args.iter().copied());
        Cli::try_parse_from(argv).expect("valid flags")
    }

    #[test]
    fn test_command_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.health_addr, ":9441");
        assert_eq!(cli.namespace, "openshift-cluster-api");
        assert!(cli.logtostderr);
        assert_eq!(cli.metrics_bind_addr, ":8081");
        assert_eq!(cli.verbosity, 0);

        let lease = cli.leader_election.to_config();
        assert!(lease.leader_elect);
        assert_eq!(lease.lease_duration, Duration::from_secs(137));
        assert_eq!(lease.renew_deadline, Duration::from_secs(107));
        assert_eq!(lease.retry_period, Duration::from_secs(26));
        assert_eq!(lease.resource_lock, "leases");
        assert_eq!(lease.resource_name, "machine-api-migration-leader");
        assert_eq!(lease.resource_namespace, "openshift-cluster-api");
        assert!(lease.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let cli = parse(&[
            "--health-addr=:9000",
            "--namespace",
            "custom",
            "--logtostderr=false",
            "--leader-elect=false",
            "--leader-elect-lease-duration=1m",
            "-v",
            "4",
        ]);
        assert_eq!(cli.health_addr, ":9000");
        assert_eq!(cli.namespace, "custom");
        assert!(!cli.logtostderr);
        assert!(!cli.leader_election.leader_elect);
        assert_eq!(cli.leader_election.lease_duration, Duration::from_secs(60));
        assert_eq!(cli.verbosity, 4);
    }

    #[test]
    fn test_bare_bool_flags_enable() {
        let cli = parse(&["--logtostderr", "--leader-elect"]);
        assert!(cli.logtostderr);
        assert!(cli.leader_election.leader_elect);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("26s"), Ok(Duration::from_secs(26)));
        assert_eq!(parse_duration("2m17s"), Ok(Duration::from_secs(137)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("1.5h"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("-1s").is_err());
    }
}
